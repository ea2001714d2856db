// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Server side middleware chain
//!
//! A procedure handler is erased into an [`Invocable`]. Middleware wrap an
//! invocable into another one; an ordered list of middleware is folded
//! right to left, so the first middleware in the list is the outermost and
//! sees every call before the others.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tower_layer::Layer;

use crate::context::CallContext;
use crate::message::Payload;
use crate::status::Status;

/// Outcome of an invocable: a payload, or nothing for a procedure that
/// produced no value.
pub type Outcome = Result<Option<Payload>, Status>;

type InvokeFn = dyn Fn(Payload, CallContext) -> BoxFuture<'static, Outcome> + Send + Sync;

/// A type-erased, cloneable procedure handler.
#[derive(Clone)]
pub struct Invocable {
    inner: Arc<InvokeFn>,
}

impl Invocable {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Payload, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |payload, ctx| f(payload, ctx).boxed()),
        }
    }

    pub fn call(&self, payload: Payload, ctx: CallContext) -> BoxFuture<'static, Outcome> {
        (self.inner)(payload, ctx)
    }
}

impl std::fmt::Debug for Invocable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Invocable")
    }
}

/// Wraps an invocable with cross-cutting behavior.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, inner: Invocable) -> Invocable;
}

/// Fold `middleware` around `handler`, the first element outermost.
pub fn compose(handler: Invocable, middleware: &[Arc<dyn Middleware>]) -> Invocable {
    middleware
        .iter()
        .rev()
        .fold(handler, |inner, layer| layer.wrap(inner))
}

/// Middleware built from an async function receiving the payload, the call
/// context and the next invocable in the chain.
pub struct FnMiddleware<F> {
    f: Arc<F>,
}

/// Create a middleware from an async function.
///
/// ```ignore
/// let logging = from_fn(|payload, ctx, next: Invocable| async move {
///     tracing::info!(procedure = ctx.procedure(), "call");
///     next.call(payload, ctx).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Payload, CallContext, Invocable) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    FnMiddleware { f: Arc::new(f) }
}

impl<F, Fut> Layer<Invocable> for FnMiddleware<F>
where
    F: Fn(Payload, CallContext, Invocable) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    type Service = Invocable;

    fn layer(&self, inner: Invocable) -> Invocable {
        let f = Arc::clone(&self.f);
        Invocable::new(move |payload, ctx| f(payload, ctx, inner.clone()))
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Payload, CallContext, Invocable) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn wrap(&self, inner: Invocable) -> Invocable {
        self.layer(inner)
    }
}

/// Adapts any tower layer over invocables into a middleware.
pub struct LayerMiddleware<L> {
    layer: L,
}

impl<L> LayerMiddleware<L> {
    pub fn new(layer: L) -> Self {
        Self { layer }
    }
}

impl<L> Middleware for LayerMiddleware<L>
where
    L: Layer<Invocable, Service = Invocable> + Send + Sync + 'static,
{
    fn wrap(&self, inner: Invocable) -> Invocable {
        self.layer.layer(inner)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use typedrpc_schema::{Field, Message};

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Empty {}

    impl Message for Empty {
        const NAME: &'static str = "Empty";
        fn fields() -> Vec<Field> {
            vec![]
        }
    }

    fn recording(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(from_fn(move |payload, ctx, next: Invocable| {
            let log = log.clone();
            async move {
                log.lock().push(format!("{} before", name));
                let outcome = next.call(payload, ctx).await;
                log.lock().push(format!("{} after", name));
                outcome
            }
        }))
    }

    struct Tag(&'static str, Arc<Mutex<Vec<String>>>);

    impl Layer<Invocable> for Tag {
        type Service = Invocable;

        fn layer(&self, inner: Invocable) -> Invocable {
            let (name, log) = (self.0, self.1.clone());
            Invocable::new(move |payload, ctx| {
                log.lock().push(name.to_string());
                inner.call(payload, ctx)
            })
        }
    }

    #[tokio::test]
    async fn test_first_registered_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let handler_log = log.clone();
        let handler = Invocable::new(move |payload, _ctx| {
            handler_log.lock().push("handler".to_string());
            async move { Ok(Some(payload)) }
        });

        let chain = compose(
            handler,
            &[recording("A", log.clone()), recording("B", log.clone())],
        );
        let outcome = chain
            .call(Payload::message(Empty {}), CallContext::new("S", "m"))
            .await
            .unwrap();
        assert!(outcome.is_some());

        assert_eq!(
            *log.lock(),
            vec!["A before", "B before", "handler", "B after", "A after"]
        );
    }

    #[tokio::test]
    async fn test_layer_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = Invocable::new(|_payload, _ctx| async { Ok(None) });

        let chain = compose(
            handler,
            &[
                Arc::new(LayerMiddleware::new(Tag("outer", log.clone()))),
                Arc::new(LayerMiddleware::new(Tag("inner", log.clone()))),
            ],
        );
        let outcome = chain
            .call(Payload::message(Empty {}), CallContext::default())
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let handler = Invocable::new(|_payload, _ctx| async { panic!("must not be reached") });
        let deny: Arc<dyn Middleware> = Arc::new(from_fn(|_payload, _ctx, _next| async {
            Err(Status::permission_denied("denied"))
        }));

        let err = compose(handler, &[deny])
            .call(Payload::message(Empty {}), CallContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "denied");
    }
}
