// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Server side dispatch
//!
//! A [`Server`] is built from resolved services. Every registered procedure
//! becomes a route keyed by its transport path. Each call walks the same
//! steps: decode the wire request, reconstruct the domain request, run the
//! middleware chain and the handler, marshal the response back. Any failure
//! along the way is mapped to a [`Status`], so a failing call never affects
//! another one.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use prost_reflect::DynamicMessage;
use tracing::{debug, error};
use typedrpc_schema::{Cardinality, ProcedureSchema};

use crate::context::{CallContext, Metadata};
use crate::errors::{INTERNAL_ERROR_MESSAGE, Result, RpcError};
use crate::handler::{DecodeFn, EncodeFn};
use crate::marshal::{Marshaler, decode_wire, encode_wire};
use crate::message::{AnyMessage, MessageStream, Payload};
use crate::middleware::{Invocable, Middleware, Outcome, compose};
use crate::service::{ServiceDescriptor, WireTypes};
use crate::status::Status;
use crate::transport::ByteStream;

/// A dispatchable procedure.
struct Route {
    service: String,
    procedure: String,
    schema: Arc<ProcedureSchema>,
    wire: WireTypes,
    cardinality: Cardinality,
    invocable: Invocable,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl Route {
    fn marshaler(&self) -> Marshaler<'_> {
        Marshaler::new(&self.schema)
    }

    fn context(&self, metadata: Metadata, timeout: Option<Duration>) -> CallContext {
        let ctx = CallContext::new(&self.service, &self.procedure).with_metadata(metadata);
        match timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    fn decode_message(&self, wire: &DynamicMessage) -> std::result::Result<AnyMessage, Status> {
        (self.decode)(&self.marshaler(), wire).map_err(|e| e.to_status())
    }

    fn decode_bytes(&self, bytes: Bytes) -> std::result::Result<AnyMessage, Status> {
        let wire = decode_wire(&self.wire.request, bytes).map_err(|e| e.to_status())?;
        self.decode_message(&wire)
    }

    fn encode_message(&self, message: AnyMessage) -> std::result::Result<DynamicMessage, Status> {
        (self.encode)(&self.marshaler(), message, &self.wire.response).map_err(|e| e.to_status())
    }

    fn single_response(&self, outcome: Option<Payload>) -> std::result::Result<DynamicMessage, Status> {
        match outcome {
            Some(Payload::Message(message)) => self.encode_message(message),
            Some(Payload::Stream(_)) => Err(RpcError::Internal(format!(
                "{} returned a stream where a single response is expected",
                self.procedure
            ))
            .to_status()),
            None => {
                debug!(procedure = %self.procedure, "no response produced");
                Err(RpcError::EmptyResponse(self.procedure.clone()).to_status())
            }
        }
    }

    /// Run the middleware chain and the handler, within the call deadline.
    async fn invoke(&self, payload: Payload, ctx: CallContext) -> Outcome {
        let deadline = ctx.deadline();
        let call = AssertUnwindSafe(self.invocable.call(payload, ctx)).catch_unwind();

        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(procedure = %self.procedure, "deadline exceeded");
                    return Err(Status::deadline_exceeded(format!(
                        "{} exceeded its deadline",
                        self.procedure
                    )));
                }
            },
            None => call.await,
        };

        result.unwrap_or_else(|panic| Err(self.panicked(panic)))
    }

    fn panicked(&self, panic: Box<dyn Any + Send>) -> Status {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|reason| reason.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        error!(
            service = %self.service,
            procedure = %self.procedure,
            %reason,
            "handler panicked"
        );
        Status::internal(INTERNAL_ERROR_MESSAGE)
    }
}

fn decode_stream(route: Arc<Route>, requests: ByteStream) -> MessageStream {
    requests
        .map(move |item| item.and_then(|bytes| route.decode_bytes(bytes)))
        .boxed()
}

fn encode_stream(route: Arc<Route>, responses: MessageStream) -> ByteStream {
    AssertUnwindSafe(responses)
        .catch_unwind()
        .map(move |item| match item {
            Ok(Ok(message)) => route.encode_message(message).map(|wire| encode_wire(&wire)),
            Ok(Err(status)) => Err(status),
            Err(panic) => Err(route.panicked(panic)),
        })
        .boxed()
}

/// Collects services and server-wide middleware.
#[derive(Default)]
pub struct ServerBuilder {
    middleware: Vec<Arc<dyn Middleware>>,
    services: Vec<ServiceDescriptor>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Middleware applied to every service, outside the service middleware.
    /// The first one added is the outermost.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Add a service, resolving its schema now. Derivation errors surface
    /// here, before the server exists.
    pub fn add_service(mut self, mut service: ServiceDescriptor) -> Result<Self> {
        service.resolve_schema()?;
        self.services.push(service);
        Ok(self)
    }

    pub fn build(self) -> Result<Server> {
        let mut routes = HashMap::new();
        let mut services = Vec::with_capacity(self.services.len());

        for service in self.services {
            let service = Arc::new(service);
            for procedure in service.procedures() {
                let (Some(handler), Some(invocable)) = (procedure.handler(), procedure.invocable())
                else {
                    debug!(
                        service = %service.name(),
                        procedure = %procedure.name(),
                        "declared without handler, not routed"
                    );
                    continue;
                };

                let wire = procedure.wire_types()?.clone();
                let path = wire.path.clone();
                let route = Route {
                    service: service.name().to_string(),
                    procedure: procedure.name().to_string(),
                    schema: procedure.shared_schema(),
                    wire,
                    cardinality: procedure.cardinality(),
                    invocable: compose(invocable.clone(), &self.middleware),
                    decode: handler.decode_request(),
                    encode: handler.encode_response(),
                };

                debug!(%path, "route added");
                if routes.insert(path.clone(), Arc::new(route)).is_some() {
                    return Err(RpcError::Config(format!("duplicate route {}", path)));
                }
            }
            services.push(service);
        }

        Ok(Server {
            inner: Arc::new(ServerInner { routes, services }),
        })
    }
}

struct ServerInner {
    routes: HashMap<String, Arc<Route>>,
    services: Vec<Arc<ServiceDescriptor>>,
}

/// Dispatches calls to the procedures of resolved services. Cheap to clone.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Routed paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.routes.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.inner.services.iter().map(AsRef::as_ref)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services().find(|service| service.name() == name)
    }

    fn route(&self, path: &str) -> std::result::Result<Arc<Route>, Status> {
        self.inner.routes.get(path).cloned().ok_or_else(|| {
            debug!(%path, "unknown route");
            RpcError::ProcedureNotFound(path.to_string()).to_status()
        })
    }

    /// Dispatch a unary call on a decoded wire message.
    pub async fn dispatch(
        &self,
        path: &str,
        request: DynamicMessage,
        ctx: CallContext,
    ) -> std::result::Result<DynamicMessage, Status> {
        let route = self.route(path)?;
        if route.cardinality != Cardinality::UnaryUnary {
            return Err(Status::failed_precondition(format!(
                "{} is a {:?} procedure",
                path, route.cardinality
            )));
        }

        debug!(%path, "dispatching");
        let ctx = ctx.routed(&route.service, &route.procedure);
        let request = route.decode_message(&request)?;
        let outcome = route.invoke(Payload::Message(request), ctx).await?;
        route.single_response(outcome)
    }

    /// Dispatch a unary call on its binary form.
    pub async fn handle_unary(
        &self,
        path: &str,
        request: Bytes,
        metadata: Metadata,
        timeout: Option<Duration>,
    ) -> std::result::Result<Bytes, Status> {
        let route = self.route(path)?;
        let wire = decode_wire(&route.wire.request, request).map_err(|e| e.to_status())?;
        let ctx = route.context(metadata, timeout);
        let response = self.dispatch(path, wire, ctx).await?;
        Ok(encode_wire(&response))
    }

    /// Dispatch a call of any cardinality. Single requests are read as the
    /// first item of `requests`, single responses are sent as a stream of
    /// one.
    pub async fn handle_streaming(
        &self,
        path: &str,
        requests: ByteStream,
        metadata: Metadata,
        timeout: Option<Duration>,
    ) -> std::result::Result<ByteStream, Status> {
        let route = self.route(path)?;
        debug!(%path, cardinality = ?route.cardinality, "dispatching");

        let ctx = route.context(metadata, timeout);
        let mut requests = decode_stream(Arc::clone(&route), requests);
        let payload = if route.cardinality.request_streaming() {
            Payload::Stream(requests)
        } else {
            let request = requests
                .next()
                .await
                .ok_or_else(|| Status::invalid_argument("missing request message"))??;
            Payload::Message(request)
        };

        let outcome = route.invoke(payload, ctx).await?;
        if route.cardinality.response_streaming() {
            return Ok(match outcome {
                Some(payload) => encode_stream(route, payload.into_stream()),
                None => stream::empty().boxed(),
            });
        }

        let response = route.single_response(outcome)?;
        Ok(stream::once(async move { Ok(encode_wire(&response)) }).boxed())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("paths", &self.paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;
    use typedrpc_testing::{PingRequest, PingResponse};
    use uuid::Uuid;

    fn ping_service() -> ServiceDescriptor {
        let mut service = ServiceDescriptor::new("PingService");
        service
            .unary("ping", |request: PingRequest, _ctx| async move {
                Ok(Some(PingResponse::new(request.id)))
            })
            .unwrap();
        service
            .unary("silent", |_request: PingRequest, _ctx| async move {
                Ok(None::<PingResponse>)
            })
            .unwrap();
        service
    }

    fn ping_bytes(server: &Server, id: Uuid) -> Bytes {
        let service = server.service("PingService").unwrap();
        let procedure = service.procedure("ping").unwrap();
        let wire = procedure
            .marshaler()
            .to_wire(&PingRequest { id }, &procedure.wire_types().unwrap().request)
            .unwrap();
        encode_wire(&wire)
    }

    #[tokio::test]
    async fn test_routes() {
        let server = Server::builder()
            .add_service(ping_service())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            server.paths(),
            vec![
                "/ping_service.PingService/Ping".to_string(),
                "/ping_service.PingService/Silent".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_unary() {
        let server = Server::builder()
            .add_service(ping_service())
            .unwrap()
            .build()
            .unwrap();
        let id = Uuid::new_v4();

        let response = server
            .handle_unary(
                "/ping_service.PingService/Ping",
                ping_bytes(&server, id),
                Metadata::new(),
                None,
            )
            .await
            .unwrap();

        let procedure = server.service("PingService").unwrap().procedure("ping").unwrap();
        let wire = decode_wire(&procedure.wire_types().unwrap().response, response).unwrap();
        let response: PingResponse = procedure.marshaler().to_domain(&wire).unwrap();
        assert_eq!(response.id, id);
    }

    #[tokio::test]
    async fn test_empty_response_is_aborted() {
        let server = Server::builder()
            .add_service(ping_service())
            .unwrap()
            .build()
            .unwrap();

        let status = server
            .handle_unary(
                "/ping_service.PingService/Silent",
                ping_bytes(&server, Uuid::new_v4()),
                Metadata::new(),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(status.code(), crate::status::Code::Aborted);
        assert_eq!(status.message(), "Method did not return anything");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let server = Server::builder()
            .add_service(ping_service())
            .unwrap()
            .build()
            .unwrap();

        let status = server
            .handle_unary("/ping_service.PingService/Pong", Bytes::new(), Metadata::new(), None)
            .await
            .unwrap_err();
        assert_eq!(status.code(), crate::status::Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_server_middleware_wraps_service_middleware() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let service_order = order.clone();
        let service = ping_service().with_middleware(from_fn(move |payload, ctx, next: Invocable| {
            service_order.lock().push("service");
            next.call(payload, ctx)
        }));

        let server_order = order.clone();
        let server = Server::builder()
            .middleware(from_fn(move |payload, ctx, next: Invocable| {
                server_order.lock().push("server");
                next.call(payload, ctx)
            }))
            .add_service(service)
            .unwrap()
            .build()
            .unwrap();

        server
            .handle_unary(
                "/ping_service.PingService/Ping",
                ping_bytes(&server, Uuid::new_v4()),
                Metadata::new(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(*order.lock(), vec!["server", "service"]);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_panic_is_internal() {
        let mut service = ServiceDescriptor::new("PingService");
        service
            .unary("ping", |_request: PingRequest, _ctx| async move {
                if true {
                    panic!("database password is hunter2");
                }
                Ok(None::<PingResponse>)
            })
            .unwrap();
        let server = Server::builder().add_service(service).unwrap().build().unwrap();

        let status = server
            .handle_unary(
                "/ping_service.PingService/Ping",
                ping_bytes(&server, Uuid::new_v4()),
                Metadata::new(),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(status.code(), crate::status::Code::Internal);
        assert_eq!(status.message(), INTERNAL_ERROR_MESSAGE);
        assert!(logs_contain("handler panicked"));
    }
}
