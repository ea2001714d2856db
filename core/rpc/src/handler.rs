// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Typed procedure handlers
//!
//! A [`Handler`] erases a typed async function into an [`Invocable`] and
//! remembers how to marshal its request and response types. The four
//! constructors match the four streaming cardinalities.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{BoxStream, Stream, StreamExt};
use prost_reflect::{DynamicMessage, MessageDescriptor};
use typedrpc_schema::procedure::{REQUEST_PARAM, REQUESTS_PARAM};
use typedrpc_schema::{Cardinality, Declare, DeclaredType, Message, Signature};

use crate::context::CallContext;
use crate::errors::{Result, RpcError};
use crate::marshal::Marshaler;
use crate::message::{AnyMessage, Payload};
use crate::middleware::Invocable;
use crate::status::Status;

/// Stream of typed requests handed to stream-input handlers.
pub type RequestStream<T> = BoxStream<'static, std::result::Result<T, Status>>;

pub(crate) type DecodeFn = fn(&Marshaler<'_>, &DynamicMessage) -> Result<AnyMessage>;
pub(crate) type EncodeFn = fn(&Marshaler<'_>, AnyMessage, &MessageDescriptor) -> Result<DynamicMessage>;

fn decode_any<M: Message>(marshaler: &Marshaler<'_>, wire: &DynamicMessage) -> Result<AnyMessage> {
    marshaler.to_domain::<M>(wire).map(AnyMessage::new)
}

fn encode_any<M: Message>(
    marshaler: &Marshaler<'_>,
    message: AnyMessage,
    wire: &MessageDescriptor,
) -> Result<DynamicMessage> {
    let message = message.downcast::<M>().map_err(|other| {
        RpcError::Internal(format!("expected {}, got {}", M::NAME, other.name()))
    })?;
    marshaler.to_wire(&message, wire)
}

fn expect_message<M: Message>(message: AnyMessage) -> std::result::Result<M, Status> {
    message.downcast::<M>().map_err(|other| {
        RpcError::Internal(format!(
            "handler expects {}, middleware passed {}",
            M::NAME,
            other.name()
        ))
        .to_status()
    })
}

fn single<M: Message>(payload: Payload) -> std::result::Result<M, Status> {
    match payload.into_message() {
        Some(message) => expect_message(message),
        None => Err(RpcError::Internal(format!(
            "handler expects a single {}, got a stream",
            M::NAME
        ))
        .to_status()),
    }
}

fn typed_stream<M: Message>(payload: Payload) -> RequestStream<M> {
    payload
        .into_stream()
        .map(|item| item.and_then(expect_message::<M>))
        .boxed()
}

fn erased_stream<M, S>(stream: S) -> Payload
where
    M: Message,
    S: Stream<Item = std::result::Result<M, Status>> + Send + 'static,
{
    Payload::Stream(stream.map(|item| item.map(AnyMessage::new)).boxed())
}

/// A typed handler, erased.
pub struct Handler {
    request: DeclaredType,
    response: DeclaredType,
    cardinality: Cardinality,
    invocable: Invocable,
    decode_request: DecodeFn,
    encode_response: EncodeFn,
}

impl Handler {
    fn erase<Req: Message, Res: Message>(cardinality: Cardinality, invocable: Invocable) -> Self {
        Self {
            request: Req::declared_type(),
            response: Res::declared_type(),
            cardinality,
            invocable,
            decode_request: decode_any::<Req>,
            encode_response: encode_any::<Res>,
        }
    }

    /// Single request, single response. Returning `Ok(None)` means the
    /// procedure produced nothing, which the caller sees as an aborted call.
    pub fn unary<Req, Res, F, Fut>(handler: F) -> Self
    where
        Req: Message,
        Res: Message,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<Res>, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let invocable = Invocable::new(move |payload, ctx| {
            let handler = Arc::clone(&handler);
            async move {
                let request = single::<Req>(payload)?;
                Ok(handler(request, ctx).await?.map(Payload::message))
            }
        });
        Self::erase::<Req, Res>(Cardinality::UnaryUnary, invocable)
    }

    /// Single request, stream of responses.
    pub fn unary_stream<Req, Res, S, F, Fut>(handler: F) -> Self
    where
        Req: Message,
        Res: Message,
        S: Stream<Item = std::result::Result<Res, Status>> + Send + 'static,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<S, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let invocable = Invocable::new(move |payload, ctx| {
            let handler = Arc::clone(&handler);
            async move {
                let request = single::<Req>(payload)?;
                let responses = handler(request, ctx).await?;
                Ok(Some(erased_stream(responses)))
            }
        });
        Self::erase::<Req, Res>(Cardinality::UnaryStream, invocable)
    }

    /// Stream of requests, single response.
    pub fn stream_unary<Req, Res, F, Fut>(handler: F) -> Self
    where
        Req: Message,
        Res: Message,
        F: Fn(RequestStream<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<Res>, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let invocable = Invocable::new(move |payload, ctx| {
            let handler = Arc::clone(&handler);
            async move {
                let requests = typed_stream::<Req>(payload);
                Ok(handler(requests, ctx).await?.map(Payload::message))
            }
        });
        Self::erase::<Req, Res>(Cardinality::StreamUnary, invocable)
    }

    /// Stream of requests, stream of responses.
    pub fn stream_stream<Req, Res, S, F, Fut>(handler: F) -> Self
    where
        Req: Message,
        Res: Message,
        S: Stream<Item = std::result::Result<Res, Status>> + Send + 'static,
        F: Fn(RequestStream<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<S, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let invocable = Invocable::new(move |payload, ctx| {
            let handler = Arc::clone(&handler);
            async move {
                let requests = typed_stream::<Req>(payload);
                let responses = handler(requests, ctx).await?;
                Ok(Some(erased_stream(responses)))
            }
        });
        Self::erase::<Req, Res>(Cardinality::StreamStream, invocable)
    }

    /// Declared signature of the handler, registered as `method`.
    pub fn signature(&self, method: &str) -> Signature {
        let (param, request) = if self.cardinality.request_streaming() {
            (REQUESTS_PARAM, DeclaredType::Stream(vec![self.request.clone()]))
        } else {
            (REQUEST_PARAM, self.request.clone())
        };
        let response = if self.cardinality.response_streaming() {
            DeclaredType::Stream(vec![self.response.clone()])
        } else {
            self.response.clone()
        };

        Signature::new(method).param(param, request).returns(response)
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub(crate) fn invocable(&self) -> &Invocable {
        &self.invocable
    }

    pub(crate) fn decode_request(&self) -> DecodeFn {
        self.decode_request
    }

    pub(crate) fn encode_response(&self) -> EncodeFn {
        self.encode_response
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("request", &self.request.to_string())
            .field("response", &self.response.to_string())
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use typedrpc_schema::{Field, Mode, ProcedureSchema};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Number {
        value: i64,
    }

    impl Message for Number {
        const NAME: &'static str = "Number";
        fn fields() -> Vec<Field> {
            vec![Field::of::<i64>("value")]
        }
    }

    #[test]
    fn test_signatures_match_cardinality() {
        let handler = Handler::stream_unary(|_requests: RequestStream<Number>, _ctx| async {
            Ok(Some(Number { value: 0 }))
        });
        let schema = ProcedureSchema::build(&handler.signature("sum"), Mode::default()).unwrap();
        assert_eq!(schema.cardinality(), Cardinality::StreamUnary);
        assert_eq!(schema.request().name(), "Number");
    }

    #[tokio::test]
    async fn test_unary_invocable() {
        let handler = Handler::unary(|request: Number, _ctx| async move {
            Ok(Some(Number {
                value: request.value * 2,
            }))
        });

        let outcome = handler
            .invocable()
            .call(Payload::message(Number { value: 21 }), CallContext::default())
            .await
            .unwrap()
            .and_then(Payload::into_message)
            .unwrap();
        assert_eq!(outcome.downcast::<Number>().unwrap(), Number { value: 42 });
    }

    #[tokio::test]
    async fn test_stream_stream_invocable() {
        let handler = Handler::stream_stream(|requests: RequestStream<Number>, _ctx| async move {
            Ok(requests.map(|r| r.map(|n| Number { value: n.value + 1 })))
        });

        let requests = futures::stream::iter(vec![
            Ok(AnyMessage::new(Number { value: 1 })),
            Ok(AnyMessage::new(Number { value: 2 })),
        ])
        .boxed();

        let responses: Vec<i64> = handler
            .invocable()
            .call(Payload::Stream(requests), CallContext::default())
            .await
            .unwrap()
            .unwrap()
            .into_stream()
            .map(|item| item.unwrap().downcast::<Number>().unwrap().value)
            .collect()
            .await;
        assert_eq!(responses, vec![2, 3]);
    }
}
