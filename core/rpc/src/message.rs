// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Type-erased domain messages flowing through the middleware chain.

use std::any::Any;
use std::fmt;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use typedrpc_schema::Message;

use crate::status::Status;

/// Stream of domain messages, as seen by middleware.
pub type MessageStream = BoxStream<'static, Result<AnyMessage, Status>>;

/// A domain message of any type, tagged with its message name.
pub struct AnyMessage {
    name: &'static str,
    inner: Box<dyn Any + Send>,
}

impl AnyMessage {
    pub fn new<M: Message>(message: M) -> Self {
        Self {
            name: M::NAME,
            inner: Box::new(message),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<M: Message>(&self) -> bool {
        self.inner.is::<M>()
    }

    /// Recover the concrete message, or get `self` back on a type mismatch.
    pub fn downcast<M: Message>(self) -> Result<M, AnyMessage> {
        let name = self.name;
        self.inner
            .downcast::<M>()
            .map(|message| *message)
            .map_err(|inner| AnyMessage { name, inner })
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.inner.downcast_ref::<M>()
    }

    pub fn downcast_mut<M: Message>(&mut self) -> Option<&mut M> {
        self.inner.downcast_mut::<M>()
    }
}

impl fmt::Debug for AnyMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyMessage").field(&self.name).finish()
    }
}

/// Request or response of an invocable: one message or a stream of them.
pub enum Payload {
    Message(AnyMessage),
    Stream(MessageStream),
}

impl Payload {
    pub fn message<M: Message>(message: M) -> Self {
        Payload::Message(AnyMessage::new(message))
    }

    pub fn as_message(&self) -> Option<&AnyMessage> {
        match self {
            Payload::Message(message) => Some(message),
            Payload::Stream(_) => None,
        }
    }

    pub fn into_message(self) -> Option<AnyMessage> {
        match self {
            Payload::Message(message) => Some(message),
            Payload::Stream(_) => None,
        }
    }

    /// A single message becomes a stream of one.
    pub fn into_stream(self) -> MessageStream {
        match self {
            Payload::Message(message) => stream::once(async move { Ok(message) }).boxed(),
            Payload::Stream(stream) => stream,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Payload::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use typedrpc_schema::Field;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl Message for Note {
        const NAME: &'static str = "Note";
        fn fields() -> Vec<Field> {
            vec![Field::of::<String>("text")]
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other {}

    impl Message for Other {
        const NAME: &'static str = "Other";
        fn fields() -> Vec<Field> {
            vec![]
        }
    }

    #[test]
    fn test_downcast() {
        let mut message = AnyMessage::new(Note {
            text: "hi".to_string(),
        });
        assert_eq!(message.name(), "Note");
        assert!(message.is::<Note>());
        assert!(message.downcast_ref::<Other>().is_none());

        message.downcast_mut::<Note>().unwrap().text.push('!');

        let message = message.downcast::<Other>().unwrap_err();
        assert_eq!(message.name(), "Note");
        assert_eq!(
            message.downcast::<Note>().unwrap(),
            Note {
                text: "hi!".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_payload_into_stream() {
        let payload = Payload::message(Note {
            text: "one".to_string(),
        });
        assert_eq!(payload.as_message().map(AnyMessage::name), Some("Note"));

        let items: Vec<_> = payload.into_stream().collect().await;
        assert_eq!(items.len(), 1);
    }
}
