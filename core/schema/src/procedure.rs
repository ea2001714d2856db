// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Procedure signatures and their derived schema.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::closure::MessageClosure;
use crate::descriptor::MessageSchema;
use crate::errors::{Result, SchemaError};
use crate::types::{BytesMessage, Declare, DeclaredType, Message, MessageType};
use crate::utils::{is_identifier, snake_to_camel};

/// Name of the parameter carrying a single request message.
pub const REQUEST_PARAM: &str = "request";
/// Name of the parameter carrying a stream of request messages.
pub const REQUESTS_PARAM: &str = "requests";

/// How domain messages are carried on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Field by field, with per-field wire typing.
    #[default]
    Structured,
    /// The whole message, encoded, inside a [`BytesMessage`].
    Passthrough,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Structured => write!(f, "structured"),
            Mode::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Streaming cardinality of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Unary request, unary response
    UnaryUnary,
    /// Unary request, streaming response
    UnaryStream,
    /// Streaming request, unary response
    StreamUnary,
    /// Streaming request, streaming response
    StreamStream,
}

impl Cardinality {
    pub fn new(request_streaming: bool, response_streaming: bool) -> Self {
        match (request_streaming, response_streaming) {
            (false, false) => Cardinality::UnaryUnary,
            (false, true) => Cardinality::UnaryStream,
            (true, false) => Cardinality::StreamUnary,
            (true, true) => Cardinality::StreamStream,
        }
    }

    pub fn request_streaming(&self) -> bool {
        matches!(self, Cardinality::StreamUnary | Cardinality::StreamStream)
    }

    pub fn response_streaming(&self) -> bool {
        matches!(self, Cardinality::UnaryStream | Cardinality::StreamStream)
    }
}

/// A declared handler parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: DeclaredType,
}

/// Declared parameters and return type of a procedure handler.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    method: String,
    params: Vec<Param>,
    output: Option<DeclaredType>,
}

impl Signature {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
            output: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: DeclaredType) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn returns(mut self, ty: DeclaredType) -> Self {
        self.output = Some(ty);
        self
    }

    pub fn unary<Req: Message, Res: Message>(method: impl Into<String>) -> Self {
        Self::new(method)
            .param(REQUEST_PARAM, Req::declared_type())
            .returns(Res::declared_type())
    }

    pub fn unary_stream<Req: Message, Res: Message>(method: impl Into<String>) -> Self {
        Self::new(method)
            .param(REQUEST_PARAM, Req::declared_type())
            .returns(DeclaredType::Stream(vec![Res::declared_type()]))
    }

    pub fn stream_unary<Req: Message, Res: Message>(method: impl Into<String>) -> Self {
        Self::new(method)
            .param(REQUESTS_PARAM, DeclaredType::Stream(vec![Req::declared_type()]))
            .returns(Res::declared_type())
    }

    pub fn stream_stream<Req: Message, Res: Message>(method: impl Into<String>) -> Self {
        Self::new(method)
            .param(REQUESTS_PARAM, DeclaredType::Stream(vec![Req::declared_type()]))
            .returns(DeclaredType::Stream(vec![Res::declared_type()]))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn output(&self) -> Option<&DeclaredType> {
        self.output.as_ref()
    }
}

/// Immutable description of one procedure: domain types, cardinality,
/// mode and the closure of messages it exchanges.
#[derive(Clone, Debug)]
pub struct ProcedureSchema {
    name: String,
    rpc_name: String,
    mode: Mode,
    request: MessageType,
    response: MessageType,
    cardinality: Cardinality,
    closure: MessageClosure,
    carrier: MessageClosure,
}

impl ProcedureSchema {
    /// Derive the schema of a procedure from its signature.
    pub fn build(signature: &Signature, mode: Mode) -> Result<Self> {
        let method = signature.method();
        if !is_identifier(method) {
            return Err(SchemaError::signature(
                method,
                "procedure names must be identifiers",
            ));
        }

        let (request, request_streaming) = request_side(signature)?;
        let (response, response_streaming) = response_side(signature)?;

        let closure = MessageClosure::collect(&[request, response])?;
        let carrier = MessageClosure::collect(&[BytesMessage::message_type()])?;

        Ok(Self {
            name: method.to_string(),
            rpc_name: snake_to_camel(method),
            mode,
            request,
            response,
            cardinality: Cardinality::new(request_streaming, response_streaming),
            closure,
            carrier,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name used in the IDL and on the wire.
    pub fn rpc_name(&self) -> &str {
        &self.rpc_name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn request(&self) -> MessageType {
        self.request
    }

    pub fn response(&self) -> MessageType {
        self.response
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn request_streaming(&self) -> bool {
        self.cardinality.request_streaming()
    }

    pub fn response_streaming(&self) -> bool {
        self.cardinality.response_streaming()
    }

    pub fn wire_request_name(&self) -> &'static str {
        match self.mode {
            Mode::Structured => self.request.name(),
            Mode::Passthrough => BytesMessage::NAME,
        }
    }

    pub fn wire_response_name(&self) -> &'static str {
        match self.mode {
            Mode::Structured => self.response.name(),
            Mode::Passthrough => BytesMessage::NAME,
        }
    }

    /// Every domain message reachable from the request and response,
    /// both included. Independent of the mode.
    pub fn closure(&self) -> &MessageClosure {
        &self.closure
    }

    /// Nested messages other than the request and response themselves.
    pub fn additional_messages(&self) -> impl Iterator<Item = &MessageSchema> {
        self.closure
            .iter()
            .filter(|m| m.name != self.request.name() && m.name != self.response.name())
    }

    /// Messages this procedure contributes to the wire schema.
    pub fn wire_messages(&self) -> &MessageClosure {
        match self.mode {
            Mode::Structured => &self.closure,
            Mode::Passthrough => &self.carrier,
        }
    }

    /// Resolved domain message by name.
    pub fn lookup(&self, name: &str) -> Option<&MessageSchema> {
        self.closure.get(name)
    }
}

fn request_side(signature: &Signature) -> Result<(MessageType, bool)> {
    let method = signature.method();

    let param = match signature.params() {
        [param] => param,
        [] => {
            return Err(SchemaError::signature(
                method,
                format!("expected a `{REQUEST_PARAM}` or `{REQUESTS_PARAM}` parameter"),
            ));
        }
        params => {
            return Err(SchemaError::signature(
                method,
                format!("expected exactly one parameter, found {}", params.len()),
            ));
        }
    };

    match param.name.as_str() {
        REQUEST_PARAM => match &param.ty {
            DeclaredType::Message(message) => Ok((*message, false)),
            other => Err(SchemaError::signature(
                method,
                format!("`{REQUEST_PARAM}` must be a message type, found {}", other),
            )),
        },
        REQUESTS_PARAM => match streamed_message(&param.ty) {
            Some(message) => Ok((message, true)),
            None => Err(SchemaError::signature(
                method,
                format!(
                    "`{REQUESTS_PARAM}` must be a stream of exactly one message type, found {}",
                    param.ty
                ),
            )),
        },
        other => Err(SchemaError::signature(
            method,
            format!(
                "unexpected parameter `{}`, expected `{REQUEST_PARAM}` or `{REQUESTS_PARAM}`",
                other
            ),
        )),
    }
}

fn response_side(signature: &Signature) -> Result<(MessageType, bool)> {
    let method = signature.method();

    match signature.output() {
        None => Err(SchemaError::signature(method, "missing return type")),
        Some(DeclaredType::Message(message)) => Ok((*message, false)),
        Some(ty @ DeclaredType::Stream(_)) => match streamed_message(ty) {
            Some(message) => Ok((message, true)),
            None => Err(SchemaError::signature(
                method,
                format!(
                    "return type must be a stream of exactly one message type, found {}",
                    ty
                ),
            )),
        },
        Some(other) => Err(SchemaError::signature(
            method,
            format!(
                "return type must be a message or a stream of messages, found {}",
                other
            ),
        )),
    }
}

// Null members are ignored: `Stream[Message, null]` streams `Message`.
fn streamed_message(ty: &DeclaredType) -> Option<MessageType> {
    let DeclaredType::Stream(params) = ty else {
        return None;
    };

    let concrete: Vec<&DeclaredType> = params
        .iter()
        .filter(|p| **p != DeclaredType::Null)
        .collect();

    match concrete.as_slice() {
        [DeclaredType::Message(message)] => Some(*message),
        _ => None,
    }
}
