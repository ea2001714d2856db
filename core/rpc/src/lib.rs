// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Typed remote procedures
//!
//! Procedures are registered as typed async functions on a
//! [`ServiceDescriptor`]. The wire schema is derived from the declared types,
//! requests and responses are marshaled by [`Marshaler`], and calls are
//! dispatched by a [`Server`] or issued by a [`Client`] over a [`Transport`].

pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod handler;
pub mod marshal;
pub mod message;
pub mod middleware;
pub mod server;
pub mod service;
pub mod status;
pub mod transport;

pub use client::{Client, DEFAULT_TIMEOUT, ResponseStream};
pub use config::{ClientConfig, ProcedureConfig, ServerConfig, ServiceConfig};
pub use context::{CallContext, Metadata};
pub use errors::{RemoteCallError, RpcError, ValidationError};
pub use handler::{Handler, RequestStream};
pub use marshal::Marshaler;
pub use message::{AnyMessage, MessageStream, Payload};
pub use middleware::{FnMiddleware, Invocable, LayerMiddleware, Middleware, Outcome, compose, from_fn};
pub use server::{Server, ServerBuilder};
pub use service::{ProcedureDescriptor, ServiceDescriptor, WireTypes};
pub use status::{Code, Status};
pub use transport::{BytesCodec, ByteStream, GrpcTransport, LocalTransport, Transport, TransportError};

pub use typedrpc_schema as schema;
pub use typedrpc_schema::{Declare, Field, Message, Mode, Signature};
