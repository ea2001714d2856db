// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Schema derivation for typed remote procedures
//!
//! Domain messages declare their fields through the [`Message`] trait. From
//! a procedure [`Signature`] the crate derives a [`ProcedureSchema`]
//! (cardinality, mode and the closure of nested messages), renders the IDL
//! of a whole service and materializes the wire message types into a
//! descriptor pool held by a [`SchemaHandle`].

pub mod closure;
pub mod descriptor;
pub mod errors;
pub mod idl;
pub mod pool;
pub mod procedure;
pub mod resolver;
pub mod types;
pub mod utils;

pub use closure::MessageClosure;
pub use descriptor::{FieldDescriptor, FieldKind, MessageSchema, ScalarKind};
pub use errors::SchemaError;
pub use idl::{ProtoRenderer, SchemaRenderer, ServiceSchema};
pub use pool::SchemaHandle;
pub use procedure::{Cardinality, Mode, Param, ProcedureSchema, Signature};
pub use types::{BytesMessage, Declare, DeclaredType, EnumType, Field, Message, MessageType};

pub use prost_reflect;
