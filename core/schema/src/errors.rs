// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors raised while deriving a schema. All of them are fatal to service
/// registration: no partially derived procedure is ever exposed.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("unsupported type for field `{field}` (declared as {declared}): {reason}")]
    UnsupportedType {
        field: String,
        declared: String,
        reason: String,
    },

    #[error("invalid signature for method `{method}`: {reason}")]
    MethodSignature { method: String, reason: String },

    #[error("procedure already registered: {0}")]
    DuplicateProcedure(String),

    #[error("message `{0}` is declared twice with different fields")]
    ConflictingMessage(String),

    #[error("wire type `{message}` for procedure `{procedure}` not found in resolved schema")]
    MissingWireType { procedure: String, message: String },

    #[error("descriptor error: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),

    #[error("failed to render schema: {0}")]
    Render(#[from] std::fmt::Error),
}

impl SchemaError {
    pub(crate) fn unsupported(
        field: &str,
        declared: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        SchemaError::UnsupportedType {
            field: field.to_string(),
            declared: declared.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn signature(method: &str, reason: impl Into<String>) -> Self {
        SchemaError::MethodSignature {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
