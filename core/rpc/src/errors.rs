// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use typedrpc_schema::SchemaError;

use crate::status::Status;

/// Message sent to callers in place of internal failure details.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";
/// Message of the status returned when a procedure produced no value.
pub const EMPTY_RESPONSE_MESSAGE: &str = "Method did not return anything";

/// Reconstruction of a domain message failed: malformed wire data or a
/// value that does not fit the declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Dotted path of the offending field, empty for the whole message.
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Prefix the field path with the name of the enclosing field.
    pub(crate) fn within(mut self, parent: &str) -> Self {
        self.field = if self.field.is_empty() {
            parent.to_string()
        } else if self.field.starts_with('[') {
            format!("{}{}", parent, self.field)
        } else {
            format!("{}.{}", parent, self.field)
        };
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "field `{}`: {}", self.field, self.reason)
        }
    }
}

impl std::error::Error for ValidationError {}

/// Client side failures of the remote call itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteCallError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("validation failed: {0}")]
    RequestValidation(#[from] ValidationError),

    #[error("procedure `{0}` returned no value")]
    EmptyResponse(String),

    #[error("remote call failed: {0}")]
    RemoteCall(#[from] RemoteCallError),

    #[error("call failed with status {0}")]
    Status(Status),

    #[error("procedure not found: {0}")]
    ProcedureNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// Status reported to the caller.
    ///
    /// Internal failures are logged here with their full detail and reported
    /// with an opaque message.
    pub fn to_status(&self) -> Status {
        match self {
            RpcError::RequestValidation(validation) => {
                let status = Status::invalid_argument(validation.to_string());
                match serde_json::to_vec(validation) {
                    Ok(details) => status.with_details(details),
                    Err(_) => status,
                }
            }
            RpcError::EmptyResponse(_) => Status::aborted(EMPTY_RESPONSE_MESSAGE),
            RpcError::Status(status) => status.clone(),
            RpcError::ProcedureNotFound(name) => {
                Status::unimplemented(format!("unknown procedure {}", name))
            }
            RpcError::RemoteCall(RemoteCallError::Timeout(_)) => {
                Status::deadline_exceeded(self.to_string())
            }
            RpcError::RemoteCall(RemoteCallError::Transport(_)) => {
                Status::unavailable(self.to_string())
            }
            RpcError::Schema(_) | RpcError::Config(_) | RpcError::Internal(_) => {
                error!(error = %self, "internal failure");
                Status::internal(INTERNAL_ERROR_MESSAGE)
            }
        }
    }

    /// Validation details carried by an invalid-argument status, if any.
    pub fn validation_details(status: &Status) -> Option<ValidationError> {
        status
            .details()
            .and_then(|details| serde_json::from_slice(details).ok())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::RemoteCall(RemoteCallError::Timeout(_)))
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        RpcError::Status(status)
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;

    #[test]
    fn test_validation_status_carries_details() {
        let err = RpcError::from(ValidationError::new("model.name", "unknown variant `x`"));
        let status = err.to_status();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(status.message().contains("model.name"));

        let details = RpcError::validation_details(&status).unwrap();
        assert_eq!(details.field, "model.name");
        assert_eq!(details.reason, "unknown variant `x`");
    }

    #[test]
    fn test_empty_response_is_aborted() {
        let status = RpcError::EmptyResponse("ping".to_string()).to_status();
        assert_eq!(status.code(), Code::Aborted);
        assert_eq!(status.message(), EMPTY_RESPONSE_MESSAGE);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_internal_details_are_withheld() {
        let status = RpcError::Internal("database password is hunter2".to_string()).to_status();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), INTERNAL_ERROR_MESSAGE);
        assert!(status.details().is_none());
        assert!(logs_contain("hunter2"));
    }

    #[test]
    fn test_within() {
        let err = ValidationError::new("", "expected a string").within("name");
        assert_eq!(err.to_string(), "field `name`: expected a string");
        let err = err.within("model");
        assert_eq!(err.field, "model.name");
        let err = ValidationError::new("[2]", "invalid byte 300").within("payload");
        assert_eq!(err.field, "payload[2]");
    }
}
