// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Per-call context handed to middleware and handlers.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Key-value metadata sent along with a call.
pub type Metadata = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    service: String,
    procedure: String,
    metadata: Metadata,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(service: impl Into<String>, procedure: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            procedure: procedure.into(),
            metadata: Metadata::new(),
            deadline: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// Same metadata and deadline, addressed to another procedure.
    pub(crate) fn routed(mut self, service: &str, procedure: &str) -> Self {
        self.service = service.to_string();
        self.procedure = procedure.to_string();
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Name of the procedure being called, as registered.
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_set_timeout() {
        let ctx = CallContext::new("ExampleService", "ping").with_timeout(Duration::from_secs(30));
        assert!(ctx.deadline().is_some());
        assert!(!ctx.is_deadline_exceeded());
        let remaining = ctx.remaining_time().unwrap();
        assert!(remaining.as_secs() >= 29 && remaining.as_secs() <= 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_deadline_exceeded() {
        let ctx = CallContext::new("ExampleService", "ping").with_timeout(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(ctx.is_deadline_exceeded());
        assert_eq!(ctx.remaining_time(), Some(Duration::ZERO));
    }

    #[test]
    fn test_no_deadline() {
        let mut ctx = CallContext::new("ExampleService", "ping");
        ctx.metadata_mut().insert("x-request-id".to_string(), "42".to_string());
        assert!(!ctx.is_deadline_exceeded());
        assert!(ctx.remaining_time().is_none());
        assert_eq!(ctx.metadata().get("x-request-id").map(String::as_str), Some("42"));
    }
}
