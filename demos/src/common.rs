// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use typedrpc::errors::Result;
use typedrpc::{Field, Invocable, Message, Mode, ServiceDescriptor, Signature, from_fn};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "ExampleService";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    pub id: Uuid,
}

impl Message for PingRequest {
    const NAME: &'static str = "PingRequest";

    fn fields() -> Vec<Field> {
        vec![Field::of::<Uuid>("id")]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl Message for PingResponse {
    const NAME: &'static str = "PingResponse";

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<Uuid>("id"),
            Field::of::<DateTime<Utc>>("timestamp"),
        ]
    }
}

/// Server side: `ping` echoes the id, every call is logged.
pub fn ping_service(mode: Mode) -> Result<ServiceDescriptor> {
    let mut service = ServiceDescriptor::new(SERVICE_NAME)
        .with_mode(mode)
        .with_middleware(from_fn(|payload, ctx, next: Invocable| async move {
            info!(procedure = ctx.procedure(), "call received");
            next.call(payload, ctx).await
        }));

    service.unary("ping", |request: PingRequest, _ctx| async move {
        Ok(Some(PingResponse {
            id: request.id,
            timestamp: Utc::now(),
        }))
    })?;

    Ok(service)
}

/// Client side: the `ping` signature only.
pub fn ping_declarations(mode: Mode) -> Result<ServiceDescriptor> {
    let mut service = ServiceDescriptor::new(SERVICE_NAME).with_mode(mode);
    service.declare(Signature::unary::<PingRequest, PingResponse>("ping"))?;
    Ok(service)
}
