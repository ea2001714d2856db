// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Example services and a loopback environment

use std::time::Duration;

use futures::StreamExt;
use typedrpc::errors::Result;
use typedrpc::{
    Client, LocalTransport, Mode, RequestStream, Server, ServiceDescriptor, Signature, Status,
};

use crate::messages::{
    ComplexRequest, ComplexResponse, Number, PingRequest, PingResponse, Sum, Tree,
};

pub const EXAMPLE_SERVICE: &str = "ExampleService";

/// Service used across tests and the demo:
///
/// - `ping`: echoes the id with a timestamp
/// - `complex`: echoes the model with the length of its label
/// - `tree_sum`: replaces the tree by a leaf holding its sum
/// - `count`: streams `0..value`
/// - `sum`: adds up a stream of numbers
/// - `double`: doubles every number of a stream
/// - `sleep`: waits `value` milliseconds, then echoes
pub fn example_service(mode: Mode) -> Result<ServiceDescriptor> {
    let mut service = ServiceDescriptor::new(EXAMPLE_SERVICE).with_mode(mode);

    service
        .unary("ping", |request: PingRequest, _ctx| async move {
            Ok(Some(PingResponse::new(request.id)))
        })?
        .unary("complex", |request: ComplexRequest, _ctx| async move {
            let checksum = request.model.label.len() as u64;
            Ok(Some(ComplexResponse {
                model: request.model,
                checksum,
            }))
        })?
        .unary("tree_sum", |request: Tree, _ctx| async move {
            Ok(Some(Tree::leaf(request.sum())))
        })?
        .unary_stream("count", |request: Number, _ctx| async move {
            Ok(futures::stream::iter(
                (0..request.value).map(|value| Ok::<_, Status>(Number { value })),
            ))
        })?
        .stream_unary("sum", |mut requests: RequestStream<Number>, _ctx| async move {
            let mut sum = Sum { total: 0, count: 0 };
            while let Some(number) = requests.next().await {
                sum.total += number?.value;
                sum.count += 1;
            }
            Ok(Some(sum))
        })?
        .stream_stream("double", |requests: RequestStream<Number>, _ctx| async move {
            Ok(requests.map(|number| number.map(|n| Number { value: n.value * 2 })))
        })?
        .unary("sleep", |request: Number, _ctx| async move {
            let millis = u64::try_from(request.value).unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(Some(request))
        })?;

    Ok(service)
}

/// Client side view of [`example_service`]: the same signatures, no handlers.
pub fn example_declarations(mode: Mode) -> Result<ServiceDescriptor> {
    let mut service = ServiceDescriptor::new(EXAMPLE_SERVICE).with_mode(mode);

    service
        .declare(Signature::unary::<PingRequest, PingResponse>("ping"))?
        .declare(Signature::unary::<ComplexRequest, ComplexResponse>("complex"))?
        .declare(Signature::unary::<Tree, Tree>("tree_sum"))?
        .declare(Signature::unary_stream::<Number, Number>("count"))?
        .declare(Signature::stream_unary::<Number, Sum>("sum"))?
        .declare(Signature::stream_stream::<Number, Number>("double"))?
        .declare(Signature::unary::<Number, Number>("sleep"))?;

    Ok(service)
}

/// A server and a client connected in process.
pub struct TestEnv {
    pub server: Server,
    pub client: Client,
}

impl TestEnv {
    /// Serve `service` and connect a client declaring `declarations`.
    pub fn new(service: ServiceDescriptor, declarations: ServiceDescriptor) -> Result<Self> {
        let server = Server::builder().add_service(service)?.build()?;
        let client = Client::new(declarations, LocalTransport::new(server.clone()))?;
        Ok(Self { server, client })
    }

    /// The example service, served and called in `mode`.
    pub fn example(mode: Mode) -> Result<Self> {
        Self::new(example_service(mode)?, example_declarations(mode)?)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }
}
