// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Client side calls
//!
//! A [`Client`] marshals typed requests for the procedures declared on its
//! service and sends them through a [`Transport`]. Every call runs on its
//! own worker task and is awaited with the client timeout. When the timeout
//! elapses the worker is aborted and the caller gets
//! [`RemoteCallError::Timeout`]. Aborting the worker stops local work only:
//! a remote server may still complete the call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};
use typedrpc_schema::{Cardinality, Message, ProcedureSchema, SchemaError};

use crate::config::ClientConfig;
use crate::context::Metadata;
use crate::errors::{RemoteCallError, Result, RpcError};
use crate::marshal::{Marshaler, decode_wire, encode_wire};
use crate::service::{ProcedureDescriptor, ServiceDescriptor};
use crate::status::Code;
use crate::transport::{ByteStream, GrpcTransport, Transport, TransportError};

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Stream of typed responses.
pub type ResponseStream<T> = BoxStream<'static, Result<T>>;

fn call_error(err: TransportError, timeout: Duration) -> RpcError {
    match err {
        TransportError::Status(status) if status.code() == Code::DeadlineExceeded => {
            RemoteCallError::Timeout(timeout).into()
        }
        err => err.into(),
    }
}

fn encode_requests<Req, S>(procedure: &ProcedureDescriptor, requests: S) -> Result<ByteStream>
where
    Req: Message,
    S: Stream<Item = Req> + Send + 'static,
{
    let schema = procedure.shared_schema();
    let descriptor = procedure.wire_types()?.request.clone();
    Ok(requests
        .map(move |request| {
            Marshaler::new(&schema)
                .to_wire(&request, &descriptor)
                .map(|wire| encode_wire(&wire))
                .map_err(|e| e.to_status())
        })
        .boxed())
}

/// Typed view over the responses of a call, read until `deadline`.
fn decode_responses<Res: Message>(
    schema: Arc<ProcedureSchema>,
    descriptor: prost_reflect::MessageDescriptor,
    responses: ByteStream,
    deadline: Instant,
    timeout: Duration,
) -> ResponseStream<Res> {
    stream::unfold(Some(responses), move |state| {
        let schema = Arc::clone(&schema);
        let descriptor = descriptor.clone();
        async move {
            let mut responses = state?;
            match tokio::time::timeout_at(deadline, responses.next()).await {
                Ok(None) => None,
                Ok(Some(Ok(bytes))) => {
                    let item = decode_wire(&descriptor, bytes)
                        .and_then(|wire| Marshaler::new(&schema).to_domain::<Res>(&wire));
                    Some((item, Some(responses)))
                }
                Ok(Some(Err(status))) => Some((
                    Err(call_error(TransportError::Status(status), timeout)),
                    Some(responses),
                )),
                Err(_) => Some((Err(RemoteCallError::Timeout(timeout).into()), None)),
            }
        }
    })
    .boxed()
}

/// Calls the procedures of one service.
#[derive(Clone)]
pub struct Client {
    service: Arc<ServiceDescriptor>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    metadata: Metadata,
}

impl Client {
    /// Create a client, resolving the schema of `service` if needed.
    pub fn new(mut service: ServiceDescriptor, transport: impl Transport) -> Result<Self> {
        service.resolve_schema()?;
        Ok(Self {
            service: Arc::new(service),
            transport: Arc::new(transport),
            timeout: DEFAULT_TIMEOUT,
            metadata: Metadata::new(),
        })
    }

    pub fn from_config(
        service: ServiceDescriptor,
        transport: impl Transport,
        config: &ClientConfig,
    ) -> Result<Self> {
        Ok(Self::new(service, transport)?.with_timeout(config.timeout))
    }

    /// Client over a gRPC connection to the configured endpoint.
    pub async fn connect(service: ServiceDescriptor, config: &ClientConfig) -> Result<Self> {
        let transport = GrpcTransport::connect(&config.endpoint, config.timeout).await?;
        Self::from_config(service, transport, config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Metadata sent with every call.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    pub fn procedure(&self, name: &str) -> Result<&ProcedureDescriptor> {
        self.service
            .procedure(name)
            .ok_or_else(|| RpcError::ProcedureNotFound(name.to_string()))
    }

    /// The procedure `name`, checked against the types and cardinality of
    /// the call.
    fn prepare<Req: Message, Res: Message>(
        &self,
        name: &str,
        cardinality: Cardinality,
    ) -> Result<&ProcedureDescriptor> {
        let procedure = self.procedure(name)?;
        let schema = procedure.schema();

        if schema.cardinality() != cardinality {
            return Err(SchemaError::MethodSignature {
                method: name.to_string(),
                reason: format!(
                    "declared as {:?}, called as {:?}",
                    schema.cardinality(),
                    cardinality
                ),
            }
            .into());
        }
        if schema.request().name() != Req::NAME || schema.response().name() != Res::NAME {
            return Err(SchemaError::MethodSignature {
                method: name.to_string(),
                reason: format!(
                    "declared {} -> {}, called with {} -> {}",
                    schema.request().name(),
                    schema.response().name(),
                    Req::NAME,
                    Res::NAME
                ),
            }
            .into());
        }
        Ok(procedure)
    }

    /// Run `call` on a worker task, aborting it once the timeout elapses.
    async fn run<T, F>(&self, name: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = std::result::Result<T, TransportError>> + Send + 'static,
    {
        let worker = tokio::spawn(call);
        let abort = worker.abort_handle();

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(result)) => result.map_err(|e| call_error(e, self.timeout)),
            Ok(Err(e)) => Err(RpcError::Internal(format!("call worker failed: {}", e))),
            Err(_) => {
                abort.abort();
                warn!(procedure = %name, timeout = ?self.timeout, "call timed out");
                Err(RemoteCallError::Timeout(self.timeout).into())
            }
        }
    }

    async fn call_streaming(
        &self,
        name: &str,
        procedure: &ProcedureDescriptor,
        requests: ByteStream,
    ) -> Result<ByteStream> {
        let path = procedure.wire_types()?.path.clone();
        let transport = Arc::clone(&self.transport);
        let metadata = self.metadata.clone();
        let timeout = self.timeout;

        debug!(%path, "calling");
        self.run(name, async move {
            transport.streaming(&path, requests, metadata, timeout).await
        })
        .await
    }

    fn responses<Res: Message>(
        &self,
        procedure: &ProcedureDescriptor,
        responses: ByteStream,
        deadline: Instant,
    ) -> Result<ResponseStream<Res>> {
        Ok(decode_responses(
            procedure.shared_schema(),
            procedure.wire_types()?.response.clone(),
            responses,
            deadline,
            self.timeout,
        ))
    }

    async fn single_response<Res: Message>(
        &self,
        name: &str,
        procedure: &ProcedureDescriptor,
        responses: ByteStream,
        deadline: Instant,
    ) -> Result<Res> {
        let mut responses = self.responses::<Res>(procedure, responses, deadline)?;
        responses
            .next()
            .await
            .unwrap_or_else(|| Err(RpcError::EmptyResponse(name.to_string())))
    }

    /// Single request, single response.
    pub async fn unary<Req: Message, Res: Message>(&self, name: &str, request: &Req) -> Result<Res> {
        let procedure = self.prepare::<Req, Res>(name, Cardinality::UnaryUnary)?;
        let wire = procedure.wire_types()?;
        let marshaler = procedure.marshaler();
        let request = encode_wire(&marshaler.to_wire(request, &wire.request)?);

        let path = wire.path.clone();
        let transport = Arc::clone(&self.transport);
        let metadata = self.metadata.clone();
        let timeout = self.timeout;

        debug!(%path, "calling");
        let response = self
            .run(name, async move {
                transport.unary(&path, request, metadata, timeout).await
            })
            .await?;

        let response = decode_wire(&wire.response, response)?;
        marshaler.to_domain(&response)
    }

    /// Single request, stream of responses.
    pub async fn unary_stream<Req: Message, Res: Message>(
        &self,
        name: &str,
        request: &Req,
    ) -> Result<ResponseStream<Res>> {
        let deadline = Instant::now() + self.timeout;
        let procedure = self.prepare::<Req, Res>(name, Cardinality::UnaryStream)?;
        let wire = procedure.wire_types()?;
        let request = encode_wire(&procedure.marshaler().to_wire(request, &wire.request)?);

        let requests = stream::once(async move { Ok(request) }).boxed();
        let responses = self.call_streaming(name, procedure, requests).await?;
        self.responses(procedure, responses, deadline)
    }

    /// Stream of requests, single response.
    pub async fn stream_unary<Req, Res, S>(&self, name: &str, requests: S) -> Result<Res>
    where
        Req: Message,
        Res: Message,
        S: Stream<Item = Req> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let procedure = self.prepare::<Req, Res>(name, Cardinality::StreamUnary)?;
        let requests = encode_requests(procedure, requests)?;

        let responses = self.call_streaming(name, procedure, requests).await?;
        self.single_response(name, procedure, responses, deadline).await
    }

    /// Stream of requests, stream of responses.
    pub async fn stream_stream<Req, Res, S>(
        &self,
        name: &str,
        requests: S,
    ) -> Result<ResponseStream<Res>>
    where
        Req: Message,
        Res: Message,
        S: Stream<Item = Req> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let procedure = self.prepare::<Req, Res>(name, Cardinality::StreamStream)?;
        let requests = encode_requests(procedure, requests)?;

        let responses = self.call_streaming(name, procedure, requests).await?;
        self.responses(procedure, responses, deadline)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("service", &self.service.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
