// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Transports carrying encoded wire messages between client and server
//!
//! [`LocalTransport`] hands calls to an in-process [`Server`].
//! [`GrpcTransport`] speaks gRPC with a raw-bytes codec, so it can reach any
//! gRPC server exposing the derived schema.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::context::Metadata;
use crate::errors::{RemoteCallError, RpcError};
use crate::server::Server;
use crate::status::{Code, Status};

/// Stream of encoded wire messages.
pub type ByteStream = BoxStream<'static, Result<Bytes, Status>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The call reached the server and failed there.
    #[error("{0}")]
    Status(Status),

    /// The call could not be delivered.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status(status) => RpcError::Status(status),
            TransportError::Unavailable(reason) => {
                RpcError::RemoteCall(RemoteCallError::Transport(reason))
            }
        }
    }
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        let status = Status::from(status);
        if status.code() == Code::Unavailable {
            TransportError::Unavailable(status.message().to_string())
        } else {
            TransportError::Status(status)
        }
    }
}

/// Delivers encoded calls to a server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn unary(
        &self,
        path: &str,
        request: Bytes,
        metadata: Metadata,
        timeout: Duration,
    ) -> Result<Bytes, TransportError>;

    async fn streaming(
        &self,
        path: &str,
        requests: ByteStream,
        metadata: Metadata,
        timeout: Duration,
    ) -> Result<ByteStream, TransportError>;
}

/// In-process transport. The handler runs on the calling task.
#[derive(Clone, Debug)]
pub struct LocalTransport {
    server: Server,
}

impl LocalTransport {
    pub fn new(server: Server) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn unary(
        &self,
        path: &str,
        request: Bytes,
        metadata: Metadata,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        self.server
            .handle_unary(path, request, metadata, Some(timeout))
            .await
            .map_err(TransportError::Status)
    }

    async fn streaming(
        &self,
        path: &str,
        requests: ByteStream,
        metadata: Metadata,
        timeout: Duration,
    ) -> Result<ByteStream, TransportError> {
        self.server
            .handle_streaming(path, requests, metadata, Some(timeout))
            .await
            .map_err(TransportError::Status)
    }
}

/// gRPC codec passing encoded messages through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesCodec;

impl Encoder for BytesCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for BytesCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Bytes>, Self::Error> {
        let len = src.remaining();
        Ok(Some(src.copy_to_bytes(len)))
    }
}

impl Codec for BytesCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = BytesCodec;
    type Decoder = BytesCodec;

    fn encoder(&mut self) -> Self::Encoder {
        *self
    }

    fn decoder(&mut self) -> Self::Decoder {
        *self
    }
}

/// Transport over a tonic channel.
#[derive(Clone, Debug)]
pub struct GrpcTransport {
    channel: Channel,
}

impl GrpcTransport {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Connect to `endpoint`, failing if it cannot be reached within
    /// `connect_timeout`.
    pub async fn connect(endpoint: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let channel = Self::endpoint(endpoint)?
            .connect_timeout(connect_timeout)
            .connect()
            .await
            .map_err(|e| TransportError::Unavailable(format!("{}: {}", endpoint, e)))?;
        debug!(%endpoint, "connected");
        Ok(Self::new(channel))
    }

    /// Channel connecting on first use.
    pub fn connect_lazy(endpoint: &str) -> Result<Self, TransportError> {
        Ok(Self::new(Self::endpoint(endpoint)?.connect_lazy()))
    }

    fn endpoint(endpoint: &str) -> Result<Endpoint, TransportError> {
        Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| TransportError::Unavailable(format!("invalid endpoint {}: {}", endpoint, e)))
    }

    async fn client(
        &self,
        path: &str,
    ) -> Result<(tonic::client::Grpc<Channel>, http::uri::PathAndQuery), TransportError> {
        let path = http::uri::PathAndQuery::try_from(path)
            .map_err(|e| TransportError::Status(Status::invalid_argument(e.to_string())))?;
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok((grpc, path))
    }
}

fn request<T>(message: T, metadata: Metadata, timeout: Duration) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    request.set_timeout(timeout);
    for (key, value) in metadata {
        let (Ok(key), Ok(value)) = (
            AsciiMetadataKey::from_bytes(key.as_bytes()),
            AsciiMetadataValue::try_from(value.as_str()),
        ) else {
            debug!(%key, "skipping metadata entry not valid as a header");
            continue;
        };
        request.metadata_mut().insert(key, value);
    }
    request
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn unary(
        &self,
        path: &str,
        message: Bytes,
        metadata: Metadata,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        let (mut grpc, path) = self.client(path).await?;
        let response = grpc
            .unary(request(message, metadata, timeout), path, BytesCodec)
            .await?;
        Ok(response.into_inner())
    }

    async fn streaming(
        &self,
        path: &str,
        requests: ByteStream,
        metadata: Metadata,
        timeout: Duration,
    ) -> Result<ByteStream, TransportError> {
        let (mut grpc, path) = self.client(path).await?;

        // a failing request stream ends the upload
        let requests = requests
            .take_while(|item| future::ready(item.is_ok()))
            .filter_map(|item| future::ready(item.ok()));

        let response = grpc
            .streaming(request(requests, metadata, timeout), path, BytesCodec)
            .await?;
        Ok(response
            .into_inner()
            .map(|item| item.map_err(Status::from))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_mapping() {
        let err: TransportError = tonic::Status::unavailable("connection refused").into();
        assert_eq!(err, TransportError::Unavailable("connection refused".to_string()));

        let err: TransportError = tonic::Status::invalid_argument("bad").into();
        assert_eq!(err, TransportError::Status(Status::invalid_argument("bad")));

        let err: RpcError = TransportError::Unavailable("down".to_string()).into();
        assert!(matches!(
            err,
            RpcError::RemoteCall(RemoteCallError::Transport(reason)) if reason == "down"
        ));
    }

    #[test]
    fn test_metadata_to_headers() {
        let mut metadata = Metadata::new();
        metadata.insert("x-request-id".to_string(), "42".to_string());
        metadata.insert("bad key".to_string(), "ignored".to_string());

        let request = request((), metadata, Duration::from_secs(1));
        assert_eq!(
            request.metadata().get("x-request-id").and_then(|v| v.to_str().ok()),
            Some("42")
        );
        assert!(request.metadata().get("grpc-timeout").is_some());
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = GrpcTransport::connect_lazy("not a uri").unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }
}
