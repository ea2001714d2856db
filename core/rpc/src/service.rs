// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Procedure and service descriptors
//!
//! A [`ServiceDescriptor`] collects procedures, either registered with a
//! handler (server side) or only declared by signature (client side). Schema
//! resolution happens once: it renders the IDL, materializes the wire types
//! and binds them back onto every procedure. After that the descriptor is
//! read-only and can be shared by concurrent calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::Stream;
use prost_reflect::MessageDescriptor;
use tracing::{debug, info};
use typedrpc_schema::{
    Cardinality, Message, MessageClosure, Mode, ProcedureSchema, ProtoRenderer, SchemaError,
    SchemaHandle, SchemaRenderer, ServiceSchema, Signature,
};

use crate::config::ServiceConfig;
use crate::context::CallContext;
use crate::errors::{Result, RpcError};
use crate::handler::{Handler, RequestStream};
use crate::marshal::Marshaler;
use crate::middleware::{Invocable, Middleware, compose};
use crate::status::Status;

/// Wire message types bound to a procedure after schema resolution.
#[derive(Clone, Debug)]
pub struct WireTypes {
    pub request: MessageDescriptor,
    pub response: MessageDescriptor,
    /// Transport path, `/{package}.{Service}/{Rpc}`.
    pub path: String,
}

/// One procedure of a service.
#[derive(Debug)]
pub struct ProcedureDescriptor {
    schema: Arc<ProcedureSchema>,
    handler: Option<Handler>,
    invocable: Option<Invocable>,
    wire: Option<WireTypes>,
}

impl ProcedureDescriptor {
    /// Derive the descriptor of a procedure. Without a handler the
    /// procedure is only declared, which is what clients need.
    pub fn build(signature: &Signature, handler: Option<Handler>, mode: Mode) -> Result<Self> {
        let schema = ProcedureSchema::build(signature, mode)?;

        if let Some(handler) = &handler {
            if handler.cardinality() != schema.cardinality() {
                return Err(SchemaError::MethodSignature {
                    method: signature.method().to_string(),
                    reason: format!(
                        "handler is {:?} but the signature declares {:?}",
                        handler.cardinality(),
                        schema.cardinality()
                    ),
                }
                .into());
            }
        }

        Ok(Self {
            schema: Arc::new(schema),
            handler,
            invocable: None,
            wire: None,
        })
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &ProcedureSchema {
        &self.schema
    }

    pub(crate) fn shared_schema(&self) -> Arc<ProcedureSchema> {
        Arc::clone(&self.schema)
    }

    pub fn mode(&self) -> Mode {
        self.schema.mode()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.schema.cardinality()
    }

    pub fn marshaler(&self) -> Marshaler<'_> {
        Marshaler::new(&self.schema)
    }

    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// The handler wrapped by the service middleware, once resolved.
    pub(crate) fn invocable(&self) -> Option<&Invocable> {
        self.invocable.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.wire.is_some()
    }

    /// Bound wire types. Fails before schema resolution.
    pub fn wire_types(&self) -> Result<&WireTypes> {
        self.wire.as_ref().ok_or_else(|| {
            RpcError::Internal(format!("procedure {} used before schema resolution", self.name()))
        })
    }

    /// Look up the wire request and response types in the resolved schema.
    /// A missing type means the schema and the descriptors diverged.
    pub fn bind_wire_types(&mut self, handle: &SchemaHandle) -> Result<()> {
        let lookup = |name: &str| {
            handle
                .message(name)
                .ok_or_else(|| SchemaError::MissingWireType {
                    procedure: self.schema.name().to_string(),
                    message: name.to_string(),
                })
        };

        let request = lookup(self.schema.wire_request_name())?;
        let response = lookup(self.schema.wire_response_name())?;

        self.wire = Some(WireTypes {
            request,
            response,
            path: handle.path(self.schema.rpc_name()),
        });
        Ok(())
    }

    fn wrap(&mut self, middleware: &[Arc<dyn Middleware>]) {
        self.invocable = self
            .handler
            .as_ref()
            .map(|handler| compose(handler.invocable().clone(), middleware));
    }
}

/// A named set of procedures sharing a default mode, middleware and, once
/// resolved, a schema.
pub struct ServiceDescriptor {
    name: String,
    package: Option<String>,
    mode: Mode,
    overrides: HashMap<String, Mode>,
    procedures: Vec<ProcedureDescriptor>,
    index: HashMap<String, usize>,
    middleware: Vec<Arc<dyn Middleware>>,
    renderer: Arc<dyn SchemaRenderer>,
    handle: Option<SchemaHandle>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: None,
            mode: Mode::default(),
            overrides: HashMap::new(),
            procedures: Vec::new(),
            index: HashMap::new(),
            middleware: Vec::new(),
            renderer: Arc::new(ProtoRenderer),
            handle: None,
        }
    }

    /// Service configured from a [`ServiceConfig`]: default mode, package
    /// and per-procedure modes.
    pub fn from_config(name: impl Into<String>, config: &ServiceConfig) -> Self {
        let mut service = Self::new(name).with_mode(config.mode);
        service.package = config.package.clone();
        service.overrides = config
            .procedures
            .iter()
            .filter_map(|(name, procedure)| procedure.mode.map(|mode| (name.clone(), mode)))
            .collect();
        service
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Mode used by `procedure` when it is registered without an explicit one.
    pub fn with_procedure_mode(mut self, procedure: impl Into<String>, mode: Mode) -> Self {
        self.overrides.insert(procedure.into(), mode);
        self
    }

    pub fn with_renderer(mut self, renderer: impl SchemaRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// Append a middleware. The first one added is the outermost.
    pub fn with_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_resolved(&self) -> bool {
        self.handle.is_some()
    }

    pub fn schema_handle(&self) -> Option<&SchemaHandle> {
        self.handle.as_ref()
    }

    pub fn procedure(&self, name: &str) -> Option<&ProcedureDescriptor> {
        self.index.get(name).map(|i| &self.procedures[*i])
    }

    /// Procedures in registration order.
    pub fn procedures(&self) -> impl Iterator<Item = &ProcedureDescriptor> {
        self.procedures.iter()
    }

    /// Register a handler under `name`, in the default mode of the service
    /// or the mode configured for `name`.
    pub fn register(&mut self, name: &str, handler: Handler) -> Result<&mut Self> {
        let mode = self.mode_of(name);
        self.register_with_mode(name, handler, mode)
    }

    pub fn register_with_mode(&mut self, name: &str, handler: Handler, mode: Mode) -> Result<&mut Self> {
        let signature = handler.signature(name);
        self.insert(&signature, Some(handler), mode)
    }

    /// Declare a procedure without a handler.
    pub fn declare(&mut self, signature: Signature) -> Result<&mut Self> {
        let mode = self.mode_of(signature.method());
        self.insert(&signature, None, mode)
    }

    pub fn declare_with_mode(&mut self, signature: Signature, mode: Mode) -> Result<&mut Self> {
        self.insert(&signature, None, mode)
    }

    pub fn unary<Req, Res, F, Fut>(&mut self, name: &str, handler: F) -> Result<&mut Self>
    where
        Req: Message,
        Res: Message,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<Res>, Status>> + Send + 'static,
    {
        self.register(name, Handler::unary(handler))
    }

    pub fn unary_stream<Req, Res, S, F, Fut>(&mut self, name: &str, handler: F) -> Result<&mut Self>
    where
        Req: Message,
        Res: Message,
        S: Stream<Item = std::result::Result<Res, Status>> + Send + 'static,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<S, Status>> + Send + 'static,
    {
        self.register(name, Handler::unary_stream(handler))
    }

    pub fn stream_unary<Req, Res, F, Fut>(&mut self, name: &str, handler: F) -> Result<&mut Self>
    where
        Req: Message,
        Res: Message,
        F: Fn(RequestStream<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<Res>, Status>> + Send + 'static,
    {
        self.register(name, Handler::stream_unary(handler))
    }

    pub fn stream_stream<Req, Res, S, F, Fut>(&mut self, name: &str, handler: F) -> Result<&mut Self>
    where
        Req: Message,
        Res: Message,
        S: Stream<Item = std::result::Result<Res, Status>> + Send + 'static,
        F: Fn(RequestStream<Req>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<S, Status>> + Send + 'static,
    {
        self.register(name, Handler::stream_stream(handler))
    }

    fn mode_of(&self, name: &str) -> Mode {
        self.overrides.get(name).copied().unwrap_or(self.mode)
    }

    fn insert(&mut self, signature: &Signature, handler: Option<Handler>, mode: Mode) -> Result<&mut Self> {
        let name = signature.method();
        if self.is_resolved() {
            return Err(RpcError::Config(format!(
                "cannot register {} on {}: schema already resolved",
                name, self.name
            )));
        }
        if self.index.contains_key(name) {
            return Err(SchemaError::DuplicateProcedure(name.to_string()).into());
        }

        let procedure = ProcedureDescriptor::build(signature, handler, mode)?;
        debug!(
            service = %self.name,
            procedure = %name,
            mode = %mode,
            cardinality = ?procedure.cardinality(),
            "procedure registered"
        );

        self.index.insert(name.to_string(), self.procedures.len());
        self.procedures.push(procedure);
        Ok(self)
    }

    /// Union of the wire messages of every registered procedure.
    pub fn messages(&self) -> Result<MessageClosure> {
        let mut messages = MessageClosure::new();
        for procedure in &self.procedures {
            messages.merge(procedure.schema().wire_messages())?;
        }
        Ok(messages)
    }

    /// Schema of the service as currently registered.
    pub fn service_schema(&self) -> Result<ServiceSchema> {
        let procedures = self
            .procedures
            .iter()
            .map(|p| p.schema().clone())
            .collect();
        Ok(ServiceSchema::new(
            self.name.clone(),
            self.package.clone(),
            procedures,
        )?)
    }

    /// Render the IDL, materialize the wire types and bind them onto every
    /// procedure. Runs once; later calls return the cached handle.
    pub fn resolve_schema(&mut self) -> Result<&SchemaHandle> {
        if self.handle.is_none() {
            let schema = self.service_schema()?;
            let handle = SchemaHandle::materialize(&schema, self.renderer.as_ref())?;
            self.bind_wire_types(&handle)?;

            for procedure in &mut self.procedures {
                procedure.wrap(&self.middleware);
            }

            info!(
                service = %self.name,
                procedures = self.procedures.len(),
                "service resolved"
            );
            self.handle = Some(handle);
        }

        self.handle
            .as_ref()
            .ok_or_else(|| RpcError::Internal(format!("service {} not resolved", self.name)))
    }

    /// Bind the wire types of `handle` onto every procedure.
    pub fn bind_wire_types(&mut self, handle: &SchemaHandle) -> Result<()> {
        for procedure in &mut self.procedures {
            procedure.bind_wire_types(handle)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("procedures", &self.procedures)
            .field("middleware", &self.middleware.len())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
