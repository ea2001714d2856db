// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Service schema and IDL rendering.

use std::collections::HashSet;
use std::fmt::Write;

use crate::closure::MessageClosure;
use crate::errors::{Result, SchemaError};
use crate::procedure::ProcedureSchema;
use crate::utils::camel_to_snake;

/// Resolved procedures of one service, in registration order.
#[derive(Clone, Debug)]
pub struct ServiceSchema {
    name: String,
    package: String,
    procedures: Vec<ProcedureSchema>,
    messages: MessageClosure,
}

impl ServiceSchema {
    /// Assemble a service schema. The package defaults to the snake case
    /// form of the service name.
    pub fn new(
        name: impl Into<String>,
        package: Option<String>,
        procedures: Vec<ProcedureSchema>,
    ) -> Result<Self> {
        let name = name.into();
        let package = package.unwrap_or_else(|| camel_to_snake(&name));

        let mut rpc_names = HashSet::with_capacity(procedures.len());
        let mut messages = MessageClosure::new();
        for procedure in &procedures {
            if !rpc_names.insert(procedure.rpc_name()) {
                return Err(SchemaError::DuplicateProcedure(procedure.rpc_name().to_string()));
            }
            messages.merge(procedure.wire_messages())?;
        }

        Ok(Self {
            name,
            package,
            procedures,
            messages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn procedures(&self) -> &[ProcedureSchema] {
        &self.procedures
    }

    /// Union of the wire messages of every procedure.
    pub fn messages(&self) -> &MessageClosure {
        &self.messages
    }

    /// Fully qualified service name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

/// Produces IDL text from a service schema.
pub trait SchemaRenderer: Send + Sync {
    fn render(&self, service: &ServiceSchema) -> Result<String>;
}

/// Renders proto3 IDL.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProtoRenderer;

impl SchemaRenderer for ProtoRenderer {
    fn render(&self, service: &ServiceSchema) -> Result<String> {
        let mut out = String::new();

        writeln!(out, "syntax = \"proto3\";")?;
        writeln!(out)?;
        writeln!(out, "package {};", service.package())?;
        writeln!(out)?;

        writeln!(out, "service {} {{", service.name())?;
        for procedure in service.procedures() {
            writeln!(
                out,
                "  rpc {}({}{}) returns ({}{});",
                procedure.rpc_name(),
                if procedure.request_streaming() { "stream " } else { "" },
                procedure.wire_request_name(),
                if procedure.response_streaming() { "stream " } else { "" },
                procedure.wire_response_name(),
            )?;
        }
        writeln!(out, "}}")?;

        for message in service.messages().iter() {
            writeln!(out)?;
            writeln!(out, "message {} {{", message.name)?;
            for (i, field) in message.fields.iter().enumerate() {
                let label = if field.has_presence() { "optional " } else { "" };
                writeln!(out, "  {}{} {} = {};", label, field.kind, field.name, i + 1)?;
            }
            writeln!(out, "}}")?;
        }

        Ok(out)
    }
}
