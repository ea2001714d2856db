// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Wire schema materialization.
//!
//! Builds a protobuf file descriptor from the same resolved model the
//! renderer consumes, and loads it into a descriptor pool from which wire
//! message types are looked up by name.

use prost_reflect::{DescriptorPool, MessageDescriptor, ServiceDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MessageOptions, MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
};
use tracing::{debug, info};

use crate::descriptor::{FieldDescriptor, FieldKind, MessageSchema, ScalarKind};
use crate::errors::Result;
use crate::idl::{SchemaRenderer, ServiceSchema};
use crate::utils::{camel_to_snake, snake_to_camel};

/// Result of schema resolution: the IDL text and the wire types it declares.
#[derive(Clone, Debug)]
pub struct SchemaHandle {
    service: String,
    package: String,
    idl: String,
    pool: DescriptorPool,
}

impl SchemaHandle {
    /// Render the IDL of `service` and materialize its wire types.
    pub fn materialize(service: &ServiceSchema, renderer: &dyn SchemaRenderer) -> Result<Self> {
        let idl = renderer.render(service)?;
        let file = file_descriptor(service);

        debug!(
            service = %service.name(),
            messages = service.messages().len(),
            "building descriptor pool"
        );
        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })?;

        info!(service = %service.full_name(), "schema resolved");

        Ok(Self {
            service: service.name().to_string(),
            package: service.package().to_string(),
            idl,
            pool,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// The rendered IDL text.
    pub fn idl(&self) -> &str {
        &self.idl
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Wire message type by unqualified name.
    pub fn message(&self, name: &str) -> Option<MessageDescriptor> {
        self.pool
            .get_message_by_name(&format!("{}.{}", self.package, name))
    }

    pub fn service(&self) -> Option<ServiceDescriptor> {
        self.pool
            .get_service_by_name(&format!("{}.{}", self.package, self.service))
    }

    /// Transport path of a procedure: `/{package}.{Service}/{Rpc}`.
    pub fn path(&self, rpc_name: &str) -> String {
        format!("/{}.{}/{}", self.package, self.service, rpc_name)
    }
}

/// File descriptor equivalent to the rendered IDL.
pub fn file_descriptor(service: &ServiceSchema) -> FileDescriptorProto {
    let package = service.package();

    let methods = service
        .procedures()
        .iter()
        .map(|procedure| MethodDescriptorProto {
            name: Some(procedure.rpc_name().to_string()),
            input_type: Some(qualified(package, procedure.wire_request_name())),
            output_type: Some(qualified(package, procedure.wire_response_name())),
            client_streaming: Some(procedure.request_streaming()),
            server_streaming: Some(procedure.response_streaming()),
            ..Default::default()
        })
        .collect();

    FileDescriptorProto {
        name: Some(format!("{}.proto", camel_to_snake(service.name()))),
        package: Some(package.to_string()),
        syntax: Some("proto3".to_string()),
        message_type: service
            .messages()
            .iter()
            .map(|message| message_descriptor(package, message))
            .collect(),
        service: vec![ServiceDescriptorProto {
            name: Some(service.name().to_string()),
            method: methods,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn qualified(package: &str, name: &str) -> String {
    format!(".{}.{}", package, name)
}

fn scalar_type(kind: ScalarKind) -> Type {
    match kind {
        ScalarKind::Double => Type::Double,
        ScalarKind::Float => Type::Float,
        ScalarKind::Int32 => Type::Int32,
        ScalarKind::Int64 => Type::Int64,
        ScalarKind::Uint32 => Type::Uint32,
        ScalarKind::Uint64 => Type::Uint64,
        ScalarKind::Bool => Type::Bool,
        ScalarKind::String => Type::String,
    }
}

// Wire type and type name of a non-container kind.
fn element_type(package: &str, kind: &FieldKind) -> (Type, Option<String>) {
    match kind {
        FieldKind::Scalar(scalar) => (scalar_type(*scalar), None),
        FieldKind::Enum(_) => (Type::String, None),
        FieldKind::Bytes => (Type::Bytes, None),
        FieldKind::Message(name) => (Type::Message, Some(qualified(package, name))),
        // containers never nest, see the resolver
        FieldKind::Repeated(inner) | FieldKind::Map(_, inner) => element_type(package, inner),
    }
}

fn field_proto(
    name: &str,
    number: i32,
    label: Label,
    (ty, type_name): (Type, Option<String>),
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        type_name,
        json_name: None,
        ..Default::default()
    }
}

fn message_descriptor(package: &str, message: &MessageSchema) -> DescriptorProto {
    let mut proto = DescriptorProto {
        name: Some(message.name.clone()),
        ..Default::default()
    };
    // synthetic oneofs for proto3 optional fields
    let mut oneofs = Vec::new();

    for (i, field) in message.fields.iter().enumerate() {
        let number = i as i32 + 1;
        let descriptor = match &field.kind {
            FieldKind::Repeated(inner) => field_proto(
                &field.name,
                number,
                Label::Repeated,
                element_type(package, inner),
            ),
            FieldKind::Map(key, value) => {
                let entry = map_entry(package, field, *key, value);
                let entry_name = format!("{}.{}", message.name, entry.name());
                proto.nested_type.push(entry);
                field_proto(
                    &field.name,
                    number,
                    Label::Repeated,
                    (Type::Message, Some(qualified(package, &entry_name))),
                )
            }
            kind => {
                let mut single = field_proto(
                    &field.name,
                    number,
                    Label::Optional,
                    element_type(package, kind),
                );
                if field.has_presence() {
                    single.proto3_optional = Some(true);
                    single.oneof_index = Some(oneofs.len() as i32);
                    oneofs.push(OneofDescriptorProto {
                        name: Some(format!("_{}", field.name)),
                        ..Default::default()
                    });
                }
                single
            }
        };
        proto.field.push(descriptor);
    }

    proto.oneof_decl = oneofs;
    proto
}

fn map_entry(
    package: &str,
    field: &FieldDescriptor,
    key: ScalarKind,
    value: &FieldKind,
) -> DescriptorProto {
    DescriptorProto {
        name: Some(format!("{}Entry", snake_to_camel(&field.name))),
        field: vec![
            field_proto("key", 1, Label::Optional, (scalar_type(key), None)),
            field_proto("value", 2, Label::Optional, element_type(package, value)),
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}
