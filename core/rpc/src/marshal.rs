// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Conversion between domain messages and wire messages
//!
//! In structured mode a domain message is serialized into a JSON tree with
//! serde, and every declared field is then converted according to its
//! resolved kind: nested messages recurse, raw bytes are copied as bytes,
//! scalars are range checked, repeated fields and maps are converted element
//! by element. The reverse direction reads the wire message field by field,
//! rebuilds the tree and deserializes the domain type from it, so any
//! mismatch surfaces as a [`ValidationError`].
//!
//! In passthrough mode the whole domain message is encoded as JSON and
//! carried in the `bytes` field of the carrier message.

use std::collections::HashMap;

use bytes::Bytes;
use prost::Message as _;
use prost_reflect::{DynamicMessage, Kind, MapKey, MessageDescriptor, ReflectMessage, Value};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use tracing::trace;
use typedrpc_schema::{
    BytesMessage, FieldDescriptor, FieldKind, Message, MessageSchema, Mode, ProcedureSchema,
    ScalarKind,
};

use crate::errors::{Result, RpcError, ValidationError};

type Validated<T> = std::result::Result<T, ValidationError>;

/// Encode a wire message to its binary form.
pub fn encode_wire(message: &DynamicMessage) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

/// Decode a wire message of type `descriptor` from its binary form.
pub fn decode_wire(descriptor: &MessageDescriptor, bytes: Bytes) -> Result<DynamicMessage> {
    DynamicMessage::decode(descriptor.clone(), bytes).map_err(|e| {
        ValidationError::new(
            "",
            format!("malformed {} message: {}", descriptor.name(), e),
        )
        .into()
    })
}

/// Marshals the messages of one procedure.
///
/// Holds no state besides the procedure schema, so it can be created per
/// call and used concurrently.
#[derive(Clone, Copy, Debug)]
pub struct Marshaler<'a> {
    schema: &'a ProcedureSchema,
}

impl<'a> Marshaler<'a> {
    pub fn new(schema: &'a ProcedureSchema) -> Self {
        Self { schema }
    }

    pub fn mode(&self) -> Mode {
        self.schema.mode()
    }

    /// Convert a domain message into a wire message of type `wire`.
    pub fn to_wire<M: Message>(&self, message: &M, wire: &MessageDescriptor) -> Result<DynamicMessage> {
        trace!(message = M::NAME, wire = %wire.name(), mode = %self.mode(), "to wire");

        match self.mode() {
            Mode::Structured => {
                let schema = self.domain_schema(M::NAME)?;
                expect_wire_type(wire, M::NAME)?;
                let tree = serde_json::to_value(message).map_err(|e| {
                    ValidationError::new("", format!("cannot serialize {}: {}", M::NAME, e))
                })?;
                Ok(self.encode_message(schema, &tree, wire)?)
            }
            Mode::Passthrough => {
                expect_wire_type(wire, BytesMessage::NAME)?;
                let encoded = serde_json::to_vec(message).map_err(|e| {
                    ValidationError::new("", format!("cannot serialize {}: {}", M::NAME, e))
                })?;
                let mut carrier = DynamicMessage::new(wire.clone());
                let field = carrier_field(wire)?;
                carrier
                    .try_set_field(&field, Value::Bytes(Bytes::from(encoded)))
                    .map_err(|e| ValidationError::new("bytes", e.to_string()))?;
                Ok(carrier)
            }
        }
    }

    /// Reconstruct a domain message from a wire message.
    pub fn to_domain<M: Message>(&self, wire: &DynamicMessage) -> Result<M> {
        let descriptor = wire.descriptor();
        trace!(message = M::NAME, wire = %descriptor.name(), mode = %self.mode(), "to domain");

        match self.mode() {
            Mode::Structured => {
                let schema = self.domain_schema(M::NAME)?;
                expect_wire_type(&descriptor, M::NAME)?;
                let tree = self.decode_message(schema, wire)?;
                Ok(from_tree(tree)?)
            }
            Mode::Passthrough => {
                expect_wire_type(&descriptor, BytesMessage::NAME)?;
                let field = carrier_field(&descriptor)?;
                let value = wire.get_field(&field);
                let Value::Bytes(bytes) = value.as_ref() else {
                    return Err(ValidationError::new("bytes", "expected bytes").into());
                };
                serde_json::from_slice(bytes).map_err(|e| {
                    ValidationError::new("", format!("cannot decode {}: {}", M::NAME, e)).into()
                })
            }
        }
    }

    fn domain_schema(&self, name: &str) -> Result<&'a MessageSchema> {
        self.schema.lookup(name).ok_or_else(|| {
            RpcError::Internal(format!(
                "message {} is not exchanged by procedure {}",
                name,
                self.schema.name()
            ))
        })
    }

    fn nested_schema(&self, name: &str) -> Validated<&'a MessageSchema> {
        self.schema
            .lookup(name)
            .ok_or_else(|| ValidationError::new("", format!("unknown message type {}", name)))
    }

    fn encode_message(
        &self,
        schema: &MessageSchema,
        tree: &JsonValue,
        wire: &MessageDescriptor,
    ) -> Validated<DynamicMessage> {
        let JsonValue::Object(object) = tree else {
            return Err(ValidationError::new(
                "",
                format!("expected an object for {}", schema.name),
            ));
        };

        if let Some(undeclared) = object.keys().find(|key| schema.field(key).is_none()) {
            return Err(ValidationError::new(
                undeclared.as_str(),
                format!("not a declared field of {}", schema.name),
            ));
        }

        let mut message = DynamicMessage::new(wire.clone());

        for field in &schema.fields {
            let value = object.get(&field.name).unwrap_or(&JsonValue::Null);
            let slot = wire_field(wire, &field.name)?;

            if value.is_null() {
                if field.optional {
                    continue;
                }
                return Err(ValidationError::new(&field.name, "missing required value"));
            }

            let encoded = self
                .encode_field(field, &slot, value)
                .map_err(|e| e.within(&field.name))?;
            message
                .try_set_field(&slot, encoded)
                .map_err(|e| ValidationError::new(&field.name, e.to_string()))?;
        }

        Ok(message)
    }

    fn encode_field(
        &self,
        field: &FieldDescriptor,
        wire: &prost_reflect::FieldDescriptor,
        value: &JsonValue,
    ) -> Validated<Value> {
        match &field.kind {
            FieldKind::Repeated(inner) => {
                let JsonValue::Array(items) = value else {
                    return Err(ValidationError::new("", "expected a sequence"));
                };
                let element_kind = wire.kind();
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.encode_value(inner, &element_kind, item)
                            .map_err(|e| e.within(&format!("[{}]", i)))
                    })
                    .collect::<Validated<Vec<_>>>()
                    .map(Value::List)
            }
            FieldKind::Map(key_kind, value_kind) => {
                let JsonValue::Object(entries) = value else {
                    return Err(ValidationError::new("", "expected a mapping"));
                };
                let Kind::Message(entry) = wire.kind() else {
                    return Err(ValidationError::new("", "wire field is not a map"));
                };
                let value_wire_kind = entry.map_entry_value_field().kind();

                let mut map = HashMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let map_key = encode_key(*key_kind, key)?;
                    let encoded = self
                        .encode_value(value_kind, &value_wire_kind, item)
                        .map_err(|e| e.within(&format!("[{}]", key)))?;
                    map.insert(map_key, encoded);
                }
                Ok(Value::Map(map))
            }
            kind => self.encode_value(kind, &wire.kind(), value),
        }
    }

    fn encode_value(&self, kind: &FieldKind, wire: &Kind, value: &JsonValue) -> Validated<Value> {
        match kind {
            FieldKind::Scalar(scalar) => encode_scalar(*scalar, value),
            FieldKind::Enum(name) => value
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| ValidationError::new("", format!("expected a variant of {}", name))),
            FieldKind::Bytes => encode_bytes(value),
            FieldKind::Message(name) => {
                let schema = self.nested_schema(name)?;
                let Kind::Message(descriptor) = wire else {
                    return Err(ValidationError::new(
                        "",
                        format!("wire field does not carry message {}", name),
                    ));
                };
                self.encode_message(schema, value, descriptor)
                    .map(Value::Message)
            }
            FieldKind::Repeated(_) | FieldKind::Map(_, _) => Err(ValidationError::new(
                "",
                "nested containers cannot be carried",
            )),
        }
    }

    fn decode_message(&self, schema: &MessageSchema, message: &DynamicMessage) -> Validated<JsonValue> {
        let descriptor = message.descriptor();
        let mut object = JsonMap::new();

        for field in &schema.fields {
            let slot = wire_field(&descriptor, &field.name)?;

            let decoded = if field.has_presence() && !message.has_field(&slot) {
                JsonValue::Null
            } else {
                let value = message.get_field(&slot);
                self.decode_field(field, value.as_ref())
                    .map_err(|e| e.within(&field.name))?
            };

            object.insert(field.name.clone(), decoded);
        }

        Ok(JsonValue::Object(object))
    }

    fn decode_field(&self, field: &FieldDescriptor, value: &Value) -> Validated<JsonValue> {
        match (&field.kind, value) {
            (FieldKind::Repeated(inner), Value::List(items)) => {
                if field.optional && items.is_empty() {
                    return Ok(JsonValue::Null);
                }
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.decode_value(inner, item)
                            .map_err(|e| e.within(&format!("[{}]", i)))
                    })
                    .collect::<Validated<Vec<_>>>()
                    .map(JsonValue::Array)
            }
            (FieldKind::Map(_, value_kind), Value::Map(entries)) => {
                if field.optional && entries.is_empty() {
                    return Ok(JsonValue::Null);
                }
                let mut object = JsonMap::new();
                for (key, item) in entries {
                    let key = decode_key(key);
                    let decoded = self
                        .decode_value(value_kind, item)
                        .map_err(|e| e.within(&format!("[{}]", key)))?;
                    object.insert(key, decoded);
                }
                Ok(JsonValue::Object(object))
            }
            (FieldKind::Repeated(_), _) => Err(ValidationError::new("", "expected a list")),
            (FieldKind::Map(_, _), _) => Err(ValidationError::new("", "expected a map")),
            (kind, value) => self.decode_value(kind, value),
        }
    }

    fn decode_value(&self, kind: &FieldKind, value: &Value) -> Validated<JsonValue> {
        match (kind, value) {
            (FieldKind::Scalar(scalar), value) => decode_scalar(*scalar, value),
            (FieldKind::Enum(_), Value::String(s)) => Ok(JsonValue::String(s.clone())),
            (FieldKind::Bytes, Value::Bytes(bytes)) => Ok(JsonValue::Array(
                bytes.iter().map(|b| JsonValue::from(*b)).collect(),
            )),
            (FieldKind::Message(name), Value::Message(nested)) => {
                let schema = self.nested_schema(name)?;
                if nested.descriptor().name() != name {
                    return Err(ValidationError::new(
                        "",
                        format!("expected message {}, found {}", name, nested.descriptor().name()),
                    ));
                }
                self.decode_message(schema, nested)
            }
            (kind, value) => Err(mismatch(kind, value)),
        }
    }
}

fn expect_wire_type(descriptor: &MessageDescriptor, expected: &str) -> Validated<()> {
    if descriptor.name() == expected {
        Ok(())
    } else {
        Err(ValidationError::new(
            "",
            format!(
                "expected wire message {}, found {}",
                expected,
                descriptor.name()
            ),
        ))
    }
}

fn carrier_field(descriptor: &MessageDescriptor) -> Validated<prost_reflect::FieldDescriptor> {
    wire_field(descriptor, "bytes")
}

fn wire_field(descriptor: &MessageDescriptor, name: &str) -> Validated<prost_reflect::FieldDescriptor> {
    descriptor.get_field_by_name(name).ok_or_else(|| {
        ValidationError::new(
            name,
            format!("not a field of wire message {}", descriptor.name()),
        )
    })
}

fn from_tree<M: Message>(tree: JsonValue) -> Validated<M> {
    serde_json::from_value(tree)
        .map_err(|e| ValidationError::new("", format!("invalid {}: {}", M::NAME, e)))
}

fn out_of_range(scalar: ScalarKind, value: &JsonValue) -> ValidationError {
    ValidationError::new("", format!("expected {}, found {}", scalar, value))
}

fn encode_scalar(scalar: ScalarKind, value: &JsonValue) -> Validated<Value> {
    let encoded = match scalar {
        ScalarKind::Bool => value.as_bool().map(Value::Bool),
        ScalarKind::Int32 => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::I32),
        ScalarKind::Int64 => value.as_i64().map(Value::I64),
        ScalarKind::Uint32 => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Value::U32),
        ScalarKind::Uint64 => value.as_u64().map(Value::U64),
        ScalarKind::Float => value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| Value::F32(v as f32)),
        ScalarKind::Double => value.as_f64().filter(|v| v.is_finite()).map(Value::F64),
        ScalarKind::String => value.as_str().map(|s| Value::String(s.to_string())),
    };
    encoded.ok_or_else(|| out_of_range(scalar, value))
}

fn decode_scalar(scalar: ScalarKind, value: &Value) -> Validated<JsonValue> {
    let decoded = match (scalar, value) {
        (ScalarKind::Bool, Value::Bool(v)) => Some(JsonValue::Bool(*v)),
        (ScalarKind::Int32, Value::I32(v)) => Some(JsonValue::from(*v)),
        (ScalarKind::Int64, Value::I64(v)) => Some(JsonValue::from(*v)),
        (ScalarKind::Uint32, Value::U32(v)) => Some(JsonValue::from(*v)),
        (ScalarKind::Uint64, Value::U64(v)) => Some(JsonValue::from(*v)),
        (ScalarKind::Float, Value::F32(v)) => Number::from_f64(f64::from(*v)).map(JsonValue::Number),
        (ScalarKind::Double, Value::F64(v)) => Number::from_f64(*v).map(JsonValue::Number),
        (ScalarKind::String, Value::String(s)) => Some(JsonValue::String(s.clone())),
        _ => None,
    };
    decoded.ok_or_else(|| mismatch(&FieldKind::Scalar(scalar), value))
}

// serde_json carries bytes as an array of numbers
fn encode_bytes(value: &JsonValue) -> Validated<Value> {
    let JsonValue::Array(items) = value else {
        return Err(ValidationError::new("", "expected bytes"));
    };
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| ValidationError::new("", format!("invalid byte {}", item)))
        })
        .collect::<Validated<Vec<u8>>>()
        .map(|bytes| Value::Bytes(Bytes::from(bytes)))
}

fn encode_key(kind: ScalarKind, key: &str) -> Validated<MapKey> {
    let invalid = || ValidationError::new(format!("[{}]", key), format!("invalid {} map key", kind));
    let parsed = match kind {
        ScalarKind::String => MapKey::String(key.to_string()),
        ScalarKind::Bool => MapKey::Bool(key.parse().map_err(|_| invalid())?),
        ScalarKind::Int32 => MapKey::I32(key.parse().map_err(|_| invalid())?),
        ScalarKind::Int64 => MapKey::I64(key.parse().map_err(|_| invalid())?),
        ScalarKind::Uint32 => MapKey::U32(key.parse().map_err(|_| invalid())?),
        ScalarKind::Uint64 => MapKey::U64(key.parse().map_err(|_| invalid())?),
        ScalarKind::Float | ScalarKind::Double => return Err(invalid()),
    };
    Ok(parsed)
}

fn decode_key(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => v.clone(),
    }
}

fn mismatch(kind: &FieldKind, value: &Value) -> ValidationError {
    ValidationError::new("", format!("expected {}, found {:?}", kind, value))
}
