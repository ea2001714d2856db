// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Type resolver: declared type to wire field descriptor.

use std::collections::HashSet;

use crate::descriptor::{FieldDescriptor, FieldKind, MessageSchema, ScalarKind};
use crate::errors::{Result, SchemaError};
use crate::types::{DeclaredType, Field, MessageType};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Field,
    Element,
}

/// Resolve a single field.
pub fn resolve_field(field: &Field) -> Result<FieldDescriptor> {
    resolve(field.name(), field.ty())
}

/// Resolve a declared type for the field `name`.
pub fn resolve(name: &str, ty: &DeclaredType) -> Result<FieldDescriptor> {
    let (kind, optional) = match ty {
        DeclaredType::Union(members) => {
            let inner = unwrap_optional(name, ty, members)?;
            (resolve_kind(name, ty, inner, Position::Field)?, true)
        }
        _ => (resolve_kind(name, ty, ty, Position::Field)?, false),
    };

    Ok(FieldDescriptor {
        name: name.to_string(),
        kind,
        optional,
    })
}

/// Resolve every field of a message type.
pub fn resolve_message(message: MessageType) -> Result<MessageSchema> {
    let fields = message.fields();
    let mut seen = HashSet::with_capacity(fields.len());
    let mut resolved = Vec::with_capacity(fields.len());

    for field in &fields {
        if !seen.insert(field.name()) {
            return Err(SchemaError::unsupported(
                field.name(),
                field.ty(),
                format!("field declared twice in message `{}`", message.name()),
            ));
        }
        resolved.push(resolve_field(field)?);
    }

    Ok(MessageSchema {
        name: message.name().to_string(),
        fields: resolved,
    })
}

fn scalar(ty: &DeclaredType) -> Option<ScalarKind> {
    let kind = match ty {
        DeclaredType::Bool => ScalarKind::Bool,
        DeclaredType::I32 => ScalarKind::Int32,
        DeclaredType::I64 => ScalarKind::Int64,
        DeclaredType::U32 => ScalarKind::Uint32,
        DeclaredType::U64 => ScalarKind::Uint64,
        DeclaredType::F32 => ScalarKind::Float,
        DeclaredType::F64 => ScalarKind::Double,
        DeclaredType::Text
        | DeclaredType::Uuid
        | DeclaredType::Date
        | DeclaredType::Time
        | DeclaredType::DateTime => ScalarKind::String,
        _ => return None,
    };
    Some(kind)
}

// Exactly one non-null member is allowed.
fn unwrap_optional<'a>(
    name: &str,
    declared: &DeclaredType,
    members: &'a [DeclaredType],
) -> Result<&'a DeclaredType> {
    let concrete: Vec<&DeclaredType> = members
        .iter()
        .filter(|m| **m != DeclaredType::Null)
        .collect();

    match concrete.as_slice() {
        [inner] => {
            if matches!(inner, DeclaredType::Union(_)) {
                return Err(SchemaError::unsupported(
                    name,
                    declared,
                    "nested optional types have no wire representation",
                ));
            }
            Ok(inner)
        }
        [] => Err(SchemaError::unsupported(
            name,
            declared,
            "union has no concrete member",
        )),
        more => Err(SchemaError::unsupported(
            name,
            declared,
            format!(
                "union with {} concrete members is ambiguous, only optional (one member) is supported",
                more.len()
            ),
        )),
    }
}

fn resolve_kind(
    name: &str,
    declared: &DeclaredType,
    ty: &DeclaredType,
    position: Position,
) -> Result<FieldKind> {
    if let Some(kind) = scalar(ty) {
        return Ok(FieldKind::Scalar(kind));
    }

    match ty {
        DeclaredType::Bytes => Ok(FieldKind::Bytes),
        DeclaredType::Enum(enumeration) => Ok(FieldKind::Enum(enumeration.name().to_string())),
        DeclaredType::Message(message) => Ok(FieldKind::Message(message.name().to_string())),
        DeclaredType::Union(_) if position == Position::Element => Err(SchemaError::unsupported(
            name,
            declared,
            "optional elements have no wire representation",
        )),
        DeclaredType::Union(members) => {
            let inner = unwrap_optional(name, declared, members)?;
            resolve_kind(name, declared, inner, position)
        }
        DeclaredType::Sequence(params) => {
            if position == Position::Element {
                return Err(nested_container(name, declared));
            }
            if params.len() != 1 {
                return Err(SchemaError::unsupported(
                    name,
                    declared,
                    format!(
                        "sequence expects exactly 1 type parameter, found {}",
                        params.len()
                    ),
                ));
            }
            let inner = resolve_kind(name, declared, &params[0], Position::Element)?;
            Ok(FieldKind::Repeated(Box::new(inner)))
        }
        DeclaredType::Mapping(params) => {
            if position == Position::Element {
                return Err(nested_container(name, declared));
            }
            if params.len() != 2 {
                return Err(SchemaError::unsupported(
                    name,
                    declared,
                    format!(
                        "mapping expects exactly 2 type parameters, found {}",
                        params.len()
                    ),
                ));
            }
            let key = resolve_key(name, declared, &params[0])?;
            let value = resolve_kind(name, declared, &params[1], Position::Element)?;
            Ok(FieldKind::Map(key, Box::new(value)))
        }
        DeclaredType::Stream(_) => Err(SchemaError::unsupported(
            name,
            declared,
            "streams are only valid in procedure signatures",
        )),
        DeclaredType::Null => Err(SchemaError::unsupported(
            name,
            declared,
            "null is only valid as a member of an optional type",
        )),
        _ => Err(SchemaError::unsupported(name, declared, "unknown type")),
    }
}

fn resolve_key(name: &str, declared: &DeclaredType, ty: &DeclaredType) -> Result<ScalarKind> {
    let key = match ty {
        DeclaredType::Enum(_) => Some(ScalarKind::String),
        other => scalar(other),
    };

    match key {
        Some(kind) if kind.is_map_key() => Ok(kind),
        Some(kind) => Err(SchemaError::unsupported(
            name,
            declared,
            format!("map key of kind {} is not allowed", kind),
        )),
        None => Err(SchemaError::unsupported(
            name,
            declared,
            format!("map key must be a primitive type, found {}", ty),
        )),
    }
}

fn nested_container(name: &str, declared: &DeclaredType) -> SchemaError {
    SchemaError::unsupported(
        name,
        declared,
        "nested containers are not supported, wrap the inner container in a message",
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::{Declare, EnumType};

    fn kind_of(ty: DeclaredType) -> FieldKind {
        resolve("f", &ty).unwrap().kind
    }

    fn reason_of(ty: DeclaredType) -> (String, String) {
        match resolve("f", &ty) {
            Err(SchemaError::UnsupportedType { field, reason, .. }) => (field, reason),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_scalars() {
        assert_eq!(kind_of(DeclaredType::I64), FieldKind::Scalar(ScalarKind::Int64));
        assert_eq!(kind_of(DeclaredType::F64), FieldKind::Scalar(ScalarKind::Double));
        assert_eq!(kind_of(DeclaredType::Uuid), FieldKind::Scalar(ScalarKind::String));
        assert_eq!(kind_of(DeclaredType::DateTime), FieldKind::Scalar(ScalarKind::String));
        assert_eq!(kind_of(DeclaredType::Bytes), FieldKind::Bytes);
        assert_eq!(
            kind_of(DeclaredType::Enum(EnumType::new("Color", &["red"]))),
            FieldKind::Enum("Color".to_string())
        );
    }

    #[test]
    fn test_optional() {
        let field = resolve("note", &<Option<String>>::declared_type()).unwrap();
        assert!(field.optional);
        assert!(field.has_presence());
        assert_eq!(field.kind, FieldKind::Scalar(ScalarKind::String));

        let field = resolve("tags", &<Option<Vec<String>>>::declared_type()).unwrap();
        assert!(field.optional);
        assert!(!field.has_presence());
    }

    #[test]
    fn test_containers() {
        assert_eq!(
            kind_of(<Vec<i32>>::declared_type()),
            FieldKind::Repeated(Box::new(FieldKind::Scalar(ScalarKind::Int32)))
        );
        assert_eq!(
            kind_of(<HashMap<u64, bool>>::declared_type()),
            FieldKind::Map(ScalarKind::Uint64, Box::new(FieldKind::Scalar(ScalarKind::Bool)))
        );
    }

    #[test]
    fn test_arity_errors() {
        let (field, reason) = reason_of(DeclaredType::Sequence(vec![
            DeclaredType::I32,
            DeclaredType::Text,
        ]));
        assert_eq!(field, "f");
        assert!(reason.contains("found 2"), "{}", reason);

        let (_, reason) = reason_of(DeclaredType::Mapping(vec![DeclaredType::Text]));
        assert!(reason.contains("found 1"), "{}", reason);

        let (_, reason) = reason_of(DeclaredType::Mapping(vec![
            DeclaredType::Text,
            DeclaredType::I32,
            DeclaredType::I32,
        ]));
        assert!(reason.contains("found 3"), "{}", reason);
    }

    #[test]
    fn test_rejections() {
        let (_, reason) = reason_of(DeclaredType::Union(vec![
            DeclaredType::I32,
            DeclaredType::Text,
            DeclaredType::Null,
        ]));
        assert!(reason.contains("2 concrete members"), "{}", reason);

        let (_, reason) = reason_of(<Vec<Vec<i32>>>::declared_type());
        assert!(reason.contains("nested containers"), "{}", reason);

        let (_, reason) = reason_of(<HashMap<String, Vec<i32>>>::declared_type());
        assert!(reason.contains("nested containers"), "{}", reason);

        let (_, reason) = reason_of(DeclaredType::Mapping(vec![
            DeclaredType::F64,
            DeclaredType::I32,
        ]));
        assert!(reason.contains("double"), "{}", reason);

        let (_, reason) = reason_of(DeclaredType::Mapping(vec![
            DeclaredType::Bytes,
            DeclaredType::I32,
        ]));
        assert!(reason.contains("primitive"), "{}", reason);

        let (_, reason) = reason_of(DeclaredType::Stream(vec![DeclaredType::I32]));
        assert!(reason.contains("signatures"), "{}", reason);

        let (_, reason) = reason_of(<Option<Option<i32>>>::declared_type());
        assert!(reason.contains("nested optional"), "{}", reason);

        let (field, reason) = reason_of(<Vec<Option<i32>>>::declared_type());
        assert_eq!(field, "f");
        assert!(reason.contains("optional elements"), "{}", reason);

        let (_, reason) = reason_of(<HashMap<String, Option<bool>>>::declared_type());
        assert!(reason.contains("optional elements"), "{}", reason);
    }

    #[test]
    fn test_error_names_field_and_declaration() {
        let err = resolve("values", &DeclaredType::Sequence(vec![]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("`values`"), "{}", err);
        assert!(err.contains("Sequence[]"), "{}", err);
    }
}
