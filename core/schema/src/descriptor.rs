// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Resolved wire field descriptors.

use std::fmt;

/// Primitive wire kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Bool,
    String,
}

impl ScalarKind {
    /// Name of the kind in the IDL.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::Double => "double",
            ScalarKind::Float => "float",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Bool => "bool",
            ScalarKind::String => "string",
        }
    }

    /// Whether the kind can be used as a map key.
    pub fn is_map_key(&self) -> bool {
        !matches!(self, ScalarKind::Double | ScalarKind::Float)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wire shape of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// Reference to another message by name.
    Message(String),
    /// Enumeration, carried as its variant name.
    Enum(String),
    /// Raw bytes, never reinterpreted.
    Bytes,
    Repeated(Box<FieldKind>),
    Map(ScalarKind, Box<FieldKind>),
}

impl FieldKind {
    pub fn is_container(&self) -> bool {
        matches!(self, FieldKind::Repeated(_) | FieldKind::Map(_, _))
    }

    /// Name of the referenced message, if the kind or its element is one.
    pub fn message_name(&self) -> Option<&str> {
        match self {
            FieldKind::Message(name) => Some(name),
            FieldKind::Repeated(inner) | FieldKind::Map(_, inner) => inner.message_name(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(kind) => write!(f, "{}", kind),
            FieldKind::Message(name) => write!(f, "{}", name),
            FieldKind::Enum(_) => write!(f, "string"),
            FieldKind::Bytes => write!(f, "bytes"),
            FieldKind::Repeated(inner) => write!(f, "repeated {}", inner),
            FieldKind::Map(key, value) => write!(f, "map<{}, {}>", key, value),
        }
    }
}

/// A resolved field of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Declared as optional. Containers stay unmarked on the wire; an absent
    /// optional container travels as an empty one.
    pub optional: bool,
}

impl FieldDescriptor {
    /// Whether the wire schema marks the field with explicit presence.
    pub fn has_presence(&self) -> bool {
        self.optional && !self.kind.is_container()
    }
}

/// A resolved message: name and fields in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageSchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl MessageSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        let kind = FieldKind::Map(
            ScalarKind::String,
            Box::new(FieldKind::Message("Item".to_string())),
        );
        assert_eq!(kind.to_string(), "map<string, Item>");
        assert_eq!(kind.message_name(), Some("Item"));
        assert_eq!(
            FieldKind::Repeated(Box::new(FieldKind::Enum("Color".to_string()))).to_string(),
            "repeated string"
        );
    }

    #[test]
    fn test_presence() {
        let field = FieldDescriptor {
            name: "tags".to_string(),
            kind: FieldKind::Repeated(Box::new(FieldKind::Scalar(ScalarKind::String))),
            optional: true,
        };
        assert!(!field.has_presence());
        assert!(!ScalarKind::Double.is_map_key());
        assert!(ScalarKind::Uint64.is_map_key());
    }
}
