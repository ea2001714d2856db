// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Declared types of domain messages
//!
//! Every field of a domain message and every parameter of a procedure
//! handler carries a [`DeclaredType`]. The grammar is closed: the resolver
//! in [`crate::resolver`] knows how to map each variant onto a wire field
//! kind, or rejects it with a precise error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Reference to a named domain message type.
///
/// The field list is produced lazily through a function pointer so that
/// self-referential and mutually recursive message types can be declared.
#[derive(Clone, Copy)]
pub struct MessageType {
    name: &'static str,
    fields: fn() -> Vec<Field>,
}

impl MessageType {
    pub const fn new(name: &'static str, fields: fn() -> Vec<Field>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> Vec<Field> {
        (self.fields)()
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for MessageType {}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageType").field(&self.name).finish()
    }
}

/// Enumeration carried on the wire as its variant name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnumType {
    name: &'static str,
    variants: &'static [&'static str],
}

impl EnumType {
    pub const fn new(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self { name, variants }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn variants(&self) -> &'static [&'static str] {
        self.variants
    }
}

/// The closed grammar of declared types.
///
/// Container variants keep every declared type parameter, even when the
/// count is wrong, so that arity errors can be reported instead of being
/// impossible to express.
#[derive(Clone, Debug, PartialEq)]
pub enum DeclaredType {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Text,
    Bytes,
    Uuid,
    Date,
    Time,
    DateTime,
    /// The absent value. Only meaningful as a member of a union.
    Null,
    Union(Vec<DeclaredType>),
    Sequence(Vec<DeclaredType>),
    Mapping(Vec<DeclaredType>),
    /// An iterable of values, valid only in procedure signatures.
    Stream(Vec<DeclaredType>),
    Message(MessageType),
    Enum(EnumType),
}

impl DeclaredType {
    /// Shorthand for `Union([inner, Null])`.
    pub fn optional(inner: DeclaredType) -> Self {
        DeclaredType::Union(vec![inner, DeclaredType::Null])
    }

    pub fn as_message(&self) -> Option<MessageType> {
        match self {
            DeclaredType::Message(message) => Some(*message),
            _ => None,
        }
    }
}

fn write_params(f: &mut fmt::Formatter<'_>, name: &str, params: &[DeclaredType]) -> fmt::Result {
    write!(f, "{}[", name)?;
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", param)?;
    }
    write!(f, "]")
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Bool => write!(f, "bool"),
            DeclaredType::I32 => write!(f, "i32"),
            DeclaredType::I64 => write!(f, "i64"),
            DeclaredType::U32 => write!(f, "u32"),
            DeclaredType::U64 => write!(f, "u64"),
            DeclaredType::F32 => write!(f, "f32"),
            DeclaredType::F64 => write!(f, "f64"),
            DeclaredType::Text => write!(f, "text"),
            DeclaredType::Bytes => write!(f, "bytes"),
            DeclaredType::Uuid => write!(f, "uuid"),
            DeclaredType::Date => write!(f, "date"),
            DeclaredType::Time => write!(f, "time"),
            DeclaredType::DateTime => write!(f, "datetime"),
            DeclaredType::Null => write!(f, "null"),
            DeclaredType::Union(members) => write_params(f, "Union", members),
            DeclaredType::Sequence(params) => write_params(f, "Sequence", params),
            DeclaredType::Mapping(params) => write_params(f, "Mapping", params),
            DeclaredType::Stream(params) => write_params(f, "Stream", params),
            DeclaredType::Message(message) => write!(f, "{}", message.name()),
            DeclaredType::Enum(enumeration) => write!(f, "{}", enumeration.name()),
        }
    }
}

/// A named, typed field of a domain message.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: &'static str,
    ty: DeclaredType,
}

impl Field {
    pub fn new(name: &'static str, ty: DeclaredType) -> Self {
        Self { name, ty }
    }

    /// Field whose declared type is derived from a Rust type.
    pub fn of<T: Declare>(name: &'static str) -> Self {
        Self::new(name, T::declared_type())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ty(&self) -> &DeclaredType {
        &self.ty
    }
}

/// Maps a Rust type onto the declared-type grammar.
///
/// Implemented for primitives, well-known scalars, `Option`, `Vec`, maps and
/// every [`Message`]. Enumerations implement it by hand, returning
/// [`DeclaredType::Enum`].
pub trait Declare {
    fn declared_type() -> DeclaredType;
}

macro_rules! declare {
    ($($ty:ty => $declared:ident),* $(,)?) => {
        $(
            impl Declare for $ty {
                fn declared_type() -> DeclaredType {
                    DeclaredType::$declared
                }
            }
        )*
    };
}

declare! {
    bool => Bool,
    i8 => I32,
    i16 => I32,
    i32 => I32,
    i64 => I64,
    u8 => U32,
    u16 => U32,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Text,
    Bytes => Bytes,
    uuid::Uuid => Uuid,
    chrono::NaiveDate => Date,
    chrono::NaiveTime => Time,
    chrono::NaiveDateTime => DateTime,
}

impl<Tz: chrono::TimeZone> Declare for chrono::DateTime<Tz> {
    fn declared_type() -> DeclaredType {
        DeclaredType::DateTime
    }
}

impl<T: Declare> Declare for Option<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::optional(T::declared_type())
    }
}

impl<T: Declare> Declare for Vec<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Sequence(vec![T::declared_type()])
    }
}

impl<K: Declare, V: Declare, S> Declare for HashMap<K, V, S> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Mapping(vec![K::declared_type(), V::declared_type()])
    }
}

impl<K: Declare, V: Declare> Declare for BTreeMap<K, V> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Mapping(vec![K::declared_type(), V::declared_type()])
    }
}

impl<M: Message> Declare for M {
    fn declared_type() -> DeclaredType {
        DeclaredType::Message(M::message_type())
    }
}

/// A typed domain message exchanged by procedures.
///
/// `fields` must list every field the serde representation produces, under
/// the same names, which is what `#[derive(Serialize, Deserialize)]` gives by
/// default. Structured marshaling rejects a serialized field that is not
/// declared instead of dropping it.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Message name, unique within a service.
    const NAME: &'static str;

    /// Declared fields, in wire order.
    fn fields() -> Vec<Field>;

    fn message_type() -> MessageType
    where
        Self: Sized,
    {
        MessageType::new(Self::NAME, Self::fields)
    }
}

/// Opaque carrier used by passthrough procedures: the whole domain message,
/// encoded, travels in its single `bytes` field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytesMessage {
    pub bytes: Bytes,
}

impl Message for BytesMessage {
    const NAME: &'static str = "BytesMessage";

    fn fields() -> Vec<Field> {
        vec![Field::of::<Bytes>("bytes")]
    }
}
