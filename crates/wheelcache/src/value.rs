//! The cache's value model: a closed set of persistable primitives plus an
//! opaque escape hatch for values with no wire representation.

use std::any::Any;
use std::sync::Arc;

use crate::error::CodecError;

/// TypeId table for the snapshot codec.
pub mod type_id {
    pub const BYTES: u8 = 65;
    pub const TEXT: u8 = 66;
    pub const INT: u8 = 67;
    pub const UINT: u8 = 68;
    pub const BOOL: u8 = 69;
    pub const F32: u8 = 70;
    pub const F64: u8 = 71;
    pub const I8: u8 = 72;
    pub const I16: u8 = 73;
    pub const I32: u8 = 74;
    pub const I64: u8 = 75;
    pub const U8: u8 = 76;
    pub const U16: u8 = 77;
    pub const U32: u8 = 78;
    pub const U64: u8 = 79;
    /// Never written; reserved for values with no persistable representation.
    pub const UNSUPPORTED: u8 = 80;
}

/// A value held by the cache.
///
/// `Opaque` carries anything that implements `Any + Send + Sync` but has no
/// persistable representation; `Scan` and `SaveBaseType` see it and skip it,
/// so an unsupported value type never corrupts the stream.
#[derive(Clone)]
pub enum Value {
    Bytes(Vec<u8>),
    Text(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
    F32(f32),
    F64(f64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bytes(v) => f.debug_tuple("Bytes").field(&v.len()).finish(),
            Value::Text(v) => f.debug_tuple("Text").field(v).finish(),
            Value::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Value::UInt(v) => f.debug_tuple("UInt").field(v).finish(),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::F32(v) => f.debug_tuple("F32").field(v).finish(),
            Value::F64(v) => f.debug_tuple("F64").field(v).finish(),
            Value::I8(v) => f.debug_tuple("I8").field(v).finish(),
            Value::I16(v) => f.debug_tuple("I16").field(v).finish(),
            Value::I32(v) => f.debug_tuple("I32").field(v).finish(),
            Value::I64(v) => f.debug_tuple("I64").field(v).finish(),
            Value::U8(v) => f.debug_tuple("U8").field(v).finish(),
            Value::U16(v) => f.debug_tuple("U16").field(v).finish(),
            Value::U32(v) => f.debug_tuple("U32").field(v).finish(),
            Value::U64(v) => f.debug_tuple("U64").field(v).finish(),
            Value::Opaque(_) => f.debug_tuple("Opaque").finish(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::U16(a), Value::U16(b)) => a == b,
            (Value::U32(a), Value::U32(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Returns the persistence type id for this value, or `None` if it has
    /// no persistable representation (the `Opaque` variant).
    #[must_use]
    pub fn type_id(&self) -> Option<u8> {
        match self {
            Value::Bytes(_) => Some(type_id::BYTES),
            Value::Text(_) => Some(type_id::TEXT),
            Value::Int(_) => Some(type_id::INT),
            Value::UInt(_) => Some(type_id::UINT),
            Value::Bool(_) => Some(type_id::BOOL),
            Value::F32(_) => Some(type_id::F32),
            Value::F64(_) => Some(type_id::F64),
            Value::I8(_) => Some(type_id::I8),
            Value::I16(_) => Some(type_id::I16),
            Value::I32(_) => Some(type_id::I32),
            Value::I64(_) => Some(type_id::I64),
            Value::U8(_) => Some(type_id::U8),
            Value::U16(_) => Some(type_id::U16),
            Value::U32(_) => Some(type_id::U32),
            Value::U64(_) => Some(type_id::U64),
            Value::Opaque(_) => None,
        }
    }

    /// Appends this value's wire representation (big-endian where
    /// applicable), per the typeId table above.
    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Bytes(v) => out.extend_from_slice(v),
            Value::Text(v) => out.extend_from_slice(v.as_bytes()),
            Value::Int(v) | Value::I64(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::UInt(v) | Value::U64(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Bool(v) => out.push(u8::from(*v)),
            Value::F32(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            Value::F64(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            Value::I8(v) => out.push(v.to_be_bytes()[0]),
            Value::I16(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::I32(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::U8(v) => out.push(*v),
            Value::U16(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Opaque(_) => unreachable!("Opaque has no type id and is never encoded"),
        }
    }

    /// Decodes a value from its typeId and raw bytes. Used by the snapshot
    /// loader in `snapshot.rs`.
    pub(crate) fn decode(type_id: u8, data: &[u8]) -> Result<Value, CodecError> {
        use self::type_id as t;

        fn exact<const N: usize>(data: &[u8]) -> Result<[u8; N], CodecError> {
            data.try_into()
                .map_err(|_| CodecError::ShortRead { expected: N })
        }

        Ok(match type_id {
            t::BYTES => Value::Bytes(data.to_vec()),
            t::TEXT => Value::Text(
                String::from_utf8(data.to_vec())
                    .map_err(|_| CodecError::ShortRead { expected: data.len() })?,
            ),
            t::INT => Value::Int(i64::from_be_bytes(exact(data)?)),
            t::UINT => Value::UInt(u64::from_be_bytes(exact(data)?)),
            t::BOOL => Value::Bool(*data.first().ok_or(CodecError::ShortRead { expected: 1 })? != 0),
            t::F32 => Value::F32(f32::from_bits(u32::from_be_bytes(exact(data)?))),
            t::F64 => Value::F64(f64::from_bits(u64::from_be_bytes(exact(data)?))),
            t::I8 => Value::I8(i8::from_be_bytes(exact(data)?)),
            t::I16 => Value::I16(i16::from_be_bytes(exact(data)?)),
            t::I32 => Value::I32(i32::from_be_bytes(exact(data)?)),
            t::I64 => Value::I64(i64::from_be_bytes(exact(data)?)),
            t::U8 => Value::U8(*data.first().ok_or(CodecError::ShortRead { expected: 1 })?),
            t::U16 => Value::U16(u16::from_be_bytes(exact(data)?)),
            t::U32 => Value::U32(u32::from_be_bytes(exact(data)?)),
            t::U64 => Value::U64(u64::from_be_bytes(exact(data)?)),
            other => return Err(CodecError::UnknownTypeId(other)),
        })
    }
}

macro_rules! impl_from_primitive {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from_primitive!(Vec<u8>, Bytes);
impl_from_primitive!(String, Text);
impl_from_primitive!(bool, Bool);
impl_from_primitive!(f32, F32);
impl_from_primitive!(f64, F64);
impl_from_primitive!(i8, I8);
impl_from_primitive!(i16, I16);
impl_from_primitive!(i32, I32);
impl_from_primitive!(i64, I64);
impl_from_primitive!(u8, U8);
impl_from_primitive!(u16, U16);
impl_from_primitive!(u32, U32);
impl_from_primitive!(u64, U64);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}
