// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoded field values

use std::fmt::{self, Display};

use crate::{Error, Result};

/// A decoded field value.
///
/// The accessors never convert between types: reading an `INT16` field
/// with [`ResponseValue::as_i32`] fails with [`Error::TypeMismatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),

    /// The elements of a field with a quantity greater than 1.
    List(Vec<ResponseValue>),
}

macro_rules! accessor {
    ($(#[$meta:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$meta])*
        ///
        /// # Errors
        ///
        /// Fails with [`Error::TypeMismatch`] if the value has a different type.
        pub fn $name(&self) -> Result<$ty> {
            match self {
                Self::$variant(value) => Ok(*value),
                _ => Err(self.mismatch(stringify!($variant))),
            }
        }
    };
}

impl ResponseValue {
    accessor!(as_bool, Bool, bool);
    accessor!(as_i8, Int8, i8);
    accessor!(as_u8, UInt8, u8);
    accessor!(
        /// Reads an `INT` (16-bit signed) value.
        as_i16,
        Int16,
        i16
    );
    accessor!(as_u16, UInt16, u16);
    accessor!(as_i32, Int32, i32);
    accessor!(as_u32, UInt32, u32);
    accessor!(as_i64, Int64, i64);
    accessor!(as_u64, UInt64, u64);
    accessor!(
        /// Reads a `REAL` (IEEE-754 single precision) value.
        as_f32,
        Float32,
        f32
    );
    accessor!(as_f64, Float64, f64);

    /// # Errors
    ///
    /// Fails with [`Error::TypeMismatch`] if the value is not a string.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(value) => Ok(value),
            _ => Err(self.mismatch("String")),
        }
    }

    /// # Errors
    ///
    /// Fails with [`Error::TypeMismatch`] if the value is not a list.
    pub fn as_list(&self) -> Result<&[ResponseValue]> {
        match self {
            Self::List(values) => Ok(values),
            _ => Err(self.mismatch("List")),
        }
    }

    /// Name of the stored variant.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::Int8(_) => "Int8",
            Self::UInt8(_) => "UInt8",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float32(_) => "Float32",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::List(_) => "List",
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            actual: self.type_name(),
        }
    }
}

impl Display for ResponseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => value.fmt(f),
            Self::Int8(value) => value.fmt(f),
            Self::UInt8(value) => value.fmt(f),
            Self::Int16(value) => value.fmt(f),
            Self::UInt16(value) => value.fmt(f),
            Self::Int32(value) => value.fmt(f),
            Self::UInt32(value) => value.fmt(f),
            Self::Int64(value) => value.fmt(f),
            Self::UInt64(value) => value.fmt(f),
            Self::Float32(value) => value.fmt(f),
            Self::Float64(value) => value.fmt(f),
            Self::String(value) => value.fmt(f),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    value.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_tag_accessors() {
        assert_eq!(ResponseValue::Int16(-3).as_i16().unwrap(), -3);
        assert!(ResponseValue::Bool(true).as_bool().unwrap());
        assert_eq!(ResponseValue::Float32(1.5).as_f32().unwrap(), 1.5);
        assert_eq!(
            ResponseValue::String("abc".to_owned()).as_str().unwrap(),
            "abc"
        );
    }

    #[test]
    fn no_implicit_numeric_coercion() {
        let value = ResponseValue::Int16(7);
        for result in [
            value.as_i32().map(|_| ()),
            value.as_u16().map(|_| ()),
            value.as_i8().map(|_| ()),
            value.as_f32().map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(Error::TypeMismatch {
                    actual: "Int16",
                    ..
                })
            ));
        }
        let err = ResponseValue::Float64(1.0).as_f32().unwrap_err();
        assert_eq!(
            err.to_string(),
            "type mismatch: expected Float32, found Float64"
        );
    }

    #[test]
    fn list_values() {
        let value = ResponseValue::List(vec![ResponseValue::UInt8(1), ResponseValue::UInt8(2)]);
        assert_eq!(value.as_list().unwrap().len(), 2);
        assert!(value.as_u8().is_err());
        assert_eq!(value.to_string(), "[1, 2]");
    }
}
