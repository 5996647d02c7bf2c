// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding of raw field data
//!
//! The functions in this module are the default decoding rules of
//! [`Driver::decode`](crate::driver::Driver::decode): big-endian,
//! two's complement integers and IEEE-754 floats. Booleans are packed
//! LSB first starting at the bit offset of the field.
//!
//! Decoding is total: data that doesn't fit the requested type yields
//! `None` instead of an error.

use byteorder::{BigEndian, ByteOrder as _};

use crate::{DataType, FieldDescriptor, ResponseValue};

/// Decodes the raw data of a field.
///
/// Surplus bytes are ignored, fields with a quantity greater than 1
/// are decoded as [`ResponseValue::List`].
#[must_use]
pub fn decode(field: &FieldDescriptor, data: &[u8]) -> Option<ResponseValue> {
    let data_type = field.data_type();
    if data_type == DataType::Bool {
        return decode_bools(field, data);
    }
    let size = data_type.size();
    let quantity = usize::from(field.quantity());
    if size == 0 || data.len() < size * quantity {
        return None;
    }
    if quantity == 1 {
        return decode_element(data_type, &data[..size]);
    }
    data.chunks_exact(size)
        .take(quantity)
        .map(|chunk| decode_element(data_type, chunk))
        .collect::<Option<Vec<_>>>()
        .map(ResponseValue::List)
}

/// Decodes a single element of `data_type` from the start of `bytes`.
#[must_use]
pub fn decode_element(data_type: DataType, bytes: &[u8]) -> Option<ResponseValue> {
    if bytes.len() < data_type.size() {
        return None;
    }
    let value = match data_type {
        DataType::Bool => ResponseValue::Bool(bytes[0] & 0x01 != 0),
        DataType::Int8 => ResponseValue::Int8(i8::from_be_bytes([bytes[0]])),
        DataType::UInt8 => ResponseValue::UInt8(bytes[0]),
        DataType::Int16 => ResponseValue::Int16(BigEndian::read_i16(bytes)),
        DataType::UInt16 => ResponseValue::UInt16(BigEndian::read_u16(bytes)),
        DataType::Int32 => ResponseValue::Int32(BigEndian::read_i32(bytes)),
        DataType::UInt32 => ResponseValue::UInt32(BigEndian::read_u32(bytes)),
        DataType::Int64 => ResponseValue::Int64(BigEndian::read_i64(bytes)),
        DataType::UInt64 => ResponseValue::UInt64(BigEndian::read_u64(bytes)),
        DataType::Float32 => ResponseValue::Float32(BigEndian::read_f32(bytes)),
        DataType::Float64 => ResponseValue::Float64(BigEndian::read_f64(bytes)),
        DataType::String(len) => return decode_string(&bytes[..usize::from(len)]),
    };
    Some(value)
}

/// Decodes packed booleans, LSB first.
#[must_use]
pub fn decode_bools(field: &FieldDescriptor, data: &[u8]) -> Option<ResponseValue> {
    let offset = usize::from(field.bit().unwrap_or(0));
    let quantity = usize::from(field.quantity());
    if data.len() * 8 < offset + quantity {
        return None;
    }
    let bit = |index: usize| (data[index / 8] >> (index % 8)) & 0x01 != 0;
    if quantity == 1 {
        return Some(ResponseValue::Bool(bit(offset)));
    }
    Some(ResponseValue::List(
        (offset..offset + quantity)
            .map(|index| ResponseValue::Bool(bit(index)))
            .collect(),
    ))
}

/// Decodes a character run that ends at the first NUL byte.
///
/// Returns `None` if the characters are not valid UTF-8.
#[must_use]
pub fn decode_string(bytes: &[u8]) -> Option<ResponseValue> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .ok()
        .map(|s| ResponseValue::String(s.to_owned()))
}
