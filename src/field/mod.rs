// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field addressing

pub mod dialect;

use std::fmt::{self, Display};

pub use self::dialect::{Dialect, DialectBuilder};

/// Memory area of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryArea {
    /// Modbus coils (read/write bits)
    Coil,

    /// Modbus discrete inputs (read-only bits)
    DiscreteInput,

    /// Modbus input registers (read-only words)
    InputRegister,

    /// Modbus holding registers (read/write words)
    HoldingRegister,

    /// Process image of the inputs (S7 `I`/`E`)
    Input,

    /// Process image of the outputs (S7 `Q`/`A`)
    Output,

    /// Flag memory (S7 `M`)
    Memory,

    /// A data block, see [`FieldDescriptor::block`] for the block number.
    DataBlock,
}

impl MemoryArea {
    /// Areas that address single bits rather than bytes or words.
    #[must_use]
    pub const fn is_bit_area(self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// Areas that address 16-bit registers.
    #[must_use]
    pub const fn is_register_area(self) -> bool {
        matches!(self, Self::InputRegister | Self::HoldingRegister)
    }
}

/// Data type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,

    /// A character string with the given maximum length in bytes.
    String(u16),
}

impl DataType {
    /// Size of a single element in bytes.
    ///
    /// A `Bool` occupies a single bit but is reported as one byte.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
            Self::String(len) => len as usize,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Int8 => "INT8",
            Self::UInt8 => "UINT8",
            Self::Int16 => "INT16",
            Self::UInt16 => "UINT16",
            Self::Int32 => "INT32",
            Self::UInt32 => "UINT32",
            Self::Int64 => "INT64",
            Self::UInt64 => "UINT64",
            Self::Float32 => "FLOAT32",
            Self::Float64 => "FLOAT64",
            Self::String(_) => "STRING",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(len) => write!(f, "STRING({len})"),
            _ => f.write_str(self.name()),
        }
    }
}

/// A parsed field query.
///
/// Created by [`Dialect::parse`]. The driver that owns the dialect maps
/// the descriptor onto its wire addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub(crate) area: MemoryArea,
    pub(crate) block: Option<u16>,
    pub(crate) address: u32,
    pub(crate) bit: Option<u8>,
    pub(crate) data_type: DataType,
    pub(crate) quantity: u16,
}

impl FieldDescriptor {
    /// A single element of `data_type` at `address`.
    #[must_use]
    pub const fn new(area: MemoryArea, address: u32, data_type: DataType) -> Self {
        Self {
            area,
            block: None,
            address,
            bit: None,
            data_type,
            quantity: 1,
        }
    }

    #[must_use]
    pub const fn with_block(mut self, block: u16) -> Self {
        self.block = Some(block);
        self
    }

    /// Selects a bit within the addressed byte.
    ///
    /// Values above `7` are clamped to `7`.
    #[must_use]
    pub const fn with_bit(mut self, bit: u8) -> Self {
        self.bit = Some(if bit > 7 { 7 } else { bit });
        self
    }

    /// Reads an array of `quantity` consecutive elements.
    ///
    /// A quantity of `0` is raised to `1`.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u16) -> Self {
        self.quantity = if quantity == 0 { 1 } else { quantity };
        self
    }

    #[must_use]
    pub const fn area(&self) -> MemoryArea {
        self.area
    }

    #[must_use]
    pub const fn block(&self) -> Option<u16> {
        self.block
    }

    #[must_use]
    pub const fn address(&self) -> u32 {
        self.address
    }

    #[must_use]
    pub const fn bit(&self) -> Option<u8> {
        self.bit
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    #[must_use]
    pub const fn quantity(&self) -> u16 {
        self.quantity
    }

    /// Number of bytes that carry the value, without any protocol
    /// specific headers.
    ///
    /// Booleans are packed, i.e. 8 per byte starting at the bit offset.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        let quantity = usize::from(self.quantity);
        match self.data_type {
            DataType::Bool => {
                let bits = usize::from(self.bit.unwrap_or(0)) + quantity;
                bits.div_ceil(8)
            }
            data_type => data_type.size() * quantity,
        }
    }
}

impl Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.area)?;
        if let Some(block) = self.block {
            write!(f, "{block}")?;
        }
        write!(f, ":{}", self.address)?;
        if let Some(bit) = self.bit {
            write!(f, ".{bit}")?;
        }
        write!(f, ":{}", self.data_type)?;
        if self.quantity != 1 {
            write!(f, "[{}]", self.quantity)?;
        }
        Ok(())
    }
}
