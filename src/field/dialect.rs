// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Grammar tables for field queries
//!
//! Every driver describes the field queries it understands with a
//! [`Dialect`]: a list of regular expressions plus token tables for
//! memory areas and data types. The patterns use the following named
//! capture groups:
//!
//! | group      | required | meaning                                   |
//! |------------|----------|-------------------------------------------|
//! | `area`     | yes      | token looked up in the area table          |
//! | `address`  | yes      | decimal address within the area            |
//! | `block`    | no       | decimal block number, e.g. S7 data blocks  |
//! | `bit`      | no       | bit offset `0..=7`, only for `BOOL`         |
//! | `type`     | no       | token looked up in the data type table     |
//! | `length`   | no       | maximum length of a `STRING`               |
//! | `quantity` | no       | number of array elements, defaults to 1    |
//!
//! Patterns are always matched against the whole query.

use std::{collections::HashMap, fmt};

use regex::{Captures, Regex};

use super::{DataType, FieldDescriptor, MemoryArea};
use crate::{Error, Result};

/// String length if a query omits it and the dialect doesn't override it.
pub const DEFAULT_STRING_LENGTH: u16 = 254;

/// Data type tokens of IEC 61131-3 as used by most PLC vendors.
pub const IEC_DATA_TYPES: &[(&str, DataType)] = &[
    ("BOOL", DataType::Bool),
    ("BYTE", DataType::UInt8),
    ("WORD", DataType::UInt16),
    ("DWORD", DataType::UInt32),
    ("LWORD", DataType::UInt64),
    ("SINT", DataType::Int8),
    ("USINT", DataType::UInt8),
    ("INT", DataType::Int16),
    ("UINT", DataType::UInt16),
    ("DINT", DataType::Int32),
    ("UDINT", DataType::UInt32),
    ("LINT", DataType::Int64),
    ("ULINT", DataType::UInt64),
    ("REAL", DataType::Float32),
    ("LREAL", DataType::Float64),
    ("STRING", DataType::String(DEFAULT_STRING_LENGTH)),
];

#[derive(Debug)]
struct FieldPattern {
    regex: Regex,
    address_base: u32,
}

/// The field query grammar of a driver.
pub struct Dialect {
    name: String,
    patterns: Vec<FieldPattern>,
    areas: HashMap<String, MemoryArea>,
    data_types: HashMap<String, DataType>,
    default_data_type: Option<DataType>,
    default_string_length: u16,
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("patterns", &self.patterns.len())
            .finish_non_exhaustive()
    }
}

impl Dialect {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DialectBuilder {
        DialectBuilder {
            name: name.into(),
            patterns: Vec::new(),
            areas: HashMap::new(),
            data_types: HashMap::new(),
            default_data_type: None,
            default_string_length: DEFAULT_STRING_LENGTH,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parses a field query.
    ///
    /// The first pattern that matches the whole query decides, later
    /// patterns are not tried even if the tokens of the first match
    /// turn out to be invalid.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownFieldSyntax`] if no pattern matches or if the
    ///   area, address, block, bit or quantity are out of range.
    /// - [`Error::UnsupportedDataType`] if the data type is unknown to
    ///   this dialect or if it isn't `BOOL` on a coil or discrete input.
    pub fn parse(&self, query: &str) -> Result<FieldDescriptor> {
        let query = query.trim();
        let (pattern, captures) = self
            .patterns
            .iter()
            .find_map(|pattern| pattern.regex.captures(query).map(|c| (pattern, c)))
            .ok_or_else(|| self.unknown_syntax(query))?;
        self.descriptor(query, pattern, &captures)
    }

    fn descriptor(
        &self,
        query: &str,
        pattern: &FieldPattern,
        captures: &Captures<'_>,
    ) -> Result<FieldDescriptor> {
        let area = captures
            .name("area")
            .and_then(|token| self.areas.get(&token.as_str().to_ascii_lowercase()))
            .copied()
            .ok_or_else(|| self.unknown_syntax(query))?;
        let address = optional_number::<u32>(captures, "address")
            .flatten()
            .and_then(|address| address.checked_sub(pattern.address_base))
            .ok_or_else(|| self.unknown_syntax(query))?;
        let block =
            optional_number::<u16>(captures, "block").ok_or_else(|| self.unknown_syntax(query))?;
        let bit = optional_number::<u8>(captures, "bit")
            .filter(|bit| bit.map_or(true, |bit| bit < 8))
            .ok_or_else(|| self.unknown_syntax(query))?;
        let quantity = optional_number::<u16>(captures, "quantity")
            .filter(|quantity| *quantity != Some(0))
            .ok_or_else(|| self.unknown_syntax(query))?
            .unwrap_or(1);

        let data_type = match captures.name("type") {
            Some(token) => self
                .data_types
                .get(&token.as_str().to_ascii_uppercase())
                .copied()
                .ok_or_else(|| self.unsupported_data_type(query, token.as_str()))?,
            // Bit areas hold nothing but single bits
            None if area.is_bit_area() => DataType::Bool,
            None => self
                .default_data_type
                .ok_or_else(|| self.unknown_syntax(query))?,
        };
        let data_type = match (data_type, captures.name("length")) {
            (DataType::String(_), Some(length)) => length
                .as_str()
                .parse::<u16>()
                .ok()
                .filter(|length| *length > 0)
                .map(DataType::String)
                .ok_or_else(|| self.unknown_syntax(query))?,
            (DataType::String(_), None) => DataType::String(self.default_string_length),
            (data_type, Some(length)) => {
                return Err(self.unsupported_data_type(
                    query,
                    &format!("{}({})", data_type.name(), length.as_str()),
                ));
            }
            (data_type, None) => data_type,
        };
        if bit.is_some() && data_type != DataType::Bool {
            return Err(self.unknown_syntax(query));
        }
        if area.is_bit_area() && data_type != DataType::Bool {
            return Err(self.unsupported_data_type(query, data_type.name()));
        }

        Ok(FieldDescriptor {
            area,
            block,
            address,
            bit,
            data_type,
            quantity,
        })
    }

    fn unknown_syntax(&self, query: &str) -> Error {
        Error::UnknownFieldSyntax {
            dialect: self.name.clone(),
            query: query.to_owned(),
        }
    }

    fn unsupported_data_type(&self, query: &str, data_type: &str) -> Error {
        Error::UnsupportedDataType {
            dialect: self.name.clone(),
            query: query.to_owned(),
            data_type: data_type.to_owned(),
        }
    }
}

/// `None` if the group matched but is out of range for `T`,
/// `Some(None)` if the group didn't participate in the match.
fn optional_number<T: std::str::FromStr>(
    captures: &Captures<'_>,
    group: &str,
) -> Option<Option<T>> {
    match captures.name(group) {
        Some(m) => m.as_str().parse().ok().map(Some),
        None => Some(None),
    }
}

/// Collects the grammar table of a [`Dialect`].
#[derive(Debug)]
pub struct DialectBuilder {
    name: String,
    patterns: Vec<(String, u32)>,
    areas: HashMap<String, MemoryArea>,
    data_types: HashMap<String, DataType>,
    default_data_type: Option<DataType>,
    default_string_length: u16,
}

impl DialectBuilder {
    /// Adds a pattern with 0-based addresses.
    #[must_use]
    pub fn pattern(self, pattern: impl Into<String>) -> Self {
        self.pattern_with_base(pattern, 0)
    }

    /// Adds a pattern whose addresses start at `base`, e.g. `1` for the
    /// classic Modicon notation `4x00001`.
    #[must_use]
    pub fn pattern_with_base(mut self, pattern: impl Into<String>, base: u32) -> Self {
        self.patterns.push((pattern.into(), base));
        self
    }

    /// Maps an area token (case-insensitive) to a memory area.
    #[must_use]
    pub fn area(mut self, token: &str, area: MemoryArea) -> Self {
        self.areas.insert(token.to_ascii_lowercase(), area);
        self
    }

    /// Maps a data type token (case-insensitive) to a data type.
    #[must_use]
    pub fn data_type(mut self, token: &str, data_type: DataType) -> Self {
        self.data_types.insert(token.to_ascii_uppercase(), data_type);
        self
    }

    /// Registers all [`IEC_DATA_TYPES`].
    #[must_use]
    pub fn iec_data_types(self) -> Self {
        IEC_DATA_TYPES
            .iter()
            .fold(self, |builder, (token, data_type)| {
                builder.data_type(token, *data_type)
            })
    }

    /// Data type of queries that omit the `type` group.
    ///
    /// Coils and discrete inputs always default to `BOOL`.
    #[must_use]
    pub fn default_data_type(mut self, data_type: DataType) -> Self {
        self.default_data_type = Some(data_type);
        self
    }

    #[must_use]
    pub fn default_string_length(mut self, length: u16) -> Self {
        self.default_string_length = length;
        self
    }

    /// Compiles all patterns.
    ///
    /// # Errors
    ///
    /// Fails if one of the patterns is not a valid regular expression.
    pub fn build(self) -> std::result::Result<Dialect, regex::Error> {
        let patterns = self
            .patterns
            .into_iter()
            .map(|(pattern, address_base)| {
                Regex::new(&format!("^(?:{pattern})$")).map(|regex| FieldPattern {
                    regex,
                    address_base,
                })
            })
            .collect::<std::result::Result<_, _>>()?;
        Ok(Dialect {
            name: self.name,
            patterns,
            areas: self.areas,
            data_types: self.data_types,
            default_data_type: self.default_data_type,
            default_string_length: self.default_string_length,
        })
    }
}
