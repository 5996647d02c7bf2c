// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Siemens S7 driver
//!
//! Connection strings look like
//! `s7://192.168.216.121?remote-rack=0&remote-slot=1&controller-type=S7_1500`.
//!
//! Field queries use the absolute addresses of STEP 7:
//!
//! - `%<area><offset>[.<bit>]:<TYPE>[(<length>)][[<quantity>]]` with the
//!   areas `I`/`E` (inputs), `Q`/`A` (outputs) and `M` (flags), e.g.
//!   `%M8:INT` or `%Q0.0:BOOL`. A size prefix like in `%MW8` is accepted
//!   and ignored, the data type decides the size.
//! - `%DB<n>.DB[X|B|W|D]<offset>[.<bit>]:<TYPE>...` for data blocks, e.g.
//!   `%DB1.DBX4.2:BOOL` or `%DB10.DBD0:REAL[4]`.
//!
//! Strings are S7 strings, i.e. they are preceded by their maximum and
//! actual length.

mod codec;
mod frame;
mod transport;

use std::{fmt, io, str::FromStr, sync::LazyLock};

use async_trait::async_trait;
use tokio::net::TcpStream;

use self::transport::S7Transport;
use crate::{
    codec::decode_string,
    driver::{Driver, Transport},
    ConnectionDescriptor, DataType, Dialect, FieldDescriptor, MemoryArea, ResponseValue,
};

/// The scheme of the driver.
pub const SCHEME: &str = "s7";

/// ISO-on-TCP
pub const DEFAULT_PORT: u16 = 102;

pub const REMOTE_RACK_PARAMETER: &str = "remote-rack";
pub const REMOTE_SLOT_PARAMETER: &str = "remote-slot";
pub const CONTROLLER_TYPE_PARAMETER: &str = "controller-type";
pub const PDU_SIZE_PARAMETER: &str = "pdu-size";

pub const DEFAULT_PDU_SIZE: u16 = 480;

/// Every CPU supports at least this PDU size.
const MIN_PDU_SIZE: u16 = 240;

const TYPE_SUFFIX: &str =
    r":(?P<type>[A-Za-z]+)(?:\((?P<length>\d{1,3})\))?(?:\[(?P<quantity>\d{1,4})\])?";

static DIALECT: LazyLock<Dialect> = LazyLock::new(|| {
    Dialect::builder(SCHEME)
        .pattern(format!(
            r"(?i)%(?P<area>[IEQAM])[XBWD]?(?P<address>\d{{1,7}})(?:\.(?P<bit>\d))?{TYPE_SUFFIX}"
        ))
        .pattern(format!(
            r"(?i)%(?P<area>DB)(?P<block>\d{{1,5}})\.DB[XBWD]?(?P<address>\d{{1,7}})(?:\.(?P<bit>\d))?{TYPE_SUFFIX}"
        ))
        .area("i", MemoryArea::Input)
        .area("e", MemoryArea::Input)
        .area("q", MemoryArea::Output)
        .area("a", MemoryArea::Output)
        .area("m", MemoryArea::Memory)
        .area("db", MemoryArea::DataBlock)
        .iec_data_types()
        .build()
        .expect("valid s7 field grammar")
});

/// The field query grammar of S7.
#[must_use]
pub fn dialect() -> &'static Dialect {
    &DIALECT
}

/// CPU families.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControllerType {
    S7_300,
    S7_400,
    S7_1200,
    #[default]
    S7_1500,
    Logo,
}

impl ControllerType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::S7_300 => "S7_300",
            Self::S7_400 => "S7_400",
            Self::S7_1200 => "S7_1200",
            Self::S7_1500 => "S7_1500",
            Self::Logo => "LOGO",
        }
    }

    /// Slot of the CPU in its standard configuration.
    #[must_use]
    pub const fn default_slot(self) -> u8 {
        match self {
            Self::S7_300 | Self::S7_400 => 2,
            Self::S7_1200 | Self::S7_1500 | Self::Logo => 0,
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An unknown name of a [`ControllerType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown controller type: {0}")]
pub struct UnknownControllerType(String);

impl FromStr for ControllerType {
    type Err = UnknownControllerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::S7_300,
            Self::S7_400,
            Self::S7_1200,
            Self::S7_1500,
            Self::Logo,
        ]
        .into_iter()
        .find(|controller_type| controller_type.name().eq_ignore_ascii_case(s))
        .ok_or_else(|| UnknownControllerType(s.to_owned()))
    }
}

/// Driver specific parameters of a connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct S7Parameters {
    pub(crate) rack: u8,
    pub(crate) slot: u8,
    pub(crate) pdu_size: u16,
}

impl S7Parameters {
    fn from_descriptor(descriptor: &ConnectionDescriptor) -> io::Result<Self> {
        let controller_type = descriptor
            .parameter(CONTROLLER_TYPE_PARAMETER)
            .map(str::parse::<ControllerType>)
            .transpose()
            .map_err(|err| invalid_input(err.to_string()))?
            .unwrap_or_default();
        let rack = parameter(descriptor, REMOTE_RACK_PARAMETER)?.unwrap_or(0);
        let slot = parameter(descriptor, REMOTE_SLOT_PARAMETER)?
            .unwrap_or_else(|| controller_type.default_slot());
        if rack > 7 || slot > 31 {
            return Err(invalid_input(format!(
                "rack/slot out of range: {rack}/{slot}"
            )));
        }
        let pdu_size = parameter(descriptor, PDU_SIZE_PARAMETER)?.unwrap_or(DEFAULT_PDU_SIZE);
        if pdu_size < MIN_PDU_SIZE {
            return Err(invalid_input(format!(
                "{PDU_SIZE_PARAMETER} below {MIN_PDU_SIZE}: {pdu_size}"
            )));
        }
        Ok(Self {
            rack,
            slot,
            pdu_size,
        })
    }
}

fn parameter<T: FromStr>(descriptor: &ConnectionDescriptor, key: &str) -> io::Result<Option<T>> {
    descriptor
        .parameter(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| invalid_input(format!("invalid {key}: {value}")))
        })
        .transpose()
}

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

/// Reads inputs, outputs, flags and data blocks of S7 PLCs.
#[derive(Debug, Clone, Copy, Default)]
pub struct S7Driver;

#[async_trait]
impl Driver for S7Driver {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn dialect(&self) -> &Dialect {
        dialect()
    }

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> io::Result<Box<dyn Transport>> {
        if let Some(transport) = descriptor.transport().filter(|t| *t != "tcp") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported s7 transport: {transport}"),
            ));
        }
        let params = S7Parameters::from_descriptor(descriptor)?;
        let port = descriptor.port().unwrap_or(DEFAULT_PORT);
        let stream = TcpStream::connect((descriptor.host(), port)).await?;
        stream.set_nodelay(true)?;
        let transport = S7Transport::connect(stream, &params).await?;
        log::debug!(
            "Connected to S7 CPU {}:{port} (rack {}, slot {})",
            descriptor.host(),
            params.rack,
            params.slot
        );
        Ok(Box::new(transport))
    }

    fn decode(&self, field: &FieldDescriptor, data: &[u8]) -> Option<ResponseValue> {
        match field.data_type() {
            // Single booleans are transferred as bits
            DataType::Bool if field.quantity() == 1 => {
                data.first().map(|b| ResponseValue::Bool(b & 0x01 != 0))
            }
            DataType::String(len) => decode_s7_strings(field, len, data),
            _ => crate::codec::decode(field, data),
        }
    }
}

fn decode_s7_strings(field: &FieldDescriptor, len: u16, data: &[u8]) -> Option<ResponseValue> {
    let quantity = usize::from(field.quantity());
    let chunk_len = usize::from(len) + 2;
    if data.len() < chunk_len * quantity {
        return None;
    }
    let mut values = data
        .chunks_exact(chunk_len)
        .take(quantity)
        .map(decode_s7_string);
    if quantity == 1 {
        return values.next().flatten();
    }
    values.collect::<Option<Vec<_>>>().map(ResponseValue::List)
}

/// Decodes a string with its maximum and actual length header.
fn decode_s7_string(bytes: &[u8]) -> Option<ResponseValue> {
    let chars = &bytes[2..];
    let len = usize::from(bytes[1])
        .min(usize::from(bytes[0]))
        .min(chars.len());
    decode_string(&chars[..len])
}
