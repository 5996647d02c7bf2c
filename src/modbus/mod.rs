// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP driver
//!
//! Connection strings look like `modbus:tcp://192.168.222.33:502?unit-identifier=32`.
//!
//! Field queries:
//!
//! - `<area>:<address>[:<TYPE>[(<length>)]][[<quantity>]]` with the areas
//!   `coil`, `discrete-input`, `input-register` and `holding-register`,
//!   e.g. `holding-register:2:INT` or `coil:12:BOOL[8]`. Addresses are
//!   0-based. The data type defaults to `INT` for registers, coils and
//!   discrete inputs only support `BOOL`.
//! - The classic 1-based notation `0x00001`, `1x00001`, `3x00001` and `4x00001`
//!   for coils, discrete inputs, input registers and holding registers.
//!
//! Each field is read with a separate request. Fields that exceed
//! the address space or the limits of a single request are reported
//! as [`ResponseCode::InvalidAddress`](crate::ResponseCode::InvalidAddress).

mod codec;
mod frame;
mod transport;

use std::{io, sync::LazyLock};

use async_trait::async_trait;
use tokio::net::TcpStream;

use self::{frame::UnitId, transport::ModbusTransport};
use crate::{
    driver::{Driver, Transport},
    ConnectionDescriptor, DataType, Dialect, FieldDescriptor, MemoryArea, ResponseValue,
};

/// The scheme of the driver.
pub const SCHEME: &str = "modbus";

pub const DEFAULT_PORT: u16 = 502;

/// Connection string parameter that selects the unit (slave) of a gateway.
pub const UNIT_IDENTIFIER_PARAMETER: &str = "unit-identifier";

const DEFAULT_UNIT_ID: UnitId = 1;

const TYPE_SUFFIX: &str =
    r"(?::(?P<type>[A-Za-z]+)(?:\((?P<length>\d{1,5})\))?)?(?:\[(?P<quantity>\d{1,5})\])?";

static DIALECT: LazyLock<Dialect> = LazyLock::new(|| {
    Dialect::builder(SCHEME)
        .pattern(format!(
            r"(?P<area>[A-Za-z][A-Za-z-]*):(?P<address>\d{{1,5}}){TYPE_SUFFIX}"
        ))
        .pattern_with_base(
            format!(r"(?P<area>[0134])x(?P<address>\d{{1,5}}){TYPE_SUFFIX}"),
            1,
        )
        .area("coil", MemoryArea::Coil)
        .area("discrete-input", MemoryArea::DiscreteInput)
        .area("input-register", MemoryArea::InputRegister)
        .area("holding-register", MemoryArea::HoldingRegister)
        .area("0", MemoryArea::Coil)
        .area("1", MemoryArea::DiscreteInput)
        .area("3", MemoryArea::InputRegister)
        .area("4", MemoryArea::HoldingRegister)
        .iec_data_types()
        .default_data_type(DataType::Int16)
        .build()
        .expect("valid modbus field grammar")
});

/// The field query grammar of Modbus.
#[must_use]
pub fn dialect() -> &'static Dialect {
    &DIALECT
}

/// Reads coils, discrete inputs and registers via Modbus TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModbusDriver;

#[async_trait]
impl Driver for ModbusDriver {
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
                format!("unsupported modbus transport: {transport}"),
            ));
        }
        let unit_id = unit_id(descriptor)?;
        let port = descriptor.port().unwrap_or(DEFAULT_PORT);
        let stream = TcpStream::connect((descriptor.host(), port)).await?;
        stream.set_nodelay(true)?;
        log::debug!("Connected to Modbus TCP device {}:{port}", descriptor.host());
        Ok(Box::new(ModbusTransport::new(stream, unit_id)))
    }

    fn decode(&self, field: &FieldDescriptor, data: &[u8]) -> Option<ResponseValue> {
        if field.area().is_register_area() && field.data_type() == DataType::Bool {
            return decode_register_bools(field, data);
        }
        crate::codec::decode(field, data)
    }
}

fn unit_id(descriptor: &ConnectionDescriptor) -> io::Result<UnitId> {
    let Some(value) = descriptor.parameter(UNIT_IDENTIFIER_PARAMETER) else {
        return Ok(DEFAULT_UNIT_ID);
    };
    value.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {UNIT_IDENTIFIER_PARAMETER}: {value}"),
        )
    })
}

/// A boolean stored in a register is `true` for any non-zero value.
fn decode_register_bools(field: &FieldDescriptor, data: &[u8]) -> Option<ResponseValue> {
    let quantity = usize::from(field.quantity());
    if data.len() < quantity * 2 {
        return None;
    }
    let mut values = data
        .chunks_exact(2)
        .take(quantity)
        .map(|word| ResponseValue::Bool(word != [0, 0]));
    if quantity == 1 {
        return values.next();
    }
    Some(ResponseValue::List(values.collect()))
}
