// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use crate::{bytes::Bytes, DataType, FieldDescriptor, MemoryArea, ResponseCode};

pub(crate) type TransactionId = u16;
pub(crate) type UnitId = u8;

/// Maximum number of coils or discrete inputs in a single request.
pub(crate) const MAX_BITS: u16 = 2000;

/// Maximum number of registers in a single request.
pub(crate) const MAX_REGISTERS: u16 = 125;

/// The read functions of the Modbus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionCode {
    /// 01 (0x01) Read Coils.
    ReadCoils,

    /// 02 (0x02) Read Discrete Inputs
    ReadDiscreteInputs,

    /// 03 (0x03) Read Multiple Holding Registers
    ReadHoldingRegisters,

    /// 04 (0x04) Read Input Registers
    ReadInputRegisters,
}

impl FunctionCode {
    pub(crate) const fn new(value: u8) -> Option<Self> {
        let code = match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            _ => return None,
        };
        Some(code)
    }

    pub(crate) const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
        }
    }

    const fn for_area(area: MemoryArea) -> Option<Self> {
        let code = match area {
            MemoryArea::Coil => Self::ReadCoils,
            MemoryArea::DiscreteInput => Self::ReadDiscreteInputs,
            MemoryArea::HoldingRegister => Self::ReadHoldingRegisters,
            MemoryArea::InputRegister => Self::ReadInputRegisters,
            _ => return None,
        };
        Some(code)
    }

    const fn reads_bits(self) -> bool {
        matches!(self, Self::ReadCoils | Self::ReadDiscreteInputs)
    }
}

/// A read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Request {
    pub(crate) function: FunctionCode,
    pub(crate) address: u16,
    pub(crate) quantity: u16,
}

impl Request {
    /// Maps a field onto a single read request.
    ///
    /// Fails with [`ResponseCode::InvalidAddress`] if the field doesn't fit
    /// into the address space or into a single request, or if a coil or
    /// discrete input is read as anything but `BOOL`.
    pub(crate) fn for_field(field: &FieldDescriptor) -> Result<Self, ResponseCode> {
        let function = FunctionCode::for_area(field.area()).ok_or(ResponseCode::InvalidAddress)?;
        let quantity = if function.reads_bits() {
            // Coils are packed LSB first, only booleans can be decoded from them
            if field.data_type() != DataType::Bool {
                return Err(ResponseCode::InvalidAddress);
            }
            usize::from(field.quantity())
        } else {
            match field.data_type() {
                // One register per boolean
                DataType::Bool => usize::from(field.quantity()),
                _ => field.byte_len().div_ceil(2),
            }
        };
        let max_quantity = if function.reads_bits() {
            MAX_BITS
        } else {
            MAX_REGISTERS
        };
        let quantity = u16::try_from(quantity)
            .ok()
            .filter(|quantity| (1..=max_quantity).contains(quantity))
            .ok_or(ResponseCode::InvalidAddress)?;
        let address = u16::try_from(field.address()).map_err(|_| ResponseCode::InvalidAddress)?;
        if u32::from(address) + u32::from(quantity) > u32::from(u16::MAX) + 1 {
            return Err(ResponseCode::InvalidAddress);
        }
        Ok(Self {
            function,
            address,
            quantity,
        })
    }

    /// Number of data bytes of a successful response.
    pub(crate) fn response_len(&self) -> usize {
        let quantity = usize::from(self.quantity);
        if self.function.reads_bits() {
            quantity.div_ceil(8)
        } else {
            quantity * 2
        }
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    ServerDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    ServerDeviceBusy,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetDevice,
    /// None of the above.
    Custom(u8),
}

impl ExceptionCode {
    pub(crate) const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDevice,
            other => Self::Custom(other),
        }
    }

    pub(crate) const fn value(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::ServerDeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::ServerDeviceBusy => 0x06,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayTargetDevice => 0x0B,
            Self::Custom(code) => code,
        }
    }

    pub(crate) const fn response_code(self) -> ResponseCode {
        match self {
            Self::IllegalDataAddress => ResponseCode::InvalidAddress,
            Self::GatewayPathUnavailable => ResponseCode::NotFound,
            Self::GatewayTargetDevice => ResponseCode::Timeout,
            _ => ResponseCode::RemoteError,
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDevice => "Gateway target device failed to respond",
            Self::Custom(_) => "Custom",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// The data of a successful read, without the byte count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Response {
    pub(crate) function: FunctionCode,
    pub(crate) data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExceptionResponse {
    pub(crate) function: u8,
    pub(crate) exception: ExceptionCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponsePdu(pub(crate) Result<Response, ExceptionResponse>);

/// MBAP header without the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) transaction_id: TransactionId,
    pub(crate) unit_id: UnitId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequestAdu {
    pub(crate) hdr: Header,
    pub(crate) pdu: Request,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResponseAdu {
    pub(crate) hdr: Header,
    pub(crate) pdu: ResponsePdu,
}
