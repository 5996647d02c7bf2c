// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

///////////////////////////////////////////////////////////////////
/// Modules
///////////////////////////////////////////////////////////////////
pub use crate::driver;

#[allow(missing_docs)]
#[cfg(feature = "modbus")]
pub mod modbus {
    pub use crate::modbus::ModbusDriver;
}

#[allow(missing_docs)]
#[cfg(feature = "s7")]
pub mod s7 {
    pub use crate::s7::{ControllerType, S7Driver};
}

///////////////////////////////////////////////////////////////////
/// Types
///////////////////////////////////////////////////////////////////
pub use crate::{
    Connection, ConnectionDescriptor, ConnectionState, DataType, DriverManager, Error,
    FieldDescriptor, MemoryArea, ReadRequest, ReadResponse, ResponseCode, ResponseValue,
};

///////////////////////////////////////////////////////////////////
/// Traits
///////////////////////////////////////////////////////////////////
pub use crate::driver::{Driver, Transport};
