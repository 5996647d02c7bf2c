// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol drivers
//!
//! A [`Driver`] implements a protocol family: it owns the [`Dialect`] of
//! its field queries, opens a [`Transport`] for a [`ConnectionDescriptor`]
//! and decodes the raw bytes of each field.
//!
//! Drivers are registered in a [`DriverRegistry`] under their scheme.

pub mod registry;

use std::{fmt::Debug, io};

use async_trait::async_trait;

use crate::{
    bytes::Bytes, codec, ConnectionDescriptor, Dialect, FieldDescriptor, ResponseCode,
    ResponseValue,
};

pub use self::registry::DriverRegistry;

/// Raw data of a single field or the reason why it could not be read.
pub type FieldData = std::result::Result<Bytes, ResponseCode>;

/// A protocol family.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// The scheme of the connection strings that are handled by this driver,
    /// e.g. `modbus`.
    fn scheme(&self) -> &str;

    /// Grammar of the field queries.
    fn dialect(&self) -> &Dialect;

    /// Opens a transport to the device.
    ///
    /// Dropping the returned future must release all resources that have
    /// been acquired so far.
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> io::Result<Box<dyn Transport>>;

    /// Decodes the raw data of a field.
    ///
    /// Returns `None` if the data doesn't match the field.
    fn decode(&self, field: &FieldDescriptor, data: &[u8]) -> Option<ResponseValue> {
        codec::decode(field, data)
    }
}

/// An open session with a device.
#[async_trait]
pub trait Transport: Send + Debug {
    /// Reads all fields as a single batch.
    ///
    /// The result must contain exactly one item per field, in the same order.
    /// Per-field failures are reported as [`ResponseCode`] while an
    /// [`io::Error`] signals that the transport is no longer usable.
    async fn read(&mut self, fields: &[FieldDescriptor]) -> io::Result<Vec<FieldData>>;

    /// Releases the transport.
    async fn close(&mut self) -> io::Result<()>;
}
