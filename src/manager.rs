// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry point for clients

use std::sync::Arc;

use crate::{
    driver::{Driver, DriverRegistry},
    Connection, ConnectionDescriptor, Result,
};

/// Opens connections through the drivers of a [`DriverRegistry`].
#[derive(Debug, Clone)]
pub struct DriverManager {
    registry: Arc<DriverRegistry>,
}

impl DriverManager {
    /// A manager with all built-in drivers that have been enabled
    /// by cargo features.
    #[must_use]
    pub fn new() -> Self {
        let registry = DriverRegistry::new();
        #[cfg(feature = "modbus")]
        registry.register(Arc::new(crate::modbus::ModbusDriver));
        #[cfg(feature = "s7")]
        registry.register(Arc::new(crate::s7::S7Driver));
        Self::with_registry(Arc::new(registry))
    }

    /// A manager that uses the given registry as is.
    #[must_use]
    pub fn with_registry(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    pub fn register(&self, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        self.registry.register(driver)
    }

    /// Parses the connection string and opens a connection with the
    /// driver of its scheme.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedConnectionString`](crate::Error::MalformedConnectionString)
    ///   if the connection string could not be parsed
    /// - [`Error::DriverNotFound`](crate::Error::DriverNotFound) if no driver has
    ///   been registered for the scheme
    /// - any error of [`Connection::open`]
    pub async fn connect(&self, connection_string: &str) -> Result<Connection> {
        let descriptor = ConnectionDescriptor::parse(connection_string)?;
        let driver = self.registry.resolve(descriptor.scheme())?;
        Connection::open(driver, descriptor).await
    }
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::new()
    }
}
