// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use super::Driver;
use crate::{Error, Result};

/// Maps schemes onto drivers.
///
/// The registry can be shared between threads. Registering a driver is
/// atomic: a concurrent [`resolve`](Self::resolve) either sees the driver
/// or it doesn't. Schemes are compared ASCII case-insensitive.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under its own scheme.
    ///
    /// Returns the driver that has previously been registered for this scheme.
    pub fn register(&self, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        let scheme = driver.scheme().to_owned();
        self.register_as(&scheme, driver)
    }

    /// Registers a driver under an alternative scheme.
    pub fn register_as(&self, scheme: &str, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        let key = scheme.to_ascii_lowercase();
        log::debug!("Registering driver {driver:?} for scheme '{key}'");
        self.drivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, driver)
    }

    pub fn unregister(&self, scheme: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&scheme.to_ascii_lowercase())
    }

    /// Looks up the driver of a scheme.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DriverNotFound`] if no driver has been registered
    /// for `scheme`.
    pub fn resolve(&self, scheme: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::DriverNotFound(scheme.to_owned()))
    }

    #[must_use]
    pub fn contains(&self, scheme: &str) -> bool {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&scheme.to_ascii_lowercase())
    }

    /// All registered schemes in alphabetical order.
    #[must_use]
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<_> = self
            .drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        schemes.sort_unstable();
        schemes
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
