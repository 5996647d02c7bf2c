// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver independent connection options

use std::time::Duration;

use crate::{ConnectionDescriptor, Error, Result};

/// Connection string parameter for [`ConnectionOptions::connect_timeout`].
pub const CONNECT_TIMEOUT_PARAMETER: &str = "connect-timeout";

/// Connection string parameter for [`ConnectionOptions::request_timeout`].
pub const REQUEST_TIMEOUT_PARAMETER: &str = "request-timeout";

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Options shared by all drivers.
///
/// Both timeouts are given in milliseconds as connection string
/// parameters, e.g. `s7://plc?request-timeout=1500`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Upper bound for opening the transport.
    pub connect_timeout: Duration,

    /// Upper bound for executing a whole read request.
    pub request_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConnectionOptions {
    /// Reads the options from the parameters of a connection string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedConnectionString`] if a timeout is not a
    /// positive number of milliseconds.
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            connect_timeout: timeout_parameter(descriptor, CONNECT_TIMEOUT_PARAMETER)?
                .unwrap_or(defaults.connect_timeout),
            request_timeout: timeout_parameter(descriptor, REQUEST_TIMEOUT_PARAMETER)?
                .unwrap_or(defaults.request_timeout),
        })
    }
}

fn timeout_parameter(descriptor: &ConnectionDescriptor, key: &str) -> Result<Option<Duration>> {
    let Some(value) = descriptor.parameter(key) else {
        return Ok(None);
    };
    match value.parse::<u64>() {
        Ok(millis) if millis > 0 => Ok(Some(Duration::from_millis(millis))),
        _ => Err(Error::malformed(
            &descriptor.to_string(),
            "timeout must be a positive number of milliseconds",
        )),
    }
}
