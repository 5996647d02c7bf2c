// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::{io, time::Duration};

use thiserror::Error;

/// The error type of all fallible operations in this crate.
///
/// Parse and build errors are returned synchronously and never leave
/// any resources open. Request-level errors fail an entire
/// [`ReadRequest`](crate::ReadRequest); failures of single fields are
/// reported through a [`ResponseCode`](crate::ResponseCode) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection string could not be parsed.
    #[error("malformed connection string `{input}`: {reason}")]
    MalformedConnectionString {
        input: String,
        reason: &'static str,
    },

    /// No driver has been registered for the requested scheme.
    #[error("no driver registered for scheme `{0}`")]
    DriverNotFound(String),

    /// The field query does not match any pattern of the dialect.
    #[error("unknown {dialect} field syntax: `{query}`")]
    UnknownFieldSyntax { dialect: String, query: String },

    /// The field query names a data type the dialect does not support.
    #[error("unsupported {dialect} data type `{data_type}` in `{query}`")]
    UnsupportedDataType {
        dialect: String,
        query: String,
        data_type: String,
    },

    /// A field query of a read request could not be parsed.
    #[error("invalid query for field `{field}`: {source}")]
    InvalidQuery {
        field: String,
        #[source]
        source: Box<Error>,
    },

    /// The same field name has been added twice to a read request.
    #[error("duplicate field `{0}`")]
    DuplicateField(String),

    /// The connection has been closed or is in an errored state.
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport failed, e.g. the remote device disconnected.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// Opening a connection or executing a request took too long.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The transport answered a batch with a mismatching number of items.
    #[error("unexpected response: expected {expected} items, received {actual}")]
    UnexpectedResponse { expected: usize, actual: usize },

    /// A [`ResponseValue`](crate::ResponseValue) accessor did not match the stored type.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

impl Error {
    pub(crate) fn malformed(input: &str, reason: &'static str) -> Self {
        Self::MalformedConnectionString {
            input: input.to_owned(),
            reason,
        }
    }

    /// Returns `true` if the error originates from the transport layer.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
