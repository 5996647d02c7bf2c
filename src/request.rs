// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read requests

use std::collections::HashSet;

use tokio::{sync::MutexGuard, time};

use crate::{
    driver::{FieldData, Transport},
    response::ResponseItem,
    Connection, Error, FieldDescriptor, ReadResponse, ResponseCode, Result,
};

#[derive(Debug)]
enum Query {
    Text(String),
    Field(FieldDescriptor),
}

/// Collects the fields of a [`ReadRequest`].
///
/// Adding fields never fails, all queries are parsed by [`build`](Self::build).
#[derive(Debug)]
#[must_use]
pub struct ReadRequestBuilder<'a> {
    connection: &'a Connection,
    queries: Vec<(String, Query)>,
}

impl<'a> ReadRequestBuilder<'a> {
    pub(crate) fn new(connection: &'a Connection) -> Self {
        Self {
            connection,
            queries: Vec::new(),
        }
    }

    /// Adds a field query in the dialect of the connection's driver.
    pub fn add_query(mut self, name: impl Into<String>, query: impl Into<String>) -> Self {
        self.queries.push((name.into(), Query::Text(query.into())));
        self
    }

    /// Adds a field that has already been parsed.
    pub fn add_field(mut self, name: impl Into<String>, field: FieldDescriptor) -> Self {
        self.queries.push((name.into(), Query::Field(field)));
        self
    }

    /// Parses all queries.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidQuery`] for the first query that could not be parsed
    /// - [`Error::DuplicateField`] if a field name has been used twice
    pub fn build(self) -> Result<ReadRequest<'a>> {
        let dialect = self.connection.driver().dialect();
        let mut seen = HashSet::with_capacity(self.queries.len());
        let mut names = Vec::with_capacity(self.queries.len());
        let mut fields = Vec::with_capacity(self.queries.len());
        for (name, query) in self.queries {
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateField(name));
            }
            let field = match query {
                Query::Text(query) => match dialect.parse(&query) {
                    Ok(field) => field,
                    Err(source) => {
                        return Err(Error::InvalidQuery {
                            field: name,
                            source: Box::new(source),
                        });
                    }
                },
                Query::Field(field) => field,
            };
            names.push(name);
            fields.push(field);
        }
        Ok(ReadRequest {
            connection: self.connection,
            names,
            fields,
        })
    }
}

/// A batch of named fields bound to a [`Connection`].
///
/// A request can be executed repeatedly.
#[derive(Debug)]
pub struct ReadRequest<'a> {
    connection: &'a Connection,
    names: Vec<String>,
    fields: Vec<FieldDescriptor>,
}

impl<'a> ReadRequest<'a> {
    #[must_use]
    pub fn connection(&self) -> &'a Connection {
        self.connection
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.names
            .iter()
            .position(|field_name| field_name == name)
            .map(|index| &self.fields[index])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reads all fields from the device.
    ///
    /// The whole batch is bounded by the request timeout of the connection.
    /// Dropping the returned future before it completes leaves the
    /// connection in the errored state.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is not connected
    /// - [`Error::Timeout`] if the device didn't answer in time, the
    ///   connection remains usable
    /// - [`Error::Transport`] if the transport failed, the connection is
    ///   errored afterwards
    /// - [`Error::UnexpectedResponse`] if the transport returned the wrong
    ///   number of items
    pub async fn execute(&self) -> Result<ReadResponse> {
        let connection = self.connection;
        connection.ensure_connected()?;
        if self.fields.is_empty() {
            return Ok(ReadResponse::default());
        }
        let request_timeout = connection.options().request_timeout;
        let mut in_flight = InFlight::new(connection, connection.lock_transport().await);
        // The connection might have been closed while waiting for the transport.
        if let Err(err) = connection.ensure_connected() {
            in_flight.disarm();
            return Err(err);
        }
        log::debug!("Read {:?}", self.fields);
        let result = match in_flight.transport() {
            Some(transport) => time::timeout(request_timeout, transport.read(&self.fields)).await,
            None => {
                in_flight.disarm();
                return Err(Error::ConnectionClosed);
            }
        };
        let items = match result {
            Ok(Ok(items)) => {
                in_flight.disarm();
                items
            }
            Ok(Err(err)) => {
                log::warn!("Reading from {} failed: {err}", connection.descriptor());
                in_flight.fail();
                return Err(Error::Transport(err));
            }
            Err(_) => {
                log::warn!(
                    "Reading from {} timed out after {request_timeout:?}",
                    connection.descriptor()
                );
                in_flight.disarm();
                return Err(Error::Timeout(request_timeout));
            }
        };
        drop(in_flight);
        if items.len() != self.fields.len() {
            return Err(Error::UnexpectedResponse {
                expected: self.fields.len(),
                actual: items.len(),
            });
        }
        let items = self
            .names
            .iter()
            .zip(&self.fields)
            .zip(items)
            .map(|((name, field), data)| (name.clone(), self.decode(name, field, data)))
            .collect();
        Ok(ReadResponse::new(items))
    }

    fn decode(&self, name: &str, field: &FieldDescriptor, data: FieldData) -> ResponseItem {
        match data {
            Ok(bytes) => {
                if let Some(value) = self.connection.driver().decode(field, &bytes) {
                    ResponseItem::ok(value)
                } else {
                    log::debug!(
                        "Failed to decode field '{name}' ({field}) from {:02X?}",
                        &bytes[..]
                    );
                    ResponseItem::failed(ResponseCode::RemoteError)
                }
            }
            Err(ResponseCode::Ok) => ResponseItem::failed(ResponseCode::RemoteError),
            Err(code) => ResponseItem::failed(code),
        }
    }
}

/// Holds the transport while a request is pending.
///
/// Unless disarmed, dropping the guard marks the connection as errored
/// and releases the transport.
struct InFlight<'a> {
    connection: &'a Connection,
    slot: Option<MutexGuard<'a, Option<Box<dyn Transport>>>>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(connection: &'a Connection, slot: MutexGuard<'a, Option<Box<dyn Transport>>>) -> Self {
        Self {
            connection,
            slot: Some(slot),
            armed: true,
        }
    }

    fn transport(&mut self) -> Option<&mut Box<dyn Transport>> {
        self.slot.as_deref_mut().and_then(Option::as_mut)
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn fail(mut self) {
        self.disarm();
        self.connection.mark_errored();
        if let Some(slot) = self.slot.as_deref_mut() {
            slot.take();
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let Some(mut slot) = self.slot.take() else {
            return;
        };
        if self.armed {
            log::warn!(
                "Pending read from {} has been cancelled",
                self.connection.descriptor()
            );
            self.connection.mark_errored();
            slot.take();
        }
        self.connection.release_transport(slot);
    }
}
