// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, MutexGuard, PoisonError,
    },
};

use tokio::{sync::Mutex as AsyncMutex, time};

use crate::{
    driver::{Driver, Transport},
    ConnectionDescriptor, ConnectionOptions, Error, ReadRequestBuilder, Result,
};

/// Lifecycle state of a [`Connection`].
///
/// ```text
/// Connecting -> Connected -> Closing -> Closed
///      |            |
///      +------------+-----> Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closing,
    Closed,

    /// The transport failed or a request has been cancelled midway.
    /// The transport has already been released.
    Errored,
}

impl ConnectionState {
    /// `true` for the states that never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

/// A session with a single device.
///
/// All methods take `&self`. Requests are serialized, i.e. a second
/// request waits until the transport has answered the first one.
pub struct Connection {
    descriptor: ConnectionDescriptor,
    driver: Arc<dyn Driver>,
    options: ConnectionOptions,
    state: std::sync::Mutex<ConnectionState>,
    transport: AsyncMutex<Option<Box<dyn Transport>>>,

    /// A close has been cancelled while the transport was locked.
    close_abandoned: AtomicBool,
}

impl Connection {
    /// Opens a connection to the device described by `descriptor`.
    ///
    /// Dropping the returned future releases a half-open transport.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedConnectionString`] if the connection options are invalid
    /// - [`Error::Timeout`] if the transport could not be opened within the connect timeout
    /// - [`Error::Transport`] if the driver failed to open the transport
    pub async fn open(driver: Arc<dyn Driver>, descriptor: ConnectionDescriptor) -> Result<Self> {
        let options = ConnectionOptions::from_descriptor(&descriptor)?;
        let connection = Self {
            descriptor,
            driver,
            options,
            state: std::sync::Mutex::new(ConnectionState::Connecting),
            transport: AsyncMutex::new(None),
            close_abandoned: AtomicBool::new(false),
        };
        log::debug!("Connecting to {}", connection.descriptor);
        let transport = match time::timeout(
            options.connect_timeout,
            connection.driver.connect(&connection.descriptor),
        )
        .await
        {
            Ok(Ok(transport)) => transport,
            Ok(Err(err)) => {
                connection.set_state(ConnectionState::Errored);
                log::debug!("Failed to connect to {}: {err}", connection.descriptor);
                return Err(Error::Transport(err));
            }
            Err(_) => {
                connection.set_state(ConnectionState::Errored);
                log::debug!(
                    "Connecting to {} timed out after {:?}",
                    connection.descriptor,
                    options.connect_timeout
                );
                return Err(Error::Timeout(options.connect_timeout));
            }
        };
        *connection.transport.lock().await = Some(transport);
        connection.set_state(ConnectionState::Connected);
        log::debug!("Connected to {}", connection.descriptor);
        Ok(connection)
    }

    /// Closes the connection and releases the transport.
    ///
    /// Only the first call has an effect. Closing a connection that is
    /// already closing, closed or errored succeeds without doing anything.
    /// A pending request is completed before the transport is released.
    /// If the returned future is dropped while a request is pending, that
    /// request releases the transport once it has finished.
    ///
    /// # Errors
    ///
    /// Currently never fails, a failure of the transport while closing is
    /// only logged.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if *state != ConnectionState::Connected {
                log::debug!("Ignoring close of {} in state {:?}", self.descriptor, *state);
                return Ok(());
            }
            *state = ConnectionState::Closing;
        }
        let mut closing = Closing {
            connection: self,
            finished: false,
        };
        let mut slot = self.transport.lock().await;
        if let Some(mut transport) = slot.take() {
            if let Err(err) = transport.close().await {
                log::warn!("Failed to close transport of {}: {err}", self.descriptor);
            }
        }
        self.set_state(ConnectionState::Closed);
        closing.finished = true;
        log::debug!("Closed connection to {}", self.descriptor);
        Ok(())
    }

    /// Starts a new read request on this connection.
    #[must_use]
    pub fn read_request_builder(&self) -> ReadRequestBuilder<'_> {
        ReadRequestBuilder::new(self)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    #[must_use]
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    pub(crate) async fn lock_transport(
        &self,
    ) -> tokio::sync::MutexGuard<'_, Option<Box<dyn Transport>>> {
        self.transport.lock().await
    }

    /// Unlocks the transport after a request.
    ///
    /// Finishes a close that has been cancelled while the lock was held.
    pub(crate) fn release_transport(
        &self,
        mut slot: tokio::sync::MutexGuard<'_, Option<Box<dyn Transport>>>,
    ) {
        let mut state = self.lock_state();
        if *state == ConnectionState::Closing && self.close_abandoned.load(Ordering::Relaxed) {
            log::debug!("Finishing cancelled close of {}", self.descriptor);
            slot.take();
            *state = ConnectionState::Closed;
        }
        // Unlock while the state is still locked
        drop(slot);
    }

    /// Marks a connected connection as errored.
    ///
    /// A concurrent close is left alone and finishes as usual.
    pub(crate) fn mark_errored(&self) {
        let mut state = self.lock_state();
        if matches!(
            *state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            log::debug!("Connection to {} errored", self.descriptor);
            *state = ConnectionState::Errored;
        }
    }

    fn set_state(&self, next: ConnectionState) {
        *self.lock_state() = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("descriptor", &self.descriptor)
            .field("driver", &self.driver)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Completes a close, even if the closing future is dropped midway.
///
/// The state only becomes [`ConnectionState::Closed`] once the transport
/// has been released.
struct Closing<'a> {
    connection: &'a Connection,
    finished: bool,
}

impl Drop for Closing<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let connection = self.connection;
        let mut state = connection.lock_state();
        if let Ok(mut slot) = connection.transport.try_lock() {
            slot.take();
            *state = ConnectionState::Closed;
            log::debug!("Closed connection to {}", connection.descriptor);
        } else {
            // Left to the request that currently holds the transport
            connection.close_abandoned.store(true, Ordering::Relaxed);
        }
    }
}
