//! Client facade.
//!
//! [`LumberjackClient`] accepts key/value records from any number of
//! producer threads, batches them in a fixed triple buffer and ships each
//! batch to the collector once the previous one is confirmed. Connection
//! management runs on background threads started on demand.

mod connection;
mod engine;

use std::{fmt, sync::Arc};

use crate::{
    config::ClientSettings,
    diagnostics::{Diagnostics, LogDiagnostics},
    error::{BuildError, SendError},
    transport::{Connector, TcpConnector},
};

use engine::Shared;

/// Observable state of the link to the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// `close` has run; no further connections are made.
    Closed,
}

/// Counters describing the client's activity since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Records encoded into the send buffer.
    pub records_accepted: u64,
    /// Records discarded under the `Drop` policy.
    pub records_dropped: u64,
    /// Batches fully written to a socket.
    pub batches_sent: u64,
    /// Batches that collected every confirmation credit.
    pub batches_confirmed: u64,
    /// Connections established.
    pub connects: u64,
    /// Connections torn down after a failure.
    pub disconnects: u64,
}

/// Lumberjack v1 client.
///
/// Dropping the client runs [`close`](Self::close).
pub struct LumberjackClient {
    shared: Arc<Shared>,
}

impl LumberjackClient {
    /// Validate `settings`, resolve the endpoint once and allocate buffers.
    ///
    /// No connection is attempted until the first record is sent.
    pub fn new(settings: ClientSettings) -> Result<Self, BuildError> {
        settings.validate()?;
        let connector = TcpConnector::resolve(&settings.host, settings.port)?;
        Ok(Self::from_parts(
            settings,
            Arc::new(connector),
            Arc::new(LogDiagnostics),
        ))
    }

    /// Build a client over a custom transport and diagnostics sink.
    ///
    /// `settings.host` and `settings.port` are only validated, the
    /// connector decides where connections go.
    pub fn with_connector(
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self, BuildError> {
        settings.validate()?;
        Ok(Self::from_parts(settings, connector, diagnostics))
    }

    fn from_parts(
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(settings, connector, diagnostics)),
        }
    }

    /// Queue one record of ordered key/value pairs.
    ///
    /// Returns once the record is in the send buffer, or was dropped under
    /// the `Drop` policy. Under `Wait` this blocks until space frees up or
    /// the client closes.
    ///
    /// Reconnects are only started from `send` and `close`. If the link drops
    /// while every producer is parked under `Wait`, they stay blocked until
    /// another thread calls `send` or `close`.
    ///
    /// # Errors
    ///
    /// [`SendError::RecordTooLarge`] if the record cannot fit an empty
    /// buffer, [`SendError::BufferFull`] under the `Throw` policy and
    /// [`SendError::Closed`] once [`close`](Self::close) has begun.
    pub fn send<K, V>(&self, record: &[(K, V)]) -> Result<(), SendError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.shared.send(record)
    }

    /// Stop accepting records and drain the buffer.
    ///
    /// Waits until every buffered batch is confirmed, the link drops, or
    /// `close_timeout` elapses, then shuts the socket and releases blocked
    /// producers. Calling it again has no effect.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Current state of the link.
    pub fn state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> ClientStats {
        self.shared.stats()
    }

    /// Settings the client was built with.
    pub fn settings(&self) -> &ClientSettings {
        &self.shared.settings
    }
}

impl fmt::Debug for LumberjackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LumberjackClient")
            .field("endpoint", &self.shared.connector.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for LumberjackClient {
    fn drop(&mut self) {
        self.shared.close();
    }
}
