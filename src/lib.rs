//! Lumberjack v1 client.
//!
//! Ships key/value records to a Lumberjack collector such as Logstash over
//! TCP. Records are encoded straight into a fixed triple buffer, sent as
//! windowed batches, and confirmed either on write completion or on the
//! collector's acknowledgement. Connection loss requeues the unconfirmed
//! batch ahead of newer data.
//!
//! ```no_run
//! use lumberjack_client::{ClientSettings, LumberjackClient};
//!
//! let client = LumberjackClient::new(ClientSettings::new("logstash.internal", 5043))?;
//! client.send(&[("host", "web-1"), ("message", "service started")])?;
//! client.close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod backoff;
mod batch_buffer;
mod builder;
mod client;
pub mod config;
pub mod diagnostics;
mod error;
mod flow;
#[cfg(feature = "log-compat")]
pub mod log_adapter;
pub mod protocol;
pub mod rate_limited_warner;
mod receive;
#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;
pub mod transport;

pub use builder::{BackoffOverrides, ClientBuilder};
pub use client::{ClientStats, ConnectionState, LumberjackClient};
pub use config::{BackoffPolicy, ClientSettings, SendConfirmPolicy, SendFullPolicy};
pub use diagnostics::{Diagnostics, LogDiagnostics};
pub use error::{BuildError, CodecError, SendError, StateError};
#[cfg(feature = "log-compat")]
pub use log_adapter::LumberjackLogger;
pub use transport::{Connector, SocketHalves, TcpConnector};
