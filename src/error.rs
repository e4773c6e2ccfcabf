//! Error types shared across the client.
//!
//! Codec and admission failures are returned synchronously to callers.
//! Transport failures are represented by [`LinkError`], which never escapes
//! the engine: every variant funnels into the same teardown-and-requeue path.

use std::io;

use thiserror::Error;

/// Failures raised by the wire codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The slice cannot hold the next field of the frame.
    #[error("buffer too small: {needed} bytes needed, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
    /// The version or frame-type byte does not match the expected frame.
    #[error("protocol mismatch: version {version:#04x}, frame type {frame_type:#04x}")]
    ProtocolMismatch { version: u8, frame_type: u8 },
    /// A key or value in a data frame is not valid UTF-8.
    #[error("data frame contains a string that is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors surfaced to callers of [`LumberjackClient::send`](crate::LumberjackClient::send).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The record cannot fit even an empty send buffer.
    #[error("record of {size} bytes exceeds the send buffer capacity of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },
    /// The send buffer is full and the `Throw` policy is active.
    #[error("send buffer full")]
    BufferFull,
    /// The client has been closed.
    #[error("client closed")]
    Closed,
}

/// Programming errors detected by the engine's internal state machines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

/// Errors that may occur while building a client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid user supplied configuration.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    /// Underlying I/O error whilst resolving the endpoint.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reasons a connection is torn down.
#[derive(Debug, Error)]
pub(crate) enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("partial write: {written} of {requested} bytes")]
    PartialWrite { written: usize, requested: usize },
    #[error("remote closed the connection")]
    RemoteClosed,
    #[error("undecodable acknowledgement: {0}")]
    Protocol(#[from] CodecError),
    #[error(transparent)]
    State(#[from] StateError),
}
