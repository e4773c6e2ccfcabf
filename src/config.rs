//! Settings consumed by [`LumberjackClient`](crate::LumberjackClient).
//!
//! [`ClientSettings`] is immutable once the client is built. It can be
//! assembled field by field, through [`ClientBuilder`](crate::ClientBuilder),
//! or deserialised with serde by framework adapters that load their own
//! configuration. Durations are expressed in milliseconds when serialised.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::BuildError,
    protocol::{ACK_FRAME_SIZE, DATA_HEADER_SIZE, WINDOW_FRAME_SIZE},
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
};

/// Default size in bytes of each of the three send slots.
pub const DEFAULT_SEND_BUFFER_SIZE: usize = 65536;
/// Default size in bytes of the acknowledgement receive buffer.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;
/// Default number of connect attempts per reconnect cycle.
pub const DEFAULT_CONNECT_RETRY_COUNT: u32 = 10;
/// Default base delay between connect attempts.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Default maximum delay between connect attempts.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);

const VALID_SEND_FULL: &str = "drop, throw, wait";
const VALID_SEND_CONFIRM: &str = "send, receive";

/// Behaviour when the `work` slot cannot accept another record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendFullPolicy {
    /// Discard the record and report success.
    #[default]
    Drop,
    /// Fail the send with [`SendError::BufferFull`](crate::SendError::BufferFull).
    Throw,
    /// Block the caller until the record is admitted or the client closes.
    Wait,
}

/// When a transmitted batch counts as delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendConfirmPolicy {
    /// Once the socket reports the write complete.
    Send,
    /// Once the write completed and the remote acknowledged the last sequence.
    #[default]
    Receive,
}

impl FromStr for SendFullPolicy {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "throw" => Ok(Self::Throw),
            "wait" => Ok(Self::Wait),
            other => Err(BuildError::InvalidConfig(format!(
                "invalid send_full policy '{other}'. Valid options are: {VALID_SEND_FULL}"
            ))),
        }
    }
}

impl FromStr for SendConfirmPolicy {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "send" => Ok(Self::Send),
            "receive" => Ok(Self::Receive),
            other => Err(BuildError::InvalidConfig(format!(
                "invalid send_confirm policy '{other}'. Valid options are: {VALID_SEND_CONFIRM}"
            ))),
        }
    }
}

impl fmt::Display for SendFullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Drop => "drop",
            Self::Throw => "throw",
            Self::Wait => "wait",
        })
    }
}

impl fmt::Display for SendConfirmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Send => "send",
            Self::Receive => "receive",
        })
    }
}

/// Jittered exponential delay between connect attempts of one cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    #[serde(rename = "base_ms", with = "duration_ms")]
    pub base: Duration,
    #[serde(rename = "cap_ms", with = "duration_ms")]
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Immutable client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub send_buffer_size: usize,
    pub receive_buffer_size: usize,
    pub connect_retry_count: u32,
    /// Drain deadline applied by `close`; zero waits forever.
    #[serde(rename = "close_timeout_ms", with = "duration_ms")]
    pub close_timeout: Duration,
    pub send_full: SendFullPolicy,
    pub send_confirm: SendConfirmPolicy,
    pub backoff: BackoffPolicy,
    #[serde(rename = "warn_interval_ms", with = "duration_ms")]
    pub warn_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5043,
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            connect_retry_count: DEFAULT_CONNECT_RETRY_COUNT,
            close_timeout: Duration::ZERO,
            send_full: SendFullPolicy::default(),
            send_confirm: SendConfirmPolicy::default(),
            backoff: BackoffPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl ClientSettings {
    /// Settings targeting `host:port` with every other option defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Smallest send slot able to hold a window header and one empty record.
    pub const MIN_SEND_BUFFER_SIZE: usize = WINDOW_FRAME_SIZE + DATA_HEADER_SIZE;

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.host.trim().is_empty() {
            return Err(BuildError::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(BuildError::InvalidConfig(
                "port must be greater than zero".into(),
            ));
        }
        if self.send_buffer_size < Self::MIN_SEND_BUFFER_SIZE {
            return Err(BuildError::InvalidConfig(format!(
                "send_buffer_size must be at least {} bytes",
                Self::MIN_SEND_BUFFER_SIZE
            )));
        }
        if self.receive_buffer_size < ACK_FRAME_SIZE {
            return Err(BuildError::InvalidConfig(format!(
                "receive_buffer_size must be at least {ACK_FRAME_SIZE} bytes"
            )));
        }
        if self.connect_retry_count == 0 {
            return Err(BuildError::InvalidConfig(
                "connect_retry_count must be greater than zero".into(),
            ));
        }
        if self.backoff.cap < self.backoff.base {
            return Err(BuildError::InvalidConfig(
                "backoff cap must not be smaller than its base".into(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(" drop ", SendFullPolicy::Drop)]
    #[case("THROW", SendFullPolicy::Throw)]
    #[case("Wait", SendFullPolicy::Wait)]
    fn send_full_parses_case_insensitively(#[case] input: &str, #[case] expected: SendFullPolicy) {
        assert_eq!(input.parse::<SendFullPolicy>().unwrap(), expected);
    }

    #[rstest]
    fn send_full_rejects_unknown_policy() {
        let err = "block".parse::<SendFullPolicy>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid client configuration: invalid send_full policy 'block'. Valid options are: drop, throw, wait"
        );
    }

    #[rstest]
    fn send_confirm_round_trips_through_display() {
        for policy in [SendConfirmPolicy::Send, SendConfirmPolicy::Receive] {
            assert_eq!(policy.to_string().parse::<SendConfirmPolicy>().unwrap(), policy);
        }
    }

    #[rstest]
    fn defaults_match_documented_values() {
        let settings = ClientSettings::default();
        assert_eq!(settings.send_buffer_size, 65536);
        assert_eq!(settings.receive_buffer_size, 4096);
        assert_eq!(settings.connect_retry_count, 10);
        assert_eq!(settings.close_timeout, Duration::ZERO);
        assert_eq!(settings.send_full, SendFullPolicy::Drop);
        assert_eq!(settings.send_confirm, SendConfirmPolicy::Receive);
        assert!(settings.validate().is_ok());
    }

    #[rstest]
    #[case::empty_host(ClientSettings { host: " ".into(), ..ClientSettings::default() }, "host")]
    #[case::zero_port(ClientSettings { port: 0, ..ClientSettings::default() }, "port")]
    #[case::tiny_send(ClientSettings { send_buffer_size: 15, ..ClientSettings::default() }, "send_buffer_size")]
    #[case::tiny_receive(ClientSettings { receive_buffer_size: 5, ..ClientSettings::default() }, "receive_buffer_size")]
    #[case::no_retries(ClientSettings { connect_retry_count: 0, ..ClientSettings::default() }, "connect_retry_count")]
    fn validate_rejects(#[case] settings: ClientSettings, #[case] field: &str) {
        let err = settings.validate().expect_err("settings must be rejected");
        assert!(matches!(err, BuildError::InvalidConfig(msg) if msg.contains(field)));
    }
}
