//! Builder for [`LumberjackClient`].
//!
//! Collects optional overrides on top of [`ClientSettings::default`],
//! validates them and constructs the client. A custom [`Connector`] or
//! [`Diagnostics`] sink may be supplied; otherwise the endpoint is resolved
//! over TCP and diagnostics go to the `log` facade.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    client::LumberjackClient,
    config::{BackoffPolicy, ClientSettings, SendConfirmPolicy, SendFullPolicy},
    diagnostics::{Diagnostics, LogDiagnostics},
    error::BuildError,
    transport::{Connector, TcpConnector},
};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Overrides for the reconnect backoff, in milliseconds.
#[derive(Clone, Debug, Default)]
pub struct BackoffOverrides {
    base_ms: Option<u64>,
    cap_ms: Option<u64>,
}

impl BackoffOverrides {
    /// Create overrides with no custom values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the initial jitter window.
    pub fn with_base_ms(mut self, base_ms: u64) -> Self {
        self.base_ms = Some(base_ms);
        self
    }

    /// Override the largest jitter window.
    pub fn with_cap_ms(mut self, cap_ms: u64) -> Self {
        self.cap_ms = Some(cap_ms);
        self
    }

    fn apply(&self, policy: &mut BackoffPolicy) -> Result<(), BuildError> {
        if let Some(base) = self.base_ms {
            ensure_positive!(base, "backoff_base_ms")?;
            policy.base = Duration::from_millis(base);
        }
        if let Some(cap) = self.cap_ms {
            ensure_positive!(cap, "backoff_cap_ms")?;
            policy.cap = Duration::from_millis(cap);
        }
        if policy.base > policy.cap {
            return Err(BuildError::InvalidConfig(
                "backoff_base_ms must not exceed backoff_cap_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`LumberjackClient`].
#[derive(Clone, Default)]
pub struct ClientBuilder {
    endpoint: Option<(String, u16)>,
    send_buffer_size: Option<usize>,
    receive_buffer_size: Option<usize>,
    connect_retry_count: Option<u32>,
    close_timeout_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
    send_full: Option<SendFullPolicy>,
    send_confirm: Option<SendConfirmPolicy>,
    backoff: BackoffOverrides,
    connector: Option<Arc<dyn Connector>>,
    diagnostics: Option<Arc<dyn Diagnostics>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("send_buffer_size", &self.send_buffer_size)
            .field("receive_buffer_size", &self.receive_buffer_size)
            .field("connect_retry_count", &self.connect_retry_count)
            .field("close_timeout_ms", &self.close_timeout_ms)
            .field("warn_interval_ms", &self.warn_interval_ms)
            .field("send_full", &self.send_full)
            .field("send_confirm", &self.send_confirm)
            .field("backoff", &self.backoff)
            .field("custom_connector", &self.connector.is_some())
            .field("custom_diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Create a builder targeting the default endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send to `host:port` over TCP.
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Some((host.into(), port));
        self
    }

    option_setter!(
        #[doc = "Set the size of each of the three send slots in bytes."]
        with_send_buffer_size,
        send_buffer_size,
        usize
    );
    option_setter!(
        #[doc = "Set the size of the acknowledgement buffer in bytes."]
        with_receive_buffer_size,
        receive_buffer_size,
        usize
    );
    option_setter!(with_connect_retry_count, connect_retry_count, u32);
    option_setter!(
        #[doc = "Bound `close` in milliseconds; zero waits forever."]
        with_close_timeout_ms,
        close_timeout_ms,
        u64
    );
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);
    option_setter!(with_send_full, send_full, SendFullPolicy);
    option_setter!(with_send_confirm, send_confirm, SendConfirmPolicy);

    /// Override the reconnect backoff.
    pub fn with_backoff(mut self, overrides: BackoffOverrides) -> Self {
        self.backoff = overrides;
        self
    }

    /// Connect through `connector` instead of TCP.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Route diagnostics to `diagnostics` instead of the `log` facade.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Resolve the overrides into validated settings.
    pub fn build_settings(&self) -> Result<ClientSettings, BuildError> {
        let mut settings = ClientSettings::default();
        if let Some((host, port)) = &self.endpoint {
            settings.host = host.clone();
            settings.port = *port;
        }
        if let Some(size) = self.send_buffer_size {
            settings.send_buffer_size = size;
        }
        if let Some(size) = self.receive_buffer_size {
            settings.receive_buffer_size = size;
        }
        if let Some(count) = self.connect_retry_count {
            settings.connect_retry_count = ensure_positive!(count, "connect_retry_count")?;
        }
        if let Some(timeout) = self.close_timeout_ms {
            settings.close_timeout = Duration::from_millis(timeout);
        }
        if let Some(interval) = self.warn_interval_ms {
            settings.warn_interval = Duration::from_millis(interval);
        }
        if let Some(policy) = self.send_full {
            settings.send_full = policy;
        }
        if let Some(policy) = self.send_confirm {
            settings.send_confirm = policy;
        }
        self.backoff.apply(&mut settings.backoff)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration and construct the client.
    pub fn build(&self) -> Result<LumberjackClient, BuildError> {
        let settings = self.build_settings()?;
        let connector = match &self.connector {
            Some(connector) => Arc::clone(connector),
            None => Arc::new(TcpConnector::resolve(&settings.host, settings.port)?),
        };
        let diagnostics = self
            .diagnostics
            .clone()
            .unwrap_or_else(|| Arc::new(LogDiagnostics));
        LumberjackClient::with_connector(settings, connector, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CollectingDiagnostics, ScriptedConnector};
    use rstest::rstest;

    #[rstest]
    fn defaults_pass_through() {
        let settings = ClientBuilder::new().build_settings().expect("defaults are valid");
        assert_eq!(settings, ClientSettings::default());
    }

    #[rstest]
    fn overrides_are_applied() {
        let settings = ClientBuilder::new()
            .with_tcp("collector.internal", 5044)
            .with_send_buffer_size(4096)
            .with_close_timeout_ms(250)
            .with_send_full(SendFullPolicy::Wait)
            .with_send_confirm(SendConfirmPolicy::Send)
            .with_backoff(BackoffOverrides::new().with_base_ms(20).with_cap_ms(200))
            .build_settings()
            .expect("valid overrides");
        assert_eq!(settings.host, "collector.internal");
        assert_eq!(settings.port, 5044);
        assert_eq!(settings.send_buffer_size, 4096);
        assert_eq!(settings.close_timeout, Duration::from_millis(250));
        assert_eq!(settings.send_full, SendFullPolicy::Wait);
        assert_eq!(settings.send_confirm, SendConfirmPolicy::Send);
        assert_eq!(settings.backoff.base, Duration::from_millis(20));
        assert_eq!(settings.backoff.cap, Duration::from_millis(200));
    }

    #[rstest]
    #[case(ClientBuilder::new().with_connect_retry_count(0), "connect_retry_count")]
    #[case(ClientBuilder::new().with_backoff(BackoffOverrides::new().with_cap_ms(0)), "backoff_cap_ms")]
    #[case(
        ClientBuilder::new().with_backoff(BackoffOverrides::new().with_base_ms(500).with_cap_ms(100)),
        "backoff_base_ms"
    )]
    #[case(ClientBuilder::new().with_send_buffer_size(4), "send_buffer_size")]
    #[case(ClientBuilder::new().with_tcp("", 5043), "host")]
    fn rejects_invalid_overrides(#[case] builder: ClientBuilder, #[case] field: &str) {
        let err = builder.build_settings().unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfig(msg) if msg.contains(field)));
    }

    #[rstest]
    fn builds_with_custom_collaborators() {
        let client = ClientBuilder::new()
            .with_connector(Arc::new(ScriptedConnector::new()))
            .with_diagnostics(Arc::new(CollectingDiagnostics::new()))
            .build()
            .expect("client builds");
        assert_eq!(client.settings().host, "localhost");
    }
}
