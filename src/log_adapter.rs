//! Bridge from the `log` crate to a Lumberjack collector.
//!
//! [`LumberjackLogger`] implements `log::Log` and ships every enabled record
//! as one Lumberjack record with the fields `@timestamp`, `logger`, `level`,
//! `host` and `message`. Records emitted by this crate's own diagnostics are
//! never forwarded, so a client whose diagnostics go to `log` can sit behind
//! the installed logger without feeding on itself.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::{client::LumberjackClient, diagnostics::LOG_TARGET};

fn local_host_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "localhost".to_owned())
}

/// `log::Log` implementation backed by a [`LumberjackClient`].
#[derive(Debug)]
pub struct LumberjackLogger {
    client: Arc<LumberjackClient>,
    host: String,
    level: LevelFilter,
}

impl LumberjackLogger {
    /// Forward records at `Info` and above through `client`.
    pub fn new(client: Arc<LumberjackClient>) -> Self {
        Self {
            client,
            host: local_host_name(),
            level: LevelFilter::Info,
        }
    }

    /// Override the `host` field, which defaults to the machine name.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Forward records up to `level`.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Client records are shipped through; close it at shutdown.
    pub fn client(&self) -> &Arc<LumberjackClient> {
        &self.client
    }

    /// Install as the global logger and raise the global max level to match.
    pub fn install(self) -> Result<(), SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    fn fields(&self, record: &Record<'_>) -> [(&'static str, String); 5] {
        [
            (
                "@timestamp",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("logger", record.target().to_owned()),
            ("level", record.level().to_string()),
            ("host", self.host.clone()),
            ("message", record.args().to_string()),
        ]
    }
}

impl Log for LumberjackLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && !metadata.target().starts_with(LOG_TARGET)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Reporting through `log` from inside the logger would recurse.
        if let Err(err) = self.client.send(&self.fields(record)) {
            eprintln!("lumberjack_client: failed to forward log record: {err}");
        }
    }

    fn flush(&self) {}
}
