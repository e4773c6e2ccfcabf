//! Diagnostic output of the client engine.
//!
//! The engine never writes to a global sink directly. Every diagnostic line
//! goes through the [`Diagnostics`] collaborator supplied at construction;
//! [`LogDiagnostics`] forwards to the `log` facade and is the default.
//!
//! Lines may be emitted while the engine's coordination lock is held, so an
//! implementation must never call back into the client that owns it.

use log::Level;

/// Target used for every line forwarded to `log` or `tracing`.
pub const LOG_TARGET: &str = "lumberjack_client";

/// Sink for engine diagnostics.
pub trait Diagnostics: Send + Sync {
    /// Write one diagnostic line.
    fn write_line(&self, level: Level, line: &str);
}

/// Forwards diagnostics to the `log` crate under [`LOG_TARGET`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn write_line(&self, level: Level, line: &str) {
        log::log!(target: LOG_TARGET, level, "{line}");
    }
}

/// Forwards diagnostics to `tracing` events under [`LOG_TARGET`].
#[cfg(feature = "tracing-compat")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

#[cfg(feature = "tracing-compat")]
impl Diagnostics for TracingDiagnostics {
    fn write_line(&self, level: Level, line: &str) {
        match level {
            Level::Error => tracing::error!(target: LOG_TARGET, "{line}"),
            Level::Warn => tracing::warn!(target: LOG_TARGET, "{line}"),
            Level::Info => tracing::info!(target: LOG_TARGET, "{line}"),
            Level::Debug => tracing::debug!(target: LOG_TARGET, "{line}"),
            Level::Trace => tracing::trace!(target: LOG_TARGET, "{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtest::Logger;
    use serial_test::serial;

    #[test]
    #[serial]
    fn log_diagnostics_uses_crate_target() {
        let mut logger = Logger::start();
        LogDiagnostics.write_line(Level::Warn, "connect attempt 1/3 failed");
        let record = std::iter::from_fn(|| logger.pop())
            .find(|r| r.target() == LOG_TARGET)
            .expect("diagnostic forwarded to log");
        assert_eq!(record.level(), Level::Warn);
        assert_eq!(record.args(), "connect attempt 1/3 failed");
    }

    #[cfg(feature = "tracing-compat")]
    mod tracing_events {
        use super::*;
        use std::{fmt, sync::Arc};

        use parking_lot::Mutex;
        use tracing::{
            Event, Subscriber,
            field::{Field, Visit},
        };
        use tracing_subscriber::{
            Registry,
            layer::{Context, Layer, SubscriberExt},
        };

        type Line = (tracing::Level, String, String);

        #[derive(Clone, Default)]
        struct CapturedEvents(Arc<Mutex<Vec<Line>>>);

        struct MessageField(String);

        impl Visit for MessageField {
            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        impl<S: Subscriber> Layer<S> for CapturedEvents {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                let mut message = MessageField(String::new());
                event.record(&mut message);
                let meta = event.metadata();
                self.0
                    .lock()
                    .push((*meta.level(), meta.target().to_owned(), message.0));
            }
        }

        #[test]
        fn tracing_diagnostics_maps_levels_under_crate_target() {
            let captured = CapturedEvents::default();
            let subscriber = Registry::default().with(captured.clone());
            tracing::subscriber::with_default(subscriber, || {
                TracingDiagnostics.write_line(Level::Warn, "connect attempt 2/3 failed");
                TracingDiagnostics.write_line(Level::Trace, "batch of 4 records sent");
            });
            let lines = captured.0.lock().clone();
            assert_eq!(
                lines,
                vec![
                    (
                        tracing::Level::WARN,
                        LOG_TARGET.to_owned(),
                        "connect attempt 2/3 failed".to_owned()
                    ),
                    (
                        tracing::Level::TRACE,
                        LOG_TARGET.to_owned(),
                        "batch of 4 records sent".to_owned()
                    ),
                ]
            );
        }
    }
}
