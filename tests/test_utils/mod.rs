//! Helpers shared by the integration tests.

#![allow(dead_code)]

pub mod mock_collector;

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use lumberjack_client::{
    BackoffPolicy, ClientSettings, LumberjackClient, test_utils::CollectingDiagnostics,
};

pub use mock_collector::{AckMode, MockCollector};

/// Settings aimed at `collector` with fast reconnects.
pub fn settings_for(collector: &MockCollector) -> ClientSettings {
    ClientSettings {
        connect_retry_count: 3,
        close_timeout: Duration::from_secs(5),
        backoff: BackoffPolicy {
            base: Duration::from_millis(5),
            cap: Duration::from_millis(20),
        },
        ..ClientSettings::new("127.0.0.1", collector.port())
    }
}

/// Client over TCP with diagnostics captured in memory.
pub fn tcp_client(settings: ClientSettings) -> (LumberjackClient, Arc<CollectingDiagnostics>) {
    let diagnostics = Arc::new(CollectingDiagnostics::new());
    let connector = lumberjack_client::TcpConnector::resolve(&settings.host, settings.port)
        .expect("loopback resolves");
    let client = LumberjackClient::with_connector(settings, Arc::new(connector), diagnostics.clone())
        .expect("valid settings");
    (client, diagnostics)
}

/// One-field record carrying `message`.
pub fn message(text: impl Into<String>) -> [(&'static str, String); 1] {
    [("message", text.into())]
}

/// Poll `done` until it holds or five seconds pass.
pub fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}
