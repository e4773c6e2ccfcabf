//! Test helpers shared by unit tests and, behind the `test-util` feature,
//! by integration tests.

mod collecting_diagnostics;
mod scripted_connector;

pub use collecting_diagnostics::CollectingDiagnostics;
pub use scripted_connector::{ScriptedConnector, ScriptedWrite};
