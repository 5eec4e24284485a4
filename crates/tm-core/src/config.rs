use serde::{Deserialize, Serialize};

use crate::limits::BoundaryPolicy;
use crate::logging::LogLevel;

/// Per-test-method settings, normally supplied by the test program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestMethodConfig {
    pub test_name: String,
    /// Record the true outcome in the pass/fail flags but never bin out.
    pub force_pass: bool,
    /// Run the parameter completeness check at the start of execute.
    pub check_params: bool,
    /// Never hand the tester back from this code; application hooks still
    /// see the release latch set when they ask for a release.
    pub sync_par: bool,
    pub boundary: BoundaryPolicy,
    pub message_log_level: LogLevel,
}

impl Default for TestMethodConfig {
    fn default() -> Self {
        Self {
            test_name: String::new(),
            force_pass: false,
            check_params: true,
            sync_par: false,
            boundary: BoundaryPolicy::Inclusive,
            message_log_level: LogLevel::Warning,
        }
    }
}
