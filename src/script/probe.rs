//! State prober: `<script> check` and the classification of its answer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::runner::ScriptRunner;
use crate::error::ScriptError;
use crate::models::{Availability, DisplayState, ProcessResult, PROBE_TIMEOUT};

pub const LOCKED_ON_MESSAGE: &str =
    "Enabled by system configuration (e.g., Real-Time Kernel) and cannot be changed here.";

/// Result of one probe. `error` is set whenever `availability` is
/// `Unavailable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub availability: Availability,
    pub display_state: DisplayState,
    pub message: String,
    pub error: Option<ScriptError>,
}

impl ProbeOutcome {
    fn available(on: bool) -> Self {
        ProbeOutcome {
            availability: Availability::Available,
            display_state: DisplayState::from_bool(on),
            message: if on { "Enabled" } else { "Disabled" }.to_string(),
            error: None,
        }
    }

    fn locked_on() -> Self {
        ProbeOutcome {
            availability: Availability::LockedOn,
            display_state: DisplayState::On,
            message: LOCKED_ON_MESSAGE.to_string(),
            error: None,
        }
    }

    pub fn unavailable(error: ScriptError) -> Self {
        ProbeOutcome {
            availability: Availability::Unavailable,
            display_state: DisplayState::Unknown,
            message: error.unavailable_message().to_string(),
            error: Some(error),
        }
    }
}

/// Map a finished `check` call onto exactly one of the four probe states.
pub fn classify(path: &Path, result: &ProcessResult, timeout: Duration) -> ProbeOutcome {
    if let Some(error) = result.failure(path, timeout) {
        return ProbeOutcome::unavailable(error);
    }

    match result.stdout.trim().to_lowercase().as_str() {
        "true" => ProbeOutcome::available(true),
        "false" => ProbeOutcome::available(false),
        "true_disabled" => ProbeOutcome::locked_on(),
        _ => ProbeOutcome::unavailable(ScriptError::MalformedOutput {
            path: path.to_path_buf(),
            output: result.stdout.trim().to_string(),
        }),
    }
}

/// Read-only query of a toggle's state. Never touches the registry.
#[derive(Clone)]
pub struct StateProber {
    runner: Arc<dyn ScriptRunner>,
    timeout: Duration,
}

impl StateProber {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self::with_timeout(runner, PROBE_TIMEOUT)
    }

    pub fn with_timeout(runner: Arc<dyn ScriptRunner>, timeout: Duration) -> Self {
        StateProber { runner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn probe(&self, script_path: &Path) -> ProbeOutcome {
        let result = match self
            .runner
            .run(script_path, vec!["check".to_string()], self.timeout)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                return ProbeOutcome::unavailable(ScriptError::LaunchFault {
                    path: script_path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        let outcome = classify(script_path, &result, self.timeout);
        match &outcome.error {
            Some(ScriptError::MalformedOutput { output, .. }) => {
                log::warn!("[Probe] output from script {}: {}", script_path.display(), output);
            }
            Some(ScriptError::NonZeroExit { .. }) => {
                log::warn!(
                    "[Probe] Error checking state of {}: {}",
                    script_path.display(),
                    result.stderr.trim()
                );
            }
            Some(other) => log::warn!("[Probe] {}", other),
            None => {}
        }
        outcome
    }
}
