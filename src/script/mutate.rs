//! State mutator: `<script> toggle true|false`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::runner::ScriptRunner;
use crate::error::ScriptError;
use crate::models::{script_display_name, ProcessResult, DEFAULT_TOGGLE_TIMEOUT};

/// What happened to one toggle request. Success is exit code 0, nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub success: bool,
    pub timeout: Duration,
    pub result: ProcessResult,
    pub error: Option<ScriptError>,
}

impl MutationOutcome {
    /// Captured output for the failure log.
    pub fn diagnostic(&self) -> String {
        let mut parts = Vec::new();
        if let Some(error) = &self.error {
            parts.push(error.to_string());
        }
        let stderr = self.result.stderr.trim();
        if !stderr.is_empty() {
            parts.push(format!("stderr: {}", stderr));
        }
        let stdout = self.result.stdout.trim();
        if !stdout.is_empty() {
            parts.push(format!("stdout: {}", stdout));
        }
        parts.join("; ")
    }
}

/// Pick the timeout for one call: caller override, then the toggle's own,
/// then the 90 s default.
pub fn effective_timeout(toggle_timeout: Option<Duration>, timeout_override: Option<Duration>) -> Duration {
    timeout_override
        .or(toggle_timeout)
        .unwrap_or(DEFAULT_TOGGLE_TIMEOUT)
}

#[derive(Clone)]
pub struct StateMutator {
    runner: Arc<dyn ScriptRunner>,
}

impl StateMutator {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        StateMutator { runner }
    }

    /// Ask the script to switch to `desired`.
    ///
    /// Ordinary failures come back as `Ok` with `success == false`; `Err`
    /// only when the OS could not create a process at all.
    pub async fn mutate(
        &self,
        script_path: &Path,
        desired: bool,
        toggle_timeout: Option<Duration>,
        timeout_override: Option<Duration>,
    ) -> Result<MutationOutcome, ScriptError> {
        let timeout = effective_timeout(toggle_timeout, timeout_override);
        let name = script_display_name(script_path);
        let state_str = if desired { "true" } else { "false" };
        log::info!("[Mutate] Changing {} to {}", name, if desired { "on" } else { "off" });

        let result = self
            .runner
            .run(
                script_path,
                vec!["toggle".to_string(), state_str.to_string()],
                timeout,
            )
            .await
            .map_err(|e| ScriptError::LaunchFault {
                path: script_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let error = result.failure(script_path, timeout);
        let outcome = MutationOutcome {
            success: error.is_none(),
            timeout,
            result,
            error,
        };

        if outcome.success {
            log::info!("[Mutate] State changed successfully: {}", name);
            let stdout = outcome.result.stdout.trim();
            if !stdout.is_empty() {
                log::debug!("[Mutate] Script output: {}", stdout);
            }
        } else {
            log::error!("[Mutate] {}", outcome.diagnostic());
        }
        Ok(outcome)
    }
}
