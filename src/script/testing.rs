//! In-memory script runner for engine unit tests.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::runner::ScriptRunner;
use crate::models::{ProcessOutcome, ProcessResult};

#[derive(Debug, Clone)]
pub struct FakeScript {
    check_stdout: String,
    check_outcome: Option<ProcessOutcome>,
    toggle_exit: i32,
    toggle_stderr: String,
    toggle_outcome: Option<ProcessOutcome>,
    apply_on_failure: bool,
    delay: Option<Duration>,
    side_effects: Vec<(PathBuf, bool)>,
}

impl FakeScript {
    /// Answers `check` with its current state; successful toggles update it.
    pub fn state(on: bool) -> Self {
        Self::raw(if on { "true" } else { "false" })
    }

    pub fn raw(check_stdout: &str) -> Self {
        FakeScript {
            check_stdout: check_stdout.to_string(),
            check_outcome: None,
            toggle_exit: 0,
            toggle_stderr: String::new(),
            toggle_outcome: None,
            apply_on_failure: false,
            delay: None,
            side_effects: Vec::new(),
        }
    }

    pub fn locked() -> Self {
        Self::raw("true_disabled")
    }

    pub fn toggle_exit(mut self, code: i32, stderr: &str) -> Self {
        self.toggle_exit = code;
        self.toggle_stderr = stderr.to_string();
        self
    }

    /// A failing toggle still switches the state, like a script that
    /// errors out after doing its work.
    pub fn applies_on_failure(mut self) -> Self {
        self.apply_on_failure = true;
        self
    }

    pub fn toggle_outcome(mut self, outcome: ProcessOutcome) -> Self {
        self.toggle_outcome = Some(outcome);
        self
    }

    pub fn check_outcome(mut self, outcome: ProcessOutcome) -> Self {
        self.check_outcome = Some(outcome);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A successful toggle also flips another script's state.
    pub fn side_effect(mut self, other: &str, on: bool) -> Self {
        self.side_effects.push((PathBuf::from(other), on));
        self
    }
}

#[derive(Default)]
struct FakeState {
    scripts: HashMap<PathBuf, FakeScript>,
    calls: HashMap<PathBuf, Vec<Vec<String>>>,
    running: HashMap<PathBuf, usize>,
    max_running: HashMap<PathBuf, usize>,
}

#[derive(Default)]
pub struct FakeRunner {
    state: Mutex<FakeState>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRunner::default())
    }

    pub fn add(&self, path: &str, script: FakeScript) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(PathBuf::from(path), script);
    }

    /// Change what the "system" reports without going through a toggle.
    pub fn set_check(&self, path: &str, stdout: &str) {
        if let Some(script) = self.state.lock().unwrap().scripts.get_mut(Path::new(path)) {
            script.check_stdout = stdout.to_string();
        }
    }

    pub fn calls(&self, path: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(Path::new(path))
            .cloned()
            .unwrap_or_default()
    }

    pub fn toggle_calls(&self, path: &str) -> usize {
        self.calls(path)
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some("toggle"))
            .count()
    }

    pub fn max_concurrent(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_running
            .get(Path::new(path))
            .copied()
            .unwrap_or(0)
    }

    fn respond(&self, path: &Path, args: &[String]) -> ProcessResult {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .entry(path.to_path_buf())
            .or_default()
            .push(args.to_vec());

        let Some(script) = state.scripts.get(path).cloned() else {
            return ProcessResult::new(ProcessOutcome::NotFound);
        };

        match args.first().map(String::as_str) {
            Some("check") => match script.check_outcome {
                Some(outcome) => ProcessResult::new(outcome),
                None => ProcessResult::exited(0, format!("{}\n", script.check_stdout), ""),
            },
            Some("toggle") => match script.toggle_outcome {
                Some(outcome) => ProcessResult::new(outcome),
                None if script.toggle_exit != 0 => {
                    if script.apply_on_failure {
                        let on = args.get(1).map(String::as_str) == Some("true");
                        if let Some(s) = state.scripts.get_mut(path) {
                            s.check_stdout = if on { "true" } else { "false" }.to_string();
                        }
                    }
                    ProcessResult::exited(script.toggle_exit, "", script.toggle_stderr.clone())
                }
                None => {
                    let on = args.get(1).map(String::as_str) == Some("true");
                    if let Some(s) = state.scripts.get_mut(path) {
                        s.check_stdout = if on { "true" } else { "false" }.to_string();
                    }
                    for (other, other_on) in &script.side_effects {
                        if let Some(s) = state.scripts.get_mut(other) {
                            s.check_stdout = if *other_on { "true" } else { "false" }.to_string();
                        }
                    }
                    ProcessResult::exited(0, "", "")
                }
            },
            _ => ProcessResult::exited(2, "", "usage"),
        }
    }
}

impl ScriptRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        path: &'a Path,
        args: Vec<String>,
        _timeout: Duration,
    ) -> BoxFuture<'a, io::Result<ProcessResult>> {
        Box::pin(async move {
            {
                let mut state = self.state.lock().unwrap();
                let running = state.running.entry(path.to_path_buf()).or_default();
                *running += 1;
                let now = *running;
                let max = state.max_running.entry(path.to_path_buf()).or_default();
                *max = (*max).max(now);
            }
            let delay = self.state.lock().unwrap().scripts.get(path).and_then(|s| s.delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = self.respond(path, &args);
            if let Some(running) = self.state.lock().unwrap().running.get_mut(path) {
                *running -= 1;
            }
            Ok(result)
        })
    }
}
