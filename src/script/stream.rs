//! Streaming process monitor for long-running installer/action scripts.
//!
//! The script's stdout and stderr are read line by line as they are
//! produced and classified against the marker protocol:
//!
//! ```text
//! PROGRESS:<0-100>   -> StreamEvent::Progress(n / 100)
//! STATUS:<text>      -> StreamEvent::Status(text)
//! anything else      -> StreamEvent::LogLine(text)
//! ```
//!
//! Events are pushed onto a channel in read order; the final exit code is
//! returned once both pipes are closed and the process has been reaped.
//! There is no overall timeout: installers may run for as long as they keep
//! going. Cancellation goes through a `watch` channel.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use super::runner::{is_resource_exhaustion, terminate};
use crate::error::ScriptError;
use crate::models::{script_display_name, Completion, StreamEvent};

static RESULT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^RESULT:\s*([^=]+?)\s*=\s*(.*)$").expect("valid RESULT regex")
});

/// One streaming invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub script_path: PathBuf,
    pub args: Vec<String>,
    /// Wrap the call in the elevation command (`pkexec` by default).
    #[serde(default)]
    pub elevate: bool,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl StreamRequest {
    pub fn new(script_path: impl Into<PathBuf>, args: &[&str]) -> Self {
        StreamRequest {
            script_path: script_path.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            elevate: false,
            working_dir: None,
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevate = true;
        self
    }
}

/// Final report of a streaming session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub exit_code: Option<i32>,
    pub completion: Completion,
    /// Plain log lines in read order (markers excluded).
    pub log: Vec<String>,
    /// Why the process could not be started or was stopped.
    pub error: Option<String>,
}

impl StreamOutcome {
    fn launch_failure(error: ScriptError) -> Self {
        StreamOutcome {
            exit_code: None,
            completion: Completion::Failed,
            log: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    fn cancelled(log: Vec<String>) -> Self {
        StreamOutcome {
            exit_code: None,
            completion: Completion::Cancelled,
            log,
            error: Some("cancelled".to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.completion == Completion::Succeeded
    }

    /// `RESULT:<key>=<value>` lines, in order.
    pub fn results(&self) -> Vec<(String, String)> {
        self.log
            .iter()
            .filter_map(|line| RESULT_LINE.captures(line))
            .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
            .collect()
    }

    /// `key: value` pairs printed after the first line containing `header`.
    /// Separator rules (`=====`) and lines without a colon are skipped.
    pub fn report(&self, header: &str) -> Vec<(String, String)> {
        self.log
            .iter()
            .skip_while(|line| !line.contains(header))
            .skip(1)
            .filter(|line| !line.contains("====="))
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect()
    }
}

/// Classify one output line. `None` means the line is dropped
/// (malformed or out-of-range `PROGRESS:`).
pub fn classify_line(raw: &str) -> Option<StreamEvent> {
    let text = raw.trim();

    if let Some(rest) = text.strip_prefix("PROGRESS:") {
        let number = rest.split(':').next().unwrap_or("").trim();
        return match number.parse::<f64>() {
            Ok(n) if (0.0..=100.0).contains(&n) => Some(StreamEvent::Progress(n / 100.0)),
            _ => None,
        };
    }

    if let Some(rest) = text.strip_prefix("STATUS:") {
        return Some(StreamEvent::Status(rest.trim().to_string()));
    }

    Some(StreamEvent::LogLine(text.to_string()))
}

#[derive(Debug, Clone)]
pub struct StreamMonitor {
    elevation_command: String,
}

impl Default for StreamMonitor {
    fn default() -> Self {
        StreamMonitor {
            elevation_command: "pkexec".to_string(),
        }
    }
}

impl StreamMonitor {
    pub fn new(elevation_command: impl Into<String>) -> Self {
        StreamMonitor {
            elevation_command: elevation_command.into(),
        }
    }

    fn build_command(&self, request: &StreamRequest) -> Command {
        let mut command = if request.elevate {
            let mut cmd = Command::new(&self.elevation_command);
            cmd.arg(&request.script_path);
            cmd
        } else {
            Command::new(&request.script_path)
        };
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// Run `request` to completion, pushing classified events to `events`.
    ///
    /// A closed event receiver does not stop the script; its output is
    /// still drained so the process can finish.
    pub async fn run_streaming(
        &self,
        request: &StreamRequest,
        events: mpsc::Sender<StreamEvent>,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> StreamOutcome {
        let name = script_display_name(&request.script_path);

        if !request.script_path.exists() {
            log::warn!("[Stream] Script not found: {}", request.script_path.display());
            return StreamOutcome::launch_failure(ScriptError::NotFound(request.script_path.clone()));
        }

        if *cancel_rx.borrow() {
            return StreamOutcome::cancelled(Vec::new());
        }

        let mut child = match self.build_command(request).spawn() {
            Ok(child) => child,
            Err(e) => {
                if is_resource_exhaustion(&e) {
                    log::error!("[Stream] Cannot fork for {}: {}", name, e);
                } else {
                    log::warn!("[Stream] Failed to launch {}: {}", name, e);
                }
                return StreamOutcome::launch_failure(ScriptError::LaunchFault {
                    path: request.script_path.clone(),
                    reason: e.to_string(),
                });
            }
        };
        log::info!("[Stream] Started {} {}", name, request.args.join(" "));

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate(&mut child).await;
            return StreamOutcome::launch_failure(ScriptError::LaunchFault {
                path: request.script_path.clone(),
                reason: "failed to capture output pipes".to_string(),
            });
        };

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_closed = false;
        let mut stderr_closed = false;
        let mut cancel_closed = false;
        let mut log_lines = Vec::new();

        while !(stdout_closed && stderr_closed) {
            let line = tokio::select! {
                line = stdout_lines.next_line(), if !stdout_closed => match line {
                    Ok(Some(line)) => Some(line),
                    Ok(None) => { stdout_closed = true; None }
                    Err(e) => {
                        log::warn!("[Stream] stdout read error from {}: {}", name, e);
                        stdout_closed = true;
                        None
                    }
                },
                line = stderr_lines.next_line(), if !stderr_closed => match line {
                    Ok(Some(line)) => Some(line),
                    Ok(None) => { stderr_closed = true; None }
                    Err(e) => {
                        log::warn!("[Stream] stderr read error from {}: {}", name, e);
                        stderr_closed = true;
                        None
                    }
                },
                changed = cancel_rx.changed(), if !cancel_closed => {
                    if changed.is_err() {
                        cancel_closed = true;
                    } else if *cancel_rx.borrow() {
                        log::info!("[Stream] {} cancelled by user", name);
                        terminate(&mut child).await;
                        return StreamOutcome::cancelled(log_lines);
                    }
                    None
                }
            };

            let Some(line) = line else { continue };
            let Some(event) = classify_line(&line) else {
                log::debug!("[Stream] dropped malformed marker: {}", line.trim());
                continue;
            };
            match &event {
                StreamEvent::LogLine(text) => {
                    log::debug!("[Stream] {}: {}", name, text);
                    log_lines.push(text.clone());
                }
                StreamEvent::Status(text) => log::info!("[Stream] {}: {}", name, text),
                StreamEvent::Progress(_) => {}
            }
            // Receiver gone: keep draining so the script is not blocked on a full pipe.
            let _ = events.send(event).await;
        }

        // Both pipes are closed, but the script itself may still be running.
        let waited = loop {
            tokio::select! {
                status = child.wait() => break Some(status),
                changed = cancel_rx.changed(), if !cancel_closed => {
                    if changed.is_err() {
                        cancel_closed = true;
                    } else if *cancel_rx.borrow() {
                        break None;
                    }
                }
            }
        };
        let Some(waited) = waited else {
            log::info!("[Stream] {} cancelled by user after closing its output", name);
            terminate(&mut child).await;
            return StreamOutcome::cancelled(log_lines);
        };

        match waited {
            Ok(status) => {
                let exit_code = status.code();
                let completion = Completion::from_exit_code(exit_code);
                log::info!("[Stream] {} finished: {:?} ({:?})", name, completion, exit_code);
                StreamOutcome {
                    exit_code,
                    completion,
                    log: log_lines,
                    error: None,
                }
            }
            Err(e) => {
                log::error!("[Stream] failed to wait for {}: {}", name, e);
                StreamOutcome {
                    exit_code: None,
                    completion: Completion::Failed,
                    log: log_lines,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
