//! Core data structures shared by the script engine, the registry and the
//! panel controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ScriptError;

/// Mutation timeout used when neither the toggle nor the caller sets one.
pub const DEFAULT_TOGGLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Timeout for `<script> check`.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Stable handle of a registered toggle (index into the registry arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToggleId(pub usize);

impl fmt::Display for ToggleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the switch currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayState {
    On,
    Off,
    Unknown,
}

impl DisplayState {
    pub fn from_bool(on: bool) -> Self {
        if on {
            DisplayState::On
        } else {
            DisplayState::Off
        }
    }

    pub fn is_on(&self) -> bool {
        *self == DisplayState::On
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayState::On => "on",
            DisplayState::Off => "off",
            DisplayState::Unknown => "unknown",
        }
    }
}

/// Whether the underlying setting can be changed through the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    Available,
    /// Forced on by system policy; shown but not changeable.
    LockedOn,
    /// Script missing, errored, timed out or answered garbage.
    Unavailable,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::LockedOn => "locked",
            Availability::Unavailable => "unavailable",
        }
    }
}

/// Switches can be changed by the user, indicators only display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleKind {
    #[default]
    Switch,
    Indicator,
}

/// Where a group's scripts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptGroup {
    pub group_name: String,
    pub base_directory: PathBuf,
}

impl ScriptGroup {
    pub fn new(group_name: impl Into<String>, base_directory: impl Into<PathBuf>) -> Self {
        ScriptGroup {
            group_name: group_name.into(),
            base_directory: base_directory.into(),
        }
    }

    /// `<base_directory>/<script_name>.sh`
    pub fn script_path(&self, script_name: &str) -> PathBuf {
        self.base_directory.join(format!("{}.sh", script_name))
    }
}

/// One user-controllable binary setting.
#[derive(Debug, Clone)]
pub struct Toggle {
    pub id: ToggleId,
    pub kind: ToggleKind,
    pub title: String,
    pub subtitle: String,
    pub group_name: String,
    pub script_path: PathBuf,
    /// Fixed at registration.
    pub timeout: Duration,
    pub parent: Option<ToggleId>,
    pub info_text: Option<String>,
    pub icon: Option<String>,

    pub display_state: DisplayState,
    pub availability: Availability,
    /// Tooltip / diagnostic shown next to the row, cleared when available.
    pub message: Option<String>,
    pub visible: bool,
    pub hint_visible: bool,

    /// Lowercased `title + " " + subtitle`.
    pub searchable_text: String,
}

impl Toggle {
    pub fn is_sub_toggle(&self) -> bool {
        self.parent.is_some()
    }

    /// Only available switches accept user changes.
    pub fn is_interactive(&self) -> bool {
        self.kind == ToggleKind::Switch && self.availability == Availability::Available
    }

    /// Hidden because the backing script cannot answer, not because of a parent.
    pub fn is_hidden_no_support(&self) -> bool {
        self.availability == Availability::Unavailable
    }

    pub fn script_name(&self) -> String {
        script_display_name(&self.script_path)
    }

    pub fn snapshot(&self) -> ToggleSnapshot {
        ToggleSnapshot {
            id: self.id,
            title: self.title.clone(),
            script_name: self.script_name(),
            display_state: self.display_state,
            availability: self.availability,
            interactive: self.is_interactive(),
            visible: self.visible,
            hint_visible: self.hint_visible,
            message: self.message.clone(),
        }
    }
}

/// Copy of a toggle's UI-visible fields, taken under the registry lock so a
/// redraw never sees a half-updated toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSnapshot {
    pub id: ToggleId,
    pub title: String,
    pub script_name: String,
    pub display_state: DisplayState,
    pub availability: Availability,
    pub interactive: bool,
    pub visible: bool,
    pub hint_visible: bool,
    pub message: Option<String>,
}

/// How one external command invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessOutcome {
    /// Ran to completion; non-zero codes are a normal outcome.
    Exited(i32),
    /// Killed by a signal we did not send.
    Signaled,
    /// Exceeded its timeout and was killed.
    TimedOut,
    /// Path did not exist; nothing was launched.
    NotFound,
    /// The OS refused to create the process.
    LaunchFailed(String),
}

/// Outcome of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub outcome: ProcessOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessResult {
    pub fn new(outcome: ProcessOutcome) -> Self {
        ProcessResult {
            outcome,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        ProcessResult {
            outcome: ProcessOutcome::Exited(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ProcessOutcome::Exited(code) => Some(code),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Diagnostic for anything other than exit code 0.
    pub fn failure(&self, path: &Path, timeout: Duration) -> Option<ScriptError> {
        let path = path.to_path_buf();
        match &self.outcome {
            ProcessOutcome::Exited(0) => None,
            ProcessOutcome::Exited(code) => Some(ScriptError::NonZeroExit { path, code: *code }),
            ProcessOutcome::Signaled => Some(ScriptError::TerminatedBySignal(path)),
            ProcessOutcome::TimedOut => Some(ScriptError::Timeout { path, timeout }),
            ProcessOutcome::NotFound => Some(ScriptError::NotFound(path)),
            ProcessOutcome::LaunchFailed(reason) => Some(ScriptError::LaunchFault {
                path,
                reason: reason.clone(),
            }),
        }
    }
}

/// One classified line of a streaming script's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Fraction in `0.0..=1.0`.
    Progress(f64),
    Status(String),
    LogLine(String),
}

/// How callers interpret a streaming script's exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    Succeeded,
    /// Exit 126/127 (authentication dismissed) or an explicit cancel.
    Cancelled,
    Failed,
}

impl Completion {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Completion::Succeeded,
            Some(126) | Some(127) => Completion::Cancelled,
            _ => Completion::Failed,
        }
    }
}

/// File name of a script, used in notices and log lines.
pub fn script_display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
