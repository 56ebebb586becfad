//! BigLinux Settings engine
//!
//! The control panel's switch-state synchronization and script-execution
//! engine. Every setting is an external script answering `check` and
//! `toggle true|false`; this crate runs those scripts with timeouts, keeps
//! the displayed state honest, and streams long-running installer output.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Core data structures and types
//! - **script**: Command runner, state prober, state mutator, stream monitor
//! - **registry**: Toggle arena with parent/child adjacency
//! - **search**: Read-only search projection over the registry
//! - **sync**: Probe-everything synchronization passes
//! - **coordinator**: User-requested changes with revert-on-failure
//! - **panel**: Event bridge and controller for the interactive loop
//! - **config**: Engine settings and page manifests
//! - **log_collector**: Decoupled disk logging

// Core foundational modules
pub mod error;
pub mod models;

// Script execution
pub mod script;

// Toggle state
pub mod registry;
pub mod search;
pub mod sync;
pub mod coordinator;

// Interactive-side glue
pub mod panel;

pub mod config;

// Robust, decoupled logging system
pub mod log_collector;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{AppError, ConfigError, RegistryError, Result, ScriptError};

pub use models::{
    Availability, Completion, DisplayState, ProcessOutcome, ProcessResult, ScriptGroup,
    StreamEvent, Toggle, ToggleId, ToggleKind, ToggleSnapshot,
};

pub use script::{
    MutationOutcome, ProbeOutcome, ProcessRunner, ScriptRunner, StateMutator, StateProber,
    StreamMonitor, StreamOutcome, StreamRequest,
};

pub use registry::{GroupId, SharedRegistry, ToggleRegistry, ToggleSpec};
pub use search::{FilterResult, SearchIndex};
pub use sync::{SyncReport, Synchronizer};
pub use coordinator::{ChangeCoordinator, ChangeOrigin, ChangeOutcome};
pub use panel::{EventBridge, PanelController, PanelEvent, StreamHandle, StreamId};
pub use config::{EngineSettings, PageManifest, SettingsManager, WindowGeometry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
