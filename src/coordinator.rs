//! Change coordinator: the entry point for user-requested toggle changes.
//!
//! A request shows the new state optimistically, runs the toggle script and
//! then either reverts (with a notice) or cascades to the children. Both
//! paths end by re-synchronizing the whole page, since scripts often change
//! the state behind other toggles too, failing ones included.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::RegistryError;
use crate::log_notice;
use crate::models::{Availability, DisplayState, ToggleId, ToggleKind};
use crate::panel::{EventSink, PanelEvent};
use crate::registry::{read_registry, write_registry, SharedRegistry};
use crate::script::StateMutator;
use crate::sync::{SyncReport, Synchronizer};

/// Who asked for the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    User,
    /// A state update driven by synchronization; never runs a script.
    Programmatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Programmatic,
    InFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ReadOnly,
    LockedOn,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Script succeeded; the page was re-synchronized afterwards.
    Applied(SyncReport),
    /// Script failed; the previous display state was restored and the page
    /// re-synchronized.
    Reverted { notice: String, diagnostic: String },
    Ignored(IgnoreReason),
    Rejected(RejectReason),
}

/// Marks a toggle as busy for the lifetime of the guard.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<ToggleId>>>,
    id: ToggleId,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<ToggleId>>>, id: ToggleId) -> Option<Self> {
        let inserted = set.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
        inserted.then(|| InFlightGuard {
            set: Arc::clone(set),
            id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[derive(Clone)]
pub struct ChangeCoordinator {
    registry: SharedRegistry,
    mutator: StateMutator,
    synchronizer: Synchronizer,
    in_flight: Arc<Mutex<HashSet<ToggleId>>>,
    events: EventSink,
}

impl ChangeCoordinator {
    pub fn new(mutator: StateMutator, synchronizer: Synchronizer, events: EventSink) -> Self {
        ChangeCoordinator {
            registry: synchronizer.registry().clone(),
            mutator,
            synchronizer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            events,
        }
    }

    pub fn is_in_flight(&self, id: ToggleId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    pub async fn request_change(
        &self,
        id: ToggleId,
        desired: bool,
        origin: ChangeOrigin,
    ) -> Result<ChangeOutcome, RegistryError> {
        self.request_change_with_timeout(id, desired, origin, None).await
    }

    /// Like `request_change`, with a one-off timeout for this call only.
    pub async fn request_change_with_timeout(
        &self,
        id: ToggleId,
        desired: bool,
        origin: ChangeOrigin,
        timeout_override: Option<Duration>,
    ) -> Result<ChangeOutcome, RegistryError> {
        let toggle = read_registry(&self.registry).get(id)?.clone();

        if origin == ChangeOrigin::Programmatic {
            log::debug!("[Change] Ignoring programmatic update of {}", toggle.script_name());
            return Ok(ChangeOutcome::Ignored(IgnoreReason::Programmatic));
        }
        if toggle.kind == ToggleKind::Indicator {
            return Ok(ChangeOutcome::Rejected(RejectReason::ReadOnly));
        }
        match toggle.availability {
            Availability::Available => {}
            Availability::LockedOn => return Ok(ChangeOutcome::Rejected(RejectReason::LockedOn)),
            Availability::Unavailable => {
                return Ok(ChangeOutcome::Rejected(RejectReason::Unavailable))
            }
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, id) else {
            log::info!("[Change] {} is already changing, ignoring request", toggle.script_name());
            return Ok(ChangeOutcome::Ignored(IgnoreReason::InFlight));
        };

        let previous = toggle.display_state;
        self.show(id, DisplayState::from_bool(desired)).await?;

        let mutation = self
            .mutator
            .mutate(&toggle.script_path, desired, Some(toggle.timeout), timeout_override)
            .await;
        let failure = match mutation {
            Ok(outcome) if outcome.success => None,
            Ok(outcome) => Some(outcome.diagnostic()),
            Err(fault) => {
                log::error!("[Change] Could not start {}: {}", toggle.script_name(), fault);
                Some(fault.to_string())
            }
        };

        if let Some(diagnostic) = failure {
            self.show(id, previous).await?;
            let notice = format!("Failed to change setting: {}", toggle.script_name());
            log_notice!("{}", notice);
            log::error!("[Change] {} reverted to {}: {}", toggle.script_name(), previous.as_str(), diagnostic);
            self.events.emit(PanelEvent::Notice(notice.clone())).await;
            // A failing script may still have changed something.
            let report = self.synchronizer.sync_all().await;
            self.events.emit_sync(&report).await;
            return Ok(ChangeOutcome::Reverted { notice, diagnostic });
        }

        let children = write_registry(&self.registry).cascade_children(id, desired)?;
        for child in children {
            let snapshot = read_registry(&self.registry).snapshot(child)?;
            self.events.emit(PanelEvent::ToggleUpdated(snapshot)).await;
        }

        let report = self.synchronizer.sync_all().await;
        self.events.emit_sync(&report).await;
        Ok(ChangeOutcome::Applied(report))
    }

    async fn show(&self, id: ToggleId, state: DisplayState) -> Result<(), RegistryError> {
        let snapshot = {
            let mut registry = write_registry(&self.registry);
            registry.set_display_state(id, state)?;
            registry.snapshot(id)?
        };
        self.events.emit(PanelEvent::ToggleUpdated(snapshot)).await;
        Ok(())
    }
}
