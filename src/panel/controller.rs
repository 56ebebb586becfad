//! Panel controller: wires registry, synchronizer, coordinator and stream
//! monitor together behind non-blocking entry points.
//!
//! Nothing here blocks the caller. Every `spawn_*` method starts a tokio
//! task and reports through `PanelEvent`s on the receiver returned by
//! `PanelController::new`.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::bridge::{spawn_monitored_task, EventBridge, StreamId};
use super::events::PanelEvent;
use crate::config::EngineSettings;
use crate::coordinator::{ChangeCoordinator, ChangeOrigin};
use crate::error::AppError;
use crate::models::{StreamEvent, ToggleId, ToggleSnapshot};
use crate::registry::{read_registry, SharedRegistry, ToggleRegistry};
use crate::script::{ScriptRunner, StateMutator, StateProber, StreamMonitor, StreamRequest};
use crate::search::SearchIndex;
use crate::sync::{SyncReport, Synchronizer};

/// A running stream: cancel it by id, await the task for completion.
pub struct StreamHandle {
    pub id: StreamId,
    pub task: JoinHandle<()>,
}

pub struct PanelController {
    registry: SharedRegistry,
    synchronizer: Synchronizer,
    coordinator: ChangeCoordinator,
    monitor: StreamMonitor,
    bridge: EventBridge,
}

impl PanelController {
    pub fn new(
        registry: ToggleRegistry,
        runner: Arc<dyn ScriptRunner>,
        settings: &EngineSettings,
    ) -> (Self, mpsc::Receiver<PanelEvent>) {
        let (bridge, events_rx) = EventBridge::new();
        let registry = registry.into_shared();
        let prober = StateProber::with_timeout(runner.clone(), settings.probe_timeout());
        let synchronizer =
            Synchronizer::with_concurrency(registry.clone(), prober, settings.probe_concurrency());
        let coordinator = ChangeCoordinator::new(
            StateMutator::new(runner),
            synchronizer.clone(),
            bridge.sink(),
        );

        let controller = PanelController {
            registry,
            synchronizer,
            coordinator,
            monitor: StreamMonitor::new(settings.elevation_command.clone()),
            bridge,
        };
        (controller, events_rx)
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn snapshots(&self) -> Vec<ToggleSnapshot> {
        read_registry(&self.registry).snapshots()
    }

    /// Search projection of the current state.
    pub fn search_index(&self) -> SearchIndex {
        SearchIndex::build(&read_registry(&self.registry))
    }

    /// Run one synchronization pass and publish it.
    pub async fn sync_now(&self) -> SyncReport {
        let report = self.synchronizer.sync_all().await;
        self.bridge.sink().emit_sync(&report).await;
        report
    }

    pub fn spawn_sync(&self) -> JoinHandle<()> {
        let synchronizer = self.synchronizer.clone();
        spawn_monitored_task("sync", self.bridge.sink(), move |events| async move {
            let report = synchronizer.sync_all().await;
            events.emit_sync(&report).await;
            Ok(())
        })
    }

    /// User flipped a switch.
    pub fn spawn_change(&self, id: ToggleId, desired: bool) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        spawn_monitored_task("change", self.bridge.sink(), move |_events| async move {
            let outcome = coordinator
                .request_change(id, desired, ChangeOrigin::User)
                .await
                .map_err(AppError::from)?;
            log::debug!("[Panel] change of {} finished: {:?}", id, outcome);
            Ok(())
        })
    }

    /// Run a streaming script, forwarding its events as they arrive.
    pub fn spawn_stream(&self, request: StreamRequest) -> StreamHandle {
        let registration = self.bridge.register_stream();
        let id = registration.id;
        let cancel_rx = registration.cancel_rx.clone();
        let monitor = self.monitor.clone();
        log::debug!("[Panel] {} runs {}", id, request.script_path.display());

        let task = spawn_monitored_task("stream", self.bridge.sink(), move |events| async move {
            let _registration = registration;
            let (stream_tx, mut stream_rx) = mpsc::channel::<StreamEvent>(64);
            let forward_events = events.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(event) = stream_rx.recv().await {
                    forward_events.emit(PanelEvent::Stream(event)).await;
                }
            });

            let outcome = monitor.run_streaming(&request, stream_tx, cancel_rx).await;
            // All stream events precede StreamFinished.
            if let Err(e) = forwarder.await {
                return Err(AppError::ChannelClosed(e.to_string()));
            }
            events.emit(PanelEvent::StreamFinished(outcome)).await;
            Ok(())
        });
        StreamHandle { id, task }
    }

    /// Cancel one stream. Returns false if it already finished.
    pub fn cancel_stream(&self, id: StreamId) -> bool {
        let sent = self.bridge.signal_cancel(id);
        if !sent {
            log::debug!("[Panel] {} already finished, nothing to cancel", id);
        }
        sent
    }

    /// Cancel every running stream.
    pub fn cancel_all_streams(&self) -> usize {
        self.bridge.signal_cancel_all()
    }
}
