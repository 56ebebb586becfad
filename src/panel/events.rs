//! Events marshalled from background tasks back to the interactive loop.

use tokio::sync::mpsc;

use crate::models::{StreamEvent, ToggleSnapshot};
use crate::script::StreamOutcome;
use crate::sync::SyncReport;

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    ToggleUpdated(ToggleSnapshot),
    SyncCompleted,
    /// Transient, dismissable message for the user.
    Notice(String),
    Stream(StreamEvent),
    StreamFinished(StreamOutcome),
}

/// Optional sending half of the panel event channel.
///
/// Workers never fail because nobody is listening: a closed or absent
/// receiver only drops the event.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PanelEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PanelEvent>) -> Self {
        EventSink { tx: Some(tx) }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub async fn emit(&self, event: PanelEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                log::debug!("[Panel] event receiver dropped");
            }
        }
    }

    /// Publish a finished pass: one update per toggle, then `SyncCompleted`.
    pub async fn emit_sync(&self, report: &SyncReport) {
        for snapshot in &report.snapshots {
            self.emit(PanelEvent::ToggleUpdated(snapshot.clone())).await;
        }
        self.emit(PanelEvent::SyncCompleted).await;
    }
}
