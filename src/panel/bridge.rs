//! Channel plumbing between tokio workers and the interactive loop.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

use super::events::{EventSink, PanelEvent};
use crate::error::AppError;

/// Buffered panel events before workers start waiting on the receiver.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Identifies one streaming session started through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

type CancelMap = Arc<Mutex<HashMap<StreamId, watch::Sender<bool>>>>;

/// Event sender plus one cancel signal per running stream.
pub struct EventBridge {
    pub events_tx: mpsc::Sender<PanelEvent>,
    streams: CancelMap,
    next_stream: AtomicU64,
}

/// Keeps a stream's cancel sender registered until the stream is done.
pub struct StreamRegistration {
    pub id: StreamId,
    pub cancel_rx: watch::Receiver<bool>,
    streams: CancelMap,
}

impl Drop for StreamRegistration {
    fn drop(&mut self) {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl EventBridge {
    pub fn new() -> (Self, mpsc::Receiver<PanelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            EventBridge {
                events_tx,
                streams: Arc::new(Mutex::new(HashMap::new())),
                next_stream: AtomicU64::new(1),
            },
            events_rx,
        )
    }

    pub fn sink(&self) -> EventSink {
        EventSink::new(self.events_tx.clone())
    }

    /// Give a new stream its own cancel channel.
    pub fn register_stream(&self) -> StreamRegistration {
        let id = StreamId(self.next_stream.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cancel_tx);
        StreamRegistration {
            id,
            cancel_rx,
            streams: Arc::clone(&self.streams),
        }
    }

    /// Ask one stream to stop. Returns false if it already finished.
    pub fn signal_cancel(&self, id: StreamId) -> bool {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        match streams.get(&id) {
            Some(cancel_tx) => cancel_tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Ask every running stream to stop, e.g. when the panel closes.
    pub fn signal_cancel_all(&self) -> usize {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams
            .values()
            .filter(|cancel_tx| cancel_tx.send(true).is_ok())
            .count()
    }

    pub fn running_streams(&self) -> usize {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Spawn a background task; a failure is logged and surfaced as a notice.
pub fn spawn_monitored_task<F, Fut>(
    name: &'static str,
    events: EventSink,
    f: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnOnce(EventSink) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), AppError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = f(events.clone()).await {
            log::error!("[Panel] Task {} failed: {}", name, e);
            events.emit(PanelEvent::Notice(e.user_message())).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;

    #[tokio::test]
    async fn test_cancel_signal_reaches_only_its_stream() {
        let (bridge, _rx) = EventBridge::new();
        let mut first = bridge.register_stream();
        let second = bridge.register_stream();
        assert_ne!(first.id, second.id);
        assert_eq!(bridge.running_streams(), 2);

        assert!(bridge.signal_cancel(first.id));
        assert!(first.cancel_rx.changed().await.is_ok());
        assert!(*first.cancel_rx.borrow());
        assert!(!*second.cancel_rx.borrow());

        // A later stream starts with a clear signal.
        let third = bridge.register_stream();
        assert!(!*third.cancel_rx.borrow());
        assert!(*first.cancel_rx.borrow());
    }

    #[tokio::test]
    async fn test_finished_stream_is_unregistered() {
        let (bridge, _rx) = EventBridge::new();
        let stream = bridge.register_stream();
        let id = stream.id;
        drop(stream);

        assert_eq!(bridge.running_streams(), 0);
        assert!(!bridge.signal_cancel(id));
        assert_eq!(bridge.signal_cancel_all(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_becomes_notice() {
        let (bridge, mut rx) = EventBridge::new();
        let handle = spawn_monitored_task("lookup", bridge.sink(), |_events| async {
            Err(AppError::Registry(RegistryError::UnknownHandle(5)))
        });
        handle.await.unwrap();

        match rx.recv().await {
            Some(PanelEvent::Notice(text)) => assert!(text.contains("Unknown toggle handle: 5")),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
