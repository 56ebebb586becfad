//! Interactive-side glue: events, channels and the panel controller.

pub mod bridge;
pub mod controller;
pub mod events;

pub use bridge::{spawn_monitored_task, EventBridge, StreamId};
pub use controller::{PanelController, StreamHandle};
pub use events::{EventSink, PanelEvent};
