//! cavelink - control client for the Cavian hardware step sequencer
//!
//! Mirrors the device's 8x8x8x8 pattern and transport state, lets an
//! operator edit it, and keeps a local simulation running when no device
//! is reachable:
//! - Pattern store: the 4-D cell matrix, mute vector and swing table
//! - Navigation cursor with view-mode slice addressing
//! - Step clock approximating the device playhead
//! - Device link: protocol codec, framed transport, live/demo lifecycle
//! - Sync engine tying it all together

pub mod engine;
pub mod error;
pub mod link;
pub mod pattern;

// Re-export commonly used types
pub use engine::clock::{tick_interval, ClockEvent, StepClock};
pub use engine::{demo, Notification, SyncEngine, DEFAULT_BPM, MAX_BPM, MIN_BPM};
pub use error::{LinkError, PatternError, ProtocolDecodeError};
pub use link::protocol::{ClientMessage, DeviceMessage, FullPattern, Segment};
pub use link::transport::{Frame, TcpTransport, Transport, TransportEvent, DEVICE_PORT};
pub use link::{ConnectionManager, LinkEvent, LinkState, MAX_RECONNECT_ATTEMPTS};
pub use pattern::cursor::{Axis, NavigationCursor, ViewMode};
pub use pattern::{
    CaveArray, CellValue, PatternStore, SwingMode, SwingTemplate, CHANNELS, GROUPS, PRESETS, STEPS,
};
