//! Error taxonomy for the sync core.
use thiserror::Error;

/// Contract violations raised by the pattern store and cursor.
///
/// These come from callers inside the process and are surfaced
/// immediately, never silently clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("invalid cell value {0}, expected 0, 1 or 9")]
    InvalidCellValue(u8),
    #[error("{axis} index {index} out of range 0..8")]
    IndexOutOfRange { axis: &'static str, index: usize },
}

/// A malformed inbound device message.
///
/// Recovered locally: the message is dropped and processing continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode device message: {reason}")]
pub struct ProtocolDecodeError {
    pub reason: String,
}

impl ProtocolDecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failures of the device link. Drive the connectivity state machine,
/// never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),
}
