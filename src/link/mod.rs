//! Connection lifecycle - owns the transport and decides live vs demo.
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::LinkError;

pub mod protocol;
pub mod transport;

use protocol::{ClientMessage, DeviceMessage};
use transport::{Frame, Transport, TransportEvent};

/// Fixed delay before each reconnect attempt. The attempt counter is
/// small and bounded, so no backoff curve.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Reconnect attempts before committing to demo mode.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connectivity of the device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Live,
    ReconnectWait { attempt: u32 },
    Demo,
}

/// What the link surfaced during a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    StateChanged(LinkState),
    Message(DeviceMessage),
    /// A frame arrived on the bulk binary channel. Payload parsing is
    /// not wired up; only the byte count is reported.
    Binary(usize),
}

/// Drives the `Connecting -> Live -> ReconnectWait -> Demo` machine.
///
/// Once the attempt budget is spent the link commits to demo and stops
/// retrying; only an explicit [`reconnect`](Self::reconnect) leaves demo
/// again. While in `ReconnectWait` exactly one deadline is armed, and
/// entering `Demo` clears it.
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    state: LinkState,
    attempts: u32,
    retry_at: Option<Instant>,
    reconnect_delay: Duration,
    pending: Vec<LinkEvent>,
}

impl ConnectionManager {
    /// Take ownership of the transport and start the first connection
    /// attempt.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        let mut manager = Self {
            transport,
            state: LinkState::Connecting,
            attempts: 0,
            retry_at: None,
            reconnect_delay: RECONNECT_DELAY,
            pending: Vec::new(),
        };
        manager.transport.open();
        manager
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Send a protocol message if the link is live. Returns whether the
    /// message went out.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if self.state != LinkState::Live {
            return false;
        }
        let payload = match protocol::encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to encode outbound message: {e}");
                return false;
            }
        };
        match self.transport.send(Frame::Text(payload)) {
            Ok(()) => true,
            Err(e) => {
                warn!("send failed: {e}");
                false
            }
        }
    }

    /// Ask the device for all saved preset slots.
    pub fn request_presets(&mut self) -> bool {
        self.send(&ClientMessage::GetPresetsAll)
    }

    /// Leave demo mode and dial again with a fresh attempt budget.
    pub fn reconnect(&mut self) {
        if self.state != LinkState::Demo {
            return;
        }
        self.attempts = 0;
        self.set_state(LinkState::Connecting);
        self.transport.open();
    }

    /// Release the transport and cancel any pending reconnect. Part of
    /// session teardown.
    pub fn close(&mut self) {
        self.retry_at = None;
        self.transport.close();
    }

    /// Drain everything the link produced since the last poll.
    pub fn poll(&mut self) -> Vec<LinkEvent> {
        if let Some(at) = self.retry_at {
            if Instant::now() >= at {
                self.retry_at = None;
                self.set_state(LinkState::Connecting);
                self.transport.open();
            }
        }

        for event in self.transport.poll() {
            match event {
                TransportEvent::Opened => {
                    info!("device link established");
                    self.attempts = 0;
                    self.set_state(LinkState::Live);
                    self.send(&ClientMessage::SocketReadySendDefaultPattern);
                    self.send(&ClientMessage::GetActions);
                }
                TransportEvent::Frame(Frame::Text(text)) => match protocol::decode(&text) {
                    Ok(message) => self.pending.push(LinkEvent::Message(message)),
                    Err(e) => warn!("dropping inbound message: {e}"),
                },
                TransportEvent::Frame(Frame::Binary(bytes)) => {
                    debug!("binary frame received: {} bytes", bytes.len());
                    self.pending.push(LinkEvent::Binary(bytes.len()));
                }
                TransportEvent::Closed(reason) => self.handle_closed(&reason),
            }
        }

        std::mem::take(&mut self.pending)
    }

    fn handle_closed(&mut self, reason: &str) {
        if self.state == LinkState::Demo {
            // stale teardown after the link already committed to demo
            return;
        }

        if self.attempts < MAX_RECONNECT_ATTEMPTS {
            self.attempts += 1;
            info!(
                "device link lost ({reason}), retry {}/{} in {:?}",
                self.attempts, MAX_RECONNECT_ATTEMPTS, self.reconnect_delay
            );
            self.retry_at = Some(Instant::now() + self.reconnect_delay);
            self.set_state(LinkState::ReconnectWait {
                attempt: self.attempts,
            });
        } else {
            warn!("{}", LinkError::ReconnectExhausted(self.attempts));
            self.retry_at = None;
            self.transport.close();
            self.set_state(LinkState::Demo);
        }
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            self.state = state;
            self.pending.push(LinkEvent::StateChanged(state));
        }
    }

    #[cfg(test)]
    pub(crate) fn set_reconnect_delay(&mut self, delay: Duration) {
        self.reconnect_delay = delay;
    }
}
