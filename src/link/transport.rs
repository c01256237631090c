//! Device transport - a message-oriented duplex frame channel and its
//! TCP implementation.
//!
//! Frames are either text (JSON protocol messages) or binary (reserved
//! for bulk pattern transfer). On the wire each frame carries a small
//! header; only this framing is contractual for the binary channel, the
//! payload format stays opaque to the core.
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use log::debug;

use crate::error::LinkError;

/// Device port, fixed by the firmware.
pub const DEVICE_PORT: u16 = 81;

/// Frame kind tags on the wire.
const FRAME_TEXT: u8 = 0;
const FRAME_BINARY: u8 = 1;

/// Header: kind (1) + payload length (4, big-endian).
const FRAME_HEADER_SIZE: usize = 5;

/// Frames above this size indicate a corrupt stream.
const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(Frame),
    Closed(String),
}

/// A duplex message channel to one device.
///
/// `poll` never blocks: connection attempts and reads run on background
/// threads and surface as events. A failed `open` reports `Closed`
/// through `poll` like any other teardown.
pub trait Transport {
    fn open(&mut self);
    fn send(&mut self, frame: Frame) -> Result<(), LinkError>;
    fn poll(&mut self) -> Vec<TransportEvent>;
    fn close(&mut self);
}

/// TCP transport to `host:81`.
///
/// `open` dials on a one-shot thread; once connected, a reader thread
/// feeds decoded frames into the event channel. The epoch counter ties
/// the reader to the connection that spawned it, so a torn-down
/// connection can never post stale events.
pub struct TcpTransport {
    host: String,
    events_tx: Sender<TransportEvent>,
    events_rx: Receiver<TransportEvent>,
    epoch: Arc<AtomicU64>,
    stream: Option<TcpStream>,
    dial_rx: Option<Receiver<io::Result<TcpStream>>>,
}

impl TcpTransport {
    pub fn new(host: &str) -> Self {
        let (events_tx, events_rx) = channel();

        Self {
            host: host.to_string(),
            events_tx,
            events_rx,
            epoch: Arc::new(AtomicU64::new(0)),
            stream: None,
            dial_rx: None,
        }
    }

    fn attach(&mut self, stream: TcpStream, events: &mut Vec<TransportEvent>) {
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                events.push(TransportEvent::Closed(e.to_string()));
                return;
            }
        };
        self.stream = Some(stream);
        events.push(TransportEvent::Opened);

        let tx = self.events_tx.clone();
        let epoch = Arc::clone(&self.epoch);
        let born = epoch.load(Ordering::SeqCst);

        thread::spawn(move || {
            let mut reader = reader;
            loop {
                let result = read_frame(&mut reader);
                if epoch.load(Ordering::SeqCst) != born {
                    return;
                }
                match result {
                    Ok(frame) => {
                        if tx.send(TransportEvent::Frame(frame)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Closed(e.to_string()));
                        return;
                    }
                }
            }
        });
    }

    fn teardown(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.dial_rx = None;
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) {
        self.teardown();
        let addr = format!("{}:{}", self.host, DEVICE_PORT);
        debug!("dialing {addr}");

        let (tx, rx) = channel();
        thread::spawn(move || {
            let _ = tx.send(TcpStream::connect(addr));
        });
        self.dial_rx = Some(rx);
    }

    fn send(&mut self, frame: Frame) -> Result<(), LinkError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LinkError::TransportUnavailable("not connected".to_string()))?;
        write_frame(stream, &frame).map_err(|e| LinkError::TransportUnavailable(e.to_string()))
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        if let Some(rx) = &self.dial_rx {
            match rx.try_recv() {
                Ok(Ok(stream)) => {
                    self.dial_rx = None;
                    self.attach(stream, &mut events);
                }
                Ok(Err(e)) => {
                    self.dial_rx = None;
                    events.push(TransportEvent::Closed(e.to_string()));
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.dial_rx = None;
                    events.push(TransportEvent::Closed("dial thread died".to_string()));
                }
            }
        }

        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn close(&mut self) {
        self.teardown();
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn read_frame<R: Read>(reader: &mut R) -> io::Result<Frame> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let kind = header[0];
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    match kind {
        FRAME_TEXT => {
            let text = String::from_utf8(payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Frame::Text(text))
        }
        FRAME_BINARY => Ok(Frame::Binary(payload)),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown frame kind {other}"),
        )),
    }
}

fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> io::Result<()> {
    let (kind, payload) = match frame {
        Frame::Text(text) => (FRAME_TEXT, text.as_bytes()),
        Frame::Binary(bytes) => (FRAME_BINARY, bytes.as_slice()),
    };
    writer.write_all(&[kind])?;
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Scripted in-memory transport for driving the connection state machine
/// in tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::{Frame, Transport, TransportEvent};
    use crate::error::LinkError;

    #[derive(Default)]
    struct Script {
        open_outcomes: VecDeque<Result<(), String>>,
        pending: VecDeque<TransportEvent>,
        sent: Vec<Frame>,
        open_calls: u32,
        connected: bool,
    }

    pub struct ScriptedTransport {
        script: Arc<Mutex<Script>>,
    }

    #[derive(Clone)]
    pub struct ScriptHandle {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedTransport {
        pub fn pair() -> (Self, ScriptHandle) {
            let script = Arc::new(Mutex::new(Script::default()));
            (
                Self {
                    script: Arc::clone(&script),
                },
                ScriptHandle { script },
            )
        }
    }

    impl Transport for ScriptedTransport {
        fn open(&mut self) {
            let mut script = self.script.lock().unwrap();
            script.open_calls += 1;
            match script.open_outcomes.pop_front() {
                Some(Ok(())) => {
                    script.connected = true;
                    script.pending.push_back(TransportEvent::Opened);
                }
                Some(Err(reason)) => script.pending.push_back(TransportEvent::Closed(reason)),
                None => script
                    .pending
                    .push_back(TransportEvent::Closed("unscripted open".to_string())),
            }
        }

        fn send(&mut self, frame: Frame) -> Result<(), LinkError> {
            let mut script = self.script.lock().unwrap();
            if !script.connected {
                return Err(LinkError::TransportUnavailable("not connected".to_string()));
            }
            script.sent.push(frame);
            Ok(())
        }

        fn poll(&mut self) -> Vec<TransportEvent> {
            self.script.lock().unwrap().pending.drain(..).collect()
        }

        fn close(&mut self) {
            self.script.lock().unwrap().connected = false;
        }
    }

    impl ScriptHandle {
        pub fn accept_next_open(&self) {
            self.script
                .lock()
                .unwrap()
                .open_outcomes
                .push_back(Ok(()));
        }

        pub fn refuse_opens(&self, count: u32) {
            let mut script = self.script.lock().unwrap();
            for _ in 0..count {
                script
                    .open_outcomes
                    .push_back(Err("connection refused".to_string()));
            }
        }

        pub fn push_text(&self, payload: &str) {
            self.script
                .lock()
                .unwrap()
                .pending
                .push_back(TransportEvent::Frame(Frame::Text(payload.to_string())));
        }

        pub fn push_binary(&self, bytes: Vec<u8>) {
            self.script
                .lock()
                .unwrap()
                .pending
                .push_back(TransportEvent::Frame(Frame::Binary(bytes)));
        }

        pub fn push_closed(&self, reason: &str) {
            let mut script = self.script.lock().unwrap();
            script.connected = false;
            script
                .pending
                .push_back(TransportEvent::Closed(reason.to_string()));
        }

        pub fn open_calls(&self) -> u32 {
            self.script.lock().unwrap().open_calls
        }

        pub fn sent_texts(&self) -> Vec<String> {
            self.script
                .lock()
                .unwrap()
                .sent
                .iter()
                .filter_map(|frame| match frame {
                    Frame::Text(text) => Some(text.clone()),
                    Frame::Binary(_) => None,
                })
                .collect()
        }

        pub fn clear_sent(&self) {
            self.script.lock().unwrap().sent.clear();
        }
    }
}
