//! Sync engine - owns all session state and orchestrates local edits,
//! inbound device events and renderer notifications.
//!
//! Edits apply optimistically: the store mutates first, then the delta
//! goes out if the link is live. A later authoritative snapshot always
//! wins over unacknowledged local edits.
use log::{debug, warn};

use crate::error::PatternError;
use crate::link::protocol::{ClientMessage, DeviceMessage, FullPattern};
use crate::link::transport::{TcpTransport, Transport};
use crate::link::{ConnectionManager, LinkEvent, LinkState};
use crate::pattern::cursor::{Axis, NavigationCursor, ViewMode};
use crate::pattern::{CellValue, PatternStore, SwingMode, SwingTemplate, CHANNELS, STEPS};

pub mod clock;
pub mod demo;

use clock::StepClock;

pub const DEFAULT_BPM: u16 = 120;
pub const MIN_BPM: u16 = 1;
pub const MAX_BPM: u16 = 400;

/// State-change notifications for the renderer. The engine never touches
/// presentation; it only emits these.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PatternChanged,
    CursorChanged {
        group: usize,
        preset: usize,
        channel: usize,
    },
    StepChanged(usize),
    MuteChanged([bool; CHANNELS]),
    ConnectivityChanged(LinkState),
    TempoChanged(u16),
}

/// Top-level orchestrator, constructed once per session.
///
/// All state lives here; collaborators get it injected. Background
/// threads only feed channels - every mutation happens inside
/// [`pump`](Self::pump) or a synchronous intent call on the caller's
/// thread.
pub struct SyncEngine {
    store: PatternStore,
    cursor: NavigationCursor,
    clock: StepClock,
    link: ConnectionManager,
    bpm: u16,
    current_step: usize,
    pattern_received: bool,
    pending: Vec<Notification>,
}

impl SyncEngine {
    /// Session wired to a real device over TCP.
    pub fn connect(host: &str) -> Self {
        Self::with_transport(Box::new(TcpTransport::new(host)))
    }

    /// Session over an injected transport.
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            store: PatternStore::new(),
            cursor: NavigationCursor::new(),
            clock: StepClock::new(),
            link: ConnectionManager::new(transport),
            bpm: DEFAULT_BPM,
            current_step: 0,
            pattern_received: false,
            pending: Vec::new(),
        }
    }

    /// Apply everything that happened since the last call and return the
    /// notifications the renderer should react to.
    pub fn pump(&mut self) -> Vec<Notification> {
        let mut notes = std::mem::take(&mut self.pending);

        for event in self.link.poll() {
            match event {
                LinkEvent::StateChanged(state) => self.on_link_state(state, &mut notes),
                LinkEvent::Message(message) => self.on_device_message(message, &mut notes),
                LinkEvent::Binary(len) => debug!("bulk transfer chunk: {len} bytes"),
            }
        }

        for _tick in self.clock.poll_events() {
            self.current_step = (self.current_step + 1) % STEPS;
            notes.push(Notification::StepChanged(self.current_step));
        }

        notes
    }

    // ---- user-intent surface -------------------------------------------

    /// Cycle the cell addressed by (row, col) in the current view slice.
    /// Returns `None` until a pattern exists (no snapshot yet).
    pub fn toggle_cell(&mut self, row: usize, col: usize) -> Option<CellValue> {
        if !self.pattern_received {
            return None;
        }
        let (group, preset, channel, step) = self.cursor.cell_coords(row, col);
        let value = self.store.cycle_cell(group, preset, channel, step);

        let message = match self.cursor.view_mode() {
            ViewMode::Horizontal64 => ClientMessage::Step64 {
                row: row as u8,
                col: col as u8,
                value: value.into(),
            },
            ViewMode::Vertical | ViewMode::Horizontal8x8 => ClientMessage::Step8x8 {
                row: row as u8,
                col: col as u8,
                value: value.into(),
            },
        };
        self.link.send(&message);
        self.notify(Notification::PatternChanged);
        Some(value)
    }

    /// Flip one channel's mute and report the new muted state.
    pub fn toggle_mute(&mut self, channel: usize) -> bool {
        let muted = !self.store.is_muted(channel);
        self.store.set_mute(channel, muted);
        // wire convention: 1 = audible, 0 = muted
        self.link.send(&ClientMessage::Mute {
            channel: channel as u8,
            value: u8::from(!muted),
        });
        self.notify(Notification::MuteChanged(self.store.mute_vector()));
        muted
    }

    pub fn navigate(&mut self, axis: Axis, direction: i8) {
        self.cursor.move_axis(axis, direction);
        self.link.send(&ClientMessage::UpDownPressed {
            segment: axis.into(),
            direction,
        });
        self.notify_cursor();
    }

    /// Absolute channel selection (row-label tap). Local only; the
    /// device is not told.
    pub fn select_channel(&mut self, channel: usize) -> Result<(), PatternError> {
        self.cursor.set_axis(Axis::Channel, channel)?;
        self.notify_cursor();
        Ok(())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.cursor.set_view_mode(mode);
    }

    /// Nudge the tempo, clamped to [1, 400].
    pub fn set_tempo(&mut self, delta: i32) {
        let clamped =
            (i32::from(self.bpm) + delta).clamp(i32::from(MIN_BPM), i32::from(MAX_BPM)) as u16;
        self.bpm = clamped;
        self.link.send(&ClientMessage::Bpm { bpm: clamped });
        if self.clock.is_ticking() {
            self.clock.start(clamped);
        }
        self.notify(Notification::TempoChanged(clamped));
    }

    pub fn set_swing_mode(&mut self, channel: usize, mode: SwingMode) {
        self.store.set_swing_mode(channel, mode);
    }

    pub fn set_swing_global(&mut self, channel: usize, percent: i8) {
        self.store.set_swing_global(channel, percent);
    }

    pub fn set_swing_step(&mut self, channel: usize, step: usize, percent: i8) {
        self.store.set_swing_step(channel, step, percent);
    }

    pub fn apply_swing_template(&mut self, channel: usize, template: SwingTemplate) {
        self.store.apply_swing_template(channel, template);
    }

    /// Ask the device for all saved preset slots.
    pub fn request_presets(&mut self) -> bool {
        self.link.request_presets()
    }

    /// Leave demo mode and try the device again. Demo-driven pattern,
    /// mute and swing state is discarded; the connected pattern renders
    /// only once an authoritative snapshot lands.
    pub fn reconnect(&mut self) {
        if self.link.state() == LinkState::Demo {
            self.store.clear();
            self.pattern_received = false;
            self.current_step = 0;
            self.clock.stop();
            self.notify(Notification::PatternChanged);
            self.notify(Notification::MuteChanged(self.store.mute_vector()));
        }
        self.link.reconnect();
    }

    /// Session teardown: retire the ticker and release the transport.
    pub fn shutdown(&mut self) {
        self.clock.stop();
        self.link.close();
    }

    // ---- read surface ---------------------------------------------------

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn cursor(&self) -> &NavigationCursor {
        &self.cursor
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// Whether a pattern (snapshot or demo) is present to render.
    pub fn has_pattern(&self) -> bool {
        self.pattern_received
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_ticking()
    }

    // ---- event handling -------------------------------------------------

    fn on_link_state(&mut self, state: LinkState, notes: &mut Vec<Notification>) {
        match state {
            LinkState::Live => {
                // never keep stale local content once live: blank out and
                // wait for the device snapshot
                self.clock.stop();
                self.store.clear();
                self.pattern_received = false;
                self.current_step = 0;
                notes.push(Notification::PatternChanged);
                notes.push(Notification::MuteChanged(self.store.mute_vector()));
            }
            LinkState::Demo => {
                if !self.pattern_received {
                    self.store.replace_all(demo::generate());
                    self.pattern_received = true;
                    notes.push(Notification::PatternChanged);
                }
                self.clock.start(self.bpm);
            }
            LinkState::Connecting | LinkState::ReconnectWait { .. } => {
                // the reconnect deadline (if any) is the only timer armed
                self.clock.stop();
            }
        }
        notes.push(Notification::ConnectivityChanged(state));
    }

    fn on_device_message(&mut self, message: DeviceMessage, notes: &mut Vec<Notification>) {
        match message {
            DeviceMessage::FullPattern(full) => self.apply_snapshot(full, notes),
            DeviceMessage::StepSync { step } => {
                let step = step as usize;
                if step < STEPS {
                    self.current_step = step;
                    notes.push(Notification::StepChanged(step));
                } else {
                    warn!("step_sync index {step} out of range, dropped");
                }
            }
            DeviceMessage::Bpm { bpm } => {
                self.apply_tempo(bpm, notes);
            }
            DeviceMessage::Mute { channel, value } => {
                let channel = channel as usize;
                if channel < CHANNELS {
                    self.store.set_mute(channel, value == 0);
                    notes.push(Notification::MuteChanged(self.store.mute_vector()));
                } else {
                    warn!("mute for channel {channel} out of range, dropped");
                }
            }
            DeviceMessage::ActiveGroup { value } => {
                self.apply_device_axis(Axis::Group, value, notes);
            }
            DeviceMessage::ActivePreset { value } => {
                self.apply_device_axis(Axis::Preset, value, notes);
            }
            DeviceMessage::Ignored => debug!("ignoring unrecognized device message"),
        }
    }

    /// Authoritative snapshot: replaces the matrix wholesale (pending
    /// local edits lose), updates tempo and cursor, starts the playhead.
    fn apply_snapshot(&mut self, full: FullPattern, notes: &mut Vec<Notification>) {
        self.store.replace_all(*full.cave);
        self.pattern_received = true;
        notes.push(Notification::PatternChanged);

        for (axis, value) in [
            (Axis::Group, full.active_group),
            (Axis::Preset, full.active_preset),
            (Axis::Channel, full.active_channel),
        ] {
            if let Err(e) = self.cursor.set_axis(axis, value as usize) {
                warn!("snapshot cursor ignored: {e}");
            }
        }
        notes.push(Notification::CursorChanged {
            group: self.cursor.group(),
            preset: self.cursor.preset(),
            channel: self.cursor.channel(),
        });

        self.bpm = full.bpm.clamp(MIN_BPM, MAX_BPM);
        self.clock.start(self.bpm);
        notes.push(Notification::TempoChanged(self.bpm));
    }

    fn apply_tempo(&mut self, bpm: u16, notes: &mut Vec<Notification>) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        if self.clock.is_ticking() {
            self.clock.start(self.bpm);
        }
        notes.push(Notification::TempoChanged(self.bpm));
    }

    fn apply_device_axis(&mut self, axis: Axis, value: u8, notes: &mut Vec<Notification>) {
        match self.cursor.set_axis(axis, value as usize) {
            Ok(()) => notes.push(Notification::CursorChanged {
                group: self.cursor.group(),
                preset: self.cursor.preset(),
                channel: self.cursor.channel(),
            }),
            Err(e) => warn!("device cursor push ignored: {e}"),
        }
    }

    fn notify(&mut self, note: Notification) {
        self.pending.push(note);
    }

    fn notify_cursor(&mut self) {
        let note = Notification::CursorChanged {
            group: self.cursor.group(),
            preset: self.cursor.preset(),
            channel: self.cursor.channel(),
        };
        self.pending.push(note);
    }

    #[cfg(test)]
    pub(crate) fn link_mut(&mut self) -> &mut ConnectionManager {
        &mut self.link
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::link::transport::testing::{ScriptHandle, ScriptedTransport};
    use crate::pattern::blank_matrix;

    fn engine_with_script(setup: impl FnOnce(&ScriptHandle)) -> (SyncEngine, ScriptHandle) {
        let (transport, handle) = ScriptedTransport::pair();
        setup(&handle);
        let mut engine = SyncEngine::with_transport(Box::new(transport));
        engine.link_mut().set_reconnect_delay(Duration::ZERO);
        (engine, handle)
    }

    fn live_engine_with_snapshot(
        snapshot: serde_json::Value,
    ) -> (SyncEngine, ScriptHandle, Vec<Notification>) {
        let (mut engine, handle) = engine_with_script(|h| h.accept_next_open());
        handle.push_text(&snapshot.to_string());
        let notes = engine.pump();
        handle.clear_sent();
        (engine, handle, notes)
    }

    fn drive_to_demo(engine: &mut SyncEngine) {
        for _ in 0..4 {
            engine.pump();
        }
        assert_eq!(engine.link_state(), LinkState::Demo);
    }

    #[test]
    fn vertical_toggle_cycles_the_addressed_cell_and_reports_it() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
            "bpm": 120,
            "activeGroup": 1,
            "activePreset": 2,
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        assert_eq!(engine.toggle_cell(2, 5), Some(CellValue::Active));
        assert_eq!(engine.store().get(1, 2, 2, 5), CellValue::Active);
        assert_eq!(
            handle.sent_texts(),
            vec![r#"{"type":"8x8step","row":2,"col":5,"value":1}"#.to_string()]
        );
    }

    #[test]
    fn horizontal64_toggle_addresses_the_cross_preset_slice() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
            "activeGroup": 2,
            "activeChannel": 3,
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        engine.set_view_mode(ViewMode::Horizontal64);
        assert_eq!(engine.toggle_cell(4, 6), Some(CellValue::Active));
        // row addresses the preset, the active channel is fixed
        assert_eq!(engine.store().get(2, 4, 3, 6), CellValue::Active);
        assert_eq!(
            handle.sent_texts(),
            vec![r#"{"type":"64step","row":4,"col":6,"value":1}"#.to_string()]
        );
    }

    #[test]
    fn edits_before_any_snapshot_are_refused() {
        let (mut engine, handle) = engine_with_script(|h| h.accept_next_open());
        engine.pump();
        handle.clear_sent();

        assert_eq!(engine.toggle_cell(0, 0), None);
        assert!(handle.sent_texts().is_empty());
    }

    #[test]
    fn snapshot_wins_over_pending_local_edits() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        // optimistic local edit, unacknowledged
        engine.toggle_cell(0, 0);
        assert_eq!(engine.store().get(0, 0, 0, 0), CellValue::Active);

        let mut authoritative = blank_matrix();
        authoritative[5][5][5][5] = CellValue::AlwaysActive;
        handle.push_text(
            &serde_json::json!({
                "type": "cave_data",
                "caveArray": authoritative,
                "bpm": 90,
                "activeGroup": 3,
            })
            .to_string(),
        );
        engine.pump();

        assert_eq!(engine.store().get(0, 0, 0, 0), CellValue::Off);
        assert_eq!(engine.store().get(5, 5, 5, 5), CellValue::AlwaysActive);
        assert_eq!(engine.bpm(), 90);
        assert_eq!(engine.cursor().group(), 3);
    }

    #[test]
    fn inbound_bpm_retunes_the_clock() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);
        assert!(engine.is_playing());

        handle.push_text(r#"{"type":"bpm","bpm":140}"#);
        let notes = engine.pump();

        assert_eq!(engine.bpm(), 140);
        assert!(notes.contains(&Notification::TempoChanged(140)));
        // subsequent ticks now land at 60000 / 140 / 4 ~= 107.14ms
        let interval = clock::tick_interval(engine.bpm());
        assert!(interval > Duration::from_micros(107_100));
        assert!(interval < Duration::from_micros(107_200));
    }

    #[test]
    fn step_sync_overrides_the_local_playhead() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        handle.push_text(r#"{"type":"step_sync","step":5}"#);
        let notes = engine.pump();
        assert_eq!(engine.current_step(), 5);
        assert!(notes.contains(&Notification::StepChanged(5)));

        // out-of-range playhead pushes are dropped
        handle.push_text(r#"{"type":"step_sync","step":12}"#);
        engine.pump();
        assert_eq!(engine.current_step(), 5);
    }

    #[test]
    fn device_mute_uses_the_inverted_wire_convention() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        handle.push_text(r#"{"type":"mute","channel":2,"value":0}"#);
        engine.pump();
        assert!(engine.store().is_muted(2));

        handle.push_text(r#"{"type":"mute","channel":2,"value":1}"#);
        engine.pump();
        assert!(!engine.store().is_muted(2));
    }

    #[test]
    fn local_mute_toggle_reports_and_sends() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        assert!(engine.toggle_mute(4));
        assert!(!engine.toggle_mute(4));
        assert_eq!(
            handle.sent_texts(),
            vec![
                r#"{"type":"mute","channel":4,"value":0}"#.to_string(),
                r#"{"type":"mute","channel":4,"value":1}"#.to_string(),
            ]
        );
    }

    #[test]
    fn navigation_wraps_and_emits_the_intent() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        engine.navigate(Axis::Group, -1);
        assert_eq!(engine.cursor().group(), 7);
        assert_eq!(
            handle.sent_texts(),
            vec![r#"{"type":"updownPressed","segment":"group","direction":-1}"#.to_string()]
        );
    }

    #[test]
    fn device_cursor_pushes_apply_and_invalid_ones_drop() {
        let snapshot = serde_json::json!({
            "type": "cave_data",
            "caveArray": blank_matrix(),
        });
        let (mut engine, handle, _) = live_engine_with_snapshot(snapshot);

        handle.push_text(r#"{"type":"active_group_value","value":6}"#);
        engine.pump();
        assert_eq!(engine.cursor().group(), 6);

        handle.push_text(r#"{"type":"active_preset_value","value":8}"#);
        engine.pump();
        assert_eq!(engine.cursor().preset(), 0);
    }

    #[test]
    fn tempo_stays_clamped_under_any_cumulative_delta() {
        let (mut engine, _handle) = engine_with_script(|h| h.accept_next_open());
        engine.pump();

        engine.set_tempo(-10_000);
        assert_eq!(engine.bpm(), MIN_BPM);
        engine.set_tempo(10_000);
        assert_eq!(engine.bpm(), MAX_BPM);
        for _ in 0..50 {
            engine.set_tempo(25);
        }
        assert_eq!(engine.bpm(), MAX_BPM);
    }

    #[test]
    fn exhausted_reconnects_fall_back_to_a_synthetic_pattern() {
        let (mut engine, handle) = engine_with_script(|h| h.refuse_opens(4));
        drive_to_demo(&mut engine);

        assert!(engine.has_pattern());
        assert!(engine.is_playing());
        assert_eq!(engine.store().matrix(), &demo::generate());

        // demo edits mutate locally and send nothing
        handle.clear_sent();
        let value = engine.toggle_cell(0, 1);
        assert_eq!(value, Some(demo::value(0, 0, 0, 1).cycled()));
        assert!(handle.sent_texts().is_empty());
    }

    #[test]
    fn demo_playhead_advances_on_its_own() {
        let (mut engine, _handle) = engine_with_script(|h| h.refuse_opens(4));
        drive_to_demo(&mut engine);

        // default tempo: one tick every 125ms
        thread::sleep(Duration::from_millis(400));
        let notes = engine.pump();
        assert!(notes
            .iter()
            .any(|note| matches!(note, Notification::StepChanged(_))));
        assert!(engine.current_step() > 0);
    }

    #[test]
    fn leaving_demo_discards_demo_state_until_a_snapshot_lands() {
        let (mut engine, handle) = engine_with_script(|h| h.refuse_opens(4));
        drive_to_demo(&mut engine);
        engine.toggle_mute(1);

        handle.accept_next_open();
        engine.reconnect();
        let notes = engine.pump();

        assert_eq!(engine.link_state(), LinkState::Live);
        assert!(notes.contains(&Notification::ConnectivityChanged(LinkState::Live)));
        assert!(!engine.has_pattern());
        assert!(!engine.is_playing());
        assert_eq!(engine.store().matrix(), &blank_matrix());
        assert!(!engine.store().is_muted(1));
    }

    #[test]
    fn snapshot_arrival_goes_live_with_handshake_first() {
        let (mut engine, handle) = engine_with_script(|h| h.accept_next_open());
        let notes = engine.pump();

        assert!(notes.contains(&Notification::ConnectivityChanged(LinkState::Live)));
        assert_eq!(
            handle.sent_texts(),
            vec![
                r#"{"type":"socket_ready_send_default_pattern"}"#.to_string(),
                r#"{"type":"get_actions"}"#.to_string(),
            ]
        );

        assert!(engine.request_presets());
        assert_eq!(
            handle.sent_texts().last().map(String::as_str),
            Some(r#"{"type":"getPresetsAll"}"#)
        );
    }
}
