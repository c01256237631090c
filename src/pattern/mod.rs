//! Pattern store - the canonical 4-D cell matrix, mute vector and swing
//! table. Single writable owner of all pattern state; every other
//! component holds only indices into it.
use serde::{Deserialize, Serialize};

use crate::error::PatternError;

pub mod cursor;

pub const GROUPS: usize = 8;
pub const PRESETS: usize = 8;
pub const CHANNELS: usize = 8;
pub const STEPS: usize = 8;

/// One slot of the pattern matrix. The wire carries these as 0, 1 and 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CellValue {
    #[default]
    Off,
    Active,
    AlwaysActive,
}

impl CellValue {
    /// The edit primitive behind every tap: Off -> Active ->
    /// AlwaysActive -> Off.
    pub fn cycled(self) -> Self {
        match self {
            CellValue::Off => CellValue::Active,
            CellValue::Active => CellValue::AlwaysActive,
            CellValue::AlwaysActive => CellValue::Off,
        }
    }
}

impl TryFrom<u8> for CellValue {
    type Error = PatternError;

    fn try_from(raw: u8) -> Result<Self, PatternError> {
        match raw {
            0 => Ok(CellValue::Off),
            1 => Ok(CellValue::Active),
            9 => Ok(CellValue::AlwaysActive),
            other => Err(PatternError::InvalidCellValue(other)),
        }
    }
}

impl From<CellValue> for u8 {
    fn from(value: CellValue) -> u8 {
        match value {
            CellValue::Off => 0,
            CellValue::Active => 1,
            CellValue::AlwaysActive => 9,
        }
    }
}

/// Full pattern snapshot, indexed `[group][preset][channel][step]`.
pub type CaveArray = [[[[CellValue; STEPS]; CHANNELS]; PRESETS]; GROUPS];

/// Whether a channel's swing is driven by one global offset or by
/// independent per-step values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwingMode {
    #[default]
    Global,
    PerStep,
}

/// Named swing templates mirrored from the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingTemplate {
    Straight,
    EighthSwing,
    Heavy,
    Triplet,
    Sixteenth,
    PushPull,
    Accelerando,
    Ritardando,
}

impl SwingTemplate {
    pub const ALL: [SwingTemplate; 8] = [
        SwingTemplate::Straight,
        SwingTemplate::EighthSwing,
        SwingTemplate::Heavy,
        SwingTemplate::Triplet,
        SwingTemplate::Sixteenth,
        SwingTemplate::PushPull,
        SwingTemplate::Accelerando,
        SwingTemplate::Ritardando,
    ];

    /// Per-step timing offsets in percent.
    pub fn offsets(self) -> [i8; STEPS] {
        match self {
            SwingTemplate::Straight => [0, 0, 0, 0, 0, 0, 0, 0],
            SwingTemplate::EighthSwing => [0, 15, 0, 15, 0, 15, 0, 15],
            SwingTemplate::Heavy => [0, 25, 0, 25, 0, 25, 0, 25],
            SwingTemplate::Triplet => [0, 10, 0, 10, 0, 10, 0, 10],
            SwingTemplate::Sixteenth => [0, 0, 15, 0, 0, 15, 0, 0],
            SwingTemplate::PushPull => [10, -10, 10, -10, 10, -10, 10, -10],
            SwingTemplate::Accelerando => [0, 5, 10, 15, 20, 15, 10, 5],
            SwingTemplate::Ritardando => [20, 15, 10, 5, 0, -5, -10, -15],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SwingTemplate::Straight => "Straight",
            SwingTemplate::EighthSwing => "8th Swing",
            SwingTemplate::Heavy => "Heavy",
            SwingTemplate::Triplet => "Triplet",
            SwingTemplate::Sixteenth => "16th",
            SwingTemplate::PushPull => "Push-Pull",
            SwingTemplate::Accelerando => "Accelerando",
            SwingTemplate::Ritardando => "Ritardando",
        }
    }
}

/// Canonical session pattern state.
///
/// Coordinates are a programming contract: callers index with values in
/// `[0,8)` and out-of-range access panics. Only cell *values* are a
/// runtime case, validated through [`CellValue::try_from`].
pub struct PatternStore {
    cells: Box<CaveArray>,
    mutes: [bool; CHANNELS],
    swing_offsets: [[i8; STEPS]; CHANNELS],
    swing_modes: [SwingMode; CHANNELS],
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            cells: Box::new(blank_matrix()),
            mutes: [false; CHANNELS],
            swing_offsets: [[0; STEPS]; CHANNELS],
            swing_modes: [SwingMode::Global; CHANNELS],
        }
    }

    pub fn get(&self, group: usize, preset: usize, channel: usize, step: usize) -> CellValue {
        self.cells[group][preset][channel][step]
    }

    /// Store a raw wire value at one coordinate. Anything outside
    /// {0, 1, 9} fails with `InvalidCellValue`.
    pub fn set_cell(
        &mut self,
        group: usize,
        preset: usize,
        channel: usize,
        step: usize,
        raw: u8,
    ) -> Result<CellValue, PatternError> {
        let value = CellValue::try_from(raw)?;
        self.cells[group][preset][channel][step] = value;
        Ok(value)
    }

    /// Advance one cell through the three-state cycle and return the new
    /// value.
    pub fn cycle_cell(
        &mut self,
        group: usize,
        preset: usize,
        channel: usize,
        step: usize,
    ) -> CellValue {
        let next = self.cells[group][preset][channel][step].cycled();
        self.cells[group][preset][channel][step] = next;
        next
    }

    /// Wholesale snapshot replacement. Used only when an authoritative
    /// full pattern arrives; any unacknowledged local edits are lost.
    pub fn replace_all(&mut self, matrix: CaveArray) {
        *self.cells = matrix;
    }

    pub fn matrix(&self) -> &CaveArray {
        &self.cells
    }

    pub fn set_mute(&mut self, channel: usize, muted: bool) {
        self.mutes[channel] = muted;
    }

    pub fn is_muted(&self, channel: usize) -> bool {
        self.mutes[channel]
    }

    pub fn mute_vector(&self) -> [bool; CHANNELS] {
        self.mutes
    }

    pub fn swing_mode(&self, channel: usize) -> SwingMode {
        self.swing_modes[channel]
    }

    pub fn set_swing_mode(&mut self, channel: usize, mode: SwingMode) {
        self.swing_modes[channel] = mode;
    }

    pub fn swing_offsets(&self, channel: usize) -> [i8; STEPS] {
        self.swing_offsets[channel]
    }

    /// Broadcast one offset to all steps of a channel and switch it to
    /// global drive.
    pub fn set_swing_global(&mut self, channel: usize, percent: i8) {
        self.swing_offsets[channel] = [percent; STEPS];
        self.swing_modes[channel] = SwingMode::Global;
    }

    /// Set a single step offset and switch the channel to per-step drive.
    pub fn set_swing_step(&mut self, channel: usize, step: usize, percent: i8) {
        self.swing_offsets[channel][step] = percent;
        self.swing_modes[channel] = SwingMode::PerStep;
    }

    pub fn apply_swing_template(&mut self, channel: usize, template: SwingTemplate) {
        self.swing_offsets[channel] = template.offsets();
        self.swing_modes[channel] = SwingMode::PerStep;
    }

    /// Reset to a blank session: all cells off, all channels audible,
    /// swing zeroed. Used when demo-driven state is discarded.
    pub fn clear(&mut self) {
        *self.cells = blank_matrix();
        self.mutes = [false; CHANNELS];
        self.swing_offsets = [[0; STEPS]; CHANNELS];
        self.swing_modes = [SwingMode::Global; CHANNELS];
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn blank_matrix() -> CaveArray {
    [[[[CellValue::Off; STEPS]; CHANNELS]; PRESETS]; GROUPS]
}
