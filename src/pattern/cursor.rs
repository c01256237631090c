//! Navigation cursor - the active (group, preset, channel) selection and
//! the view mode that maps 2-D grid edits onto the 4-D matrix.
use crate::error::PatternError;

const AXIS_LEN: i32 = 8;

/// The three navigable addressing axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Group,
    Preset,
    Channel,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::Group => "group",
            Axis::Preset => "preset",
            Axis::Channel => "channel",
        }
    }
}

/// Which 2-D slice of the matrix (row, col) edits address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Channels x steps of the active preset.
    #[default]
    Vertical,
    /// Same slice, landscape layout.
    Horizontal8x8,
    /// All presets of the active channel; row is the preset index.
    Horizontal64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationCursor {
    group: usize,
    preset: usize,
    channel: usize,
    view_mode: ViewMode,
}

impl NavigationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self) -> usize {
        self.group
    }

    pub fn preset(&self) -> usize {
        self.preset
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn index(&self, axis: Axis) -> usize {
        match axis {
            Axis::Group => self.group,
            Axis::Preset => self.preset,
            Axis::Channel => self.channel,
        }
    }

    /// Step one axis by +1 or -1, wrapping symmetrically in both
    /// directions. One modular formula covers the whole contract.
    pub fn move_axis(&mut self, axis: Axis, direction: i8) -> usize {
        let current = self.index(axis) as i32;
        let next = ((current + i32::from(direction) + AXIS_LEN) % AXIS_LEN) as usize;
        self.store(axis, next);
        next
    }

    /// Absolute set, used when the device pushes an authoritative index.
    pub fn set_axis(&mut self, axis: Axis, index: usize) -> Result<(), PatternError> {
        if index >= AXIS_LEN as usize {
            return Err(PatternError::IndexOutOfRange {
                axis: axis.name(),
                index,
            });
        }
        self.store(axis, index);
        Ok(())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    /// Resolve a (row, col) grid edit to full matrix coordinates for the
    /// current view mode.
    pub fn cell_coords(&self, row: usize, col: usize) -> (usize, usize, usize, usize) {
        match self.view_mode {
            ViewMode::Vertical | ViewMode::Horizontal8x8 => (self.group, self.preset, row, col),
            ViewMode::Horizontal64 => (self.group, row, self.channel, col),
        }
    }

    fn store(&mut self, axis: Axis, index: usize) {
        match axis {
            Axis::Group => self.group = index,
            Axis::Preset => self.preset = index,
            Axis::Channel => self.channel = index,
        }
    }
}
