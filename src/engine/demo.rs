//! Demo simulator - deterministic synthetic pattern used when no device
//! is reachable.
use crate::pattern::{blank_matrix, CaveArray, CellValue, CHANNELS, GROUPS, PRESETS, STEPS};

/// Synthetic value for one coordinate: `(g + p + c + s) % 3`, with 2
/// folded back to off. Pure, so the demo pattern is reproducible and
/// restartable.
pub fn value(group: usize, preset: usize, channel: usize, step: usize) -> CellValue {
    match (group + preset + channel + step) % 3 {
        1 => CellValue::Active,
        _ => CellValue::Off,
    }
}

/// Build the full synthetic matrix.
pub fn generate() -> CaveArray {
    let mut cave = blank_matrix();
    for (g, presets) in cave.iter_mut().enumerate() {
        for (p, channels) in presets.iter_mut().enumerate() {
            for (c, steps) in channels.iter_mut().enumerate() {
                for (s, cell) in steps.iter_mut().enumerate() {
                    *cell = value(g, p, c, s);
                }
            }
        }
    }
    cave
}
