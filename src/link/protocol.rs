//! Wire protocol - typed messages exchanged with the device.
//!
//! Text frames carry flat JSON records tagged by a `type` field. Outbound
//! messages serialize from [`ClientMessage`]; inbound text decodes into
//! [`DeviceMessage`] in two steps (dispatch on the tag, then deserialize
//! the payload) so unknown tags stay forward-compatible instead of
//! failing the session.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolDecodeError;
use crate::pattern::cursor::Axis;
use crate::pattern::CaveArray;

/// Navigation segment names as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Group,
    Preset,
    Channel,
}

impl From<Axis> for Segment {
    fn from(axis: Axis) -> Segment {
        match axis {
            Axis::Group => Segment::Group,
            Axis::Preset => Segment::Preset,
            Axis::Channel => Segment::Channel,
        }
    }
}

/// Client -> device messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Handshake: ask the device to push its current snapshot.
    #[serde(rename = "socket_ready_send_default_pattern")]
    SocketReadySendDefaultPattern,
    /// Ask the device for its stored automation/action list.
    #[serde(rename = "get_actions")]
    GetActions,
    /// Ask the device for all saved preset slots.
    #[serde(rename = "getPresetsAll")]
    GetPresetsAll,
    /// Single-cell edit in the preset-local 2-D slice.
    #[serde(rename = "8x8step")]
    Step8x8 { row: u8, col: u8, value: u8 },
    /// Single-cell edit in the cross-preset slice; row is the preset.
    #[serde(rename = "64step")]
    Step64 { row: u8, col: u8, value: u8 },
    /// Mute toggle for one channel. 1 = audible, 0 = muted.
    #[serde(rename = "mute")]
    Mute { channel: u8, value: u8 },
    /// Navigation intent.
    #[serde(rename = "updownPressed")]
    UpDownPressed { segment: Segment, direction: i8 },
    /// Tempo change.
    #[serde(rename = "bpm")]
    Bpm { bpm: u16 },
}

pub fn encode(message: &ClientMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Device -> client messages, decoded into a closed set of cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Authoritative full snapshot: matrix, tempo and cursor.
    FullPattern(FullPattern),
    /// Playhead override, bypasses the local step clock.
    StepSync { step: u8 },
    Bpm { bpm: u16 },
    Mute { channel: u8, value: u8 },
    ActiveGroup { value: u8 },
    ActivePreset { value: u8 },
    /// Unknown `type` tag; dropped without failing the session.
    Ignored,
}

fn default_bpm() -> u16 {
    120
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FullPattern {
    #[serde(rename = "caveArray", alias = "patternArray")]
    pub cave: Box<CaveArray>,
    #[serde(default = "default_bpm")]
    pub bpm: u16,
    #[serde(default, rename = "activeGroup")]
    pub active_group: u8,
    #[serde(default, rename = "activePreset")]
    pub active_preset: u8,
    #[serde(default, rename = "activeChannel")]
    pub active_channel: u8,
}

#[derive(Deserialize)]
struct StepSyncPayload {
    step: u8,
}

#[derive(Deserialize)]
struct BpmPayload {
    bpm: u16,
}

#[derive(Deserialize)]
struct MutePayload {
    channel: u8,
    value: u8,
}

#[derive(Deserialize)]
struct ActiveValuePayload {
    value: u8,
}

pub fn decode(payload: &str) -> Result<DeviceMessage, ProtocolDecodeError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ProtocolDecodeError::new(format!("not valid JSON: {e}")))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolDecodeError::new("missing \"type\" field"))?
        .to_owned();

    match tag.as_str() {
        "cave_data" | "full_pattern" => {
            let full: FullPattern = payload_of(&tag, value)?;
            Ok(DeviceMessage::FullPattern(full))
        }
        "step_sync" => {
            let p: StepSyncPayload = payload_of(&tag, value)?;
            Ok(DeviceMessage::StepSync { step: p.step })
        }
        "bpm" => {
            let p: BpmPayload = payload_of(&tag, value)?;
            Ok(DeviceMessage::Bpm { bpm: p.bpm })
        }
        "mute" => {
            let p: MutePayload = payload_of(&tag, value)?;
            Ok(DeviceMessage::Mute {
                channel: p.channel,
                value: p.value,
            })
        }
        "active_group_value" => {
            let p: ActiveValuePayload = payload_of(&tag, value)?;
            Ok(DeviceMessage::ActiveGroup { value: p.value })
        }
        "active_preset_value" => {
            let p: ActiveValuePayload = payload_of(&tag, value)?;
            Ok(DeviceMessage::ActivePreset { value: p.value })
        }
        _ => Ok(DeviceMessage::Ignored),
    }
}

fn payload_of<T: serde::de::DeserializeOwned>(
    tag: &str,
    value: Value,
) -> Result<T, ProtocolDecodeError> {
    serde_json::from_value(value)
        .map_err(|e| ProtocolDecodeError::new(format!("bad \"{tag}\" payload: {e}")))
}
