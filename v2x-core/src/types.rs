//! Shared types, error enum, and decoded message documents for v2x-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::MapGeometry;

/// All errors produced by v2x-core.
#[derive(Debug, Error)]
pub enum V2xError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("unrecognized message type tag: {0:?}")]
    UnknownTag(String),
    #[error("frame decode failed: {0}")]
    DecodeFailed(String),
    #[error("decoded frame is {actual}, expected {expected}")]
    KindMismatch { expected: MsgKind, actual: MsgKind },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("enrichment failed: {0}")]
    Enrich(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, V2xError>;

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// Literal type tag prepended to MAP payloads by the transport.
pub const MAP_TAG: &str = "0012";
/// Literal type tag prepended to SPaT payloads by the transport.
pub const SPAT_TAG: &str = "0013";
/// Literal type tag prepended to BSM payloads by the transport.
pub const BSM_TAG: &str = "0014";

/// Message kind, fixed once at the classification boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgKind {
    Map,
    Spat,
    Bsm,
    Unknown,
}

impl MsgKind {
    /// Wire tag for this kind. `None` for `Unknown`.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            MsgKind::Map => Some(MAP_TAG),
            MsgKind::Spat => Some(SPAT_TAG),
            MsgKind::Bsm => Some(BSM_TAG),
            MsgKind::Unknown => None,
        }
    }
}

impl std::fmt::Display for MsgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgKind::Map => write!(f, "MAP"),
            MsgKind::Spat => write!(f, "SPaT"),
            MsgKind::Bsm => write!(f, "BSM"),
            MsgKind::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes, two characters per byte.
///
/// A trailing odd character is dropped. Any non-hex character in the
/// consumed range is an error rather than a silent truncation.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    let hex = hex.trim();
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks_exact(2) {
        let (high, low) = match (hex_digit(chunk[0]), hex_digit(chunk[1])) {
            (Some(h), Some(l)) => (h, l),
            _ => {
                return Err(V2xError::InvalidHex(
                    String::from_utf8_lossy(chunk).into_owned(),
                ))
            }
        };
        bytes.push((high << 4) | low);
    }
    Ok(bytes)
}

/// Encode bytes as a lowercase hex string.
pub fn bytes_to_hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Signal phase status
// ---------------------------------------------------------------------------

/// Coarse signal phase state carried in SPaT and attached to vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Red,
    FlashingRed,
    ProtectedGreen,
    PermissiveGreen,
    PermissiveYellow,
    ProtectedYellow,
}

impl PhaseStatus {
    /// Map a J2735 movement phase state code. Codes outside 3..=8 have no status.
    pub fn from_code(code: u8) -> Option<PhaseStatus> {
        match code {
            3 => Some(PhaseStatus::Red),
            4 => Some(PhaseStatus::FlashingRed),
            5 => Some(PhaseStatus::ProtectedGreen),
            6 => Some(PhaseStatus::PermissiveGreen),
            7 => Some(PhaseStatus::PermissiveYellow),
            8 => Some(PhaseStatus::ProtectedYellow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Red => "red",
            PhaseStatus::FlashingRed => "flashing_red",
            PhaseStatus::ProtectedGreen => "protected_green",
            PhaseStatus::PermissiveGreen => "permissive_green",
            PhaseStatus::PermissiveYellow => "permissive_yellow",
            PhaseStatus::ProtectedYellow => "protected_yellow",
        }
    }

    /// Canonical movement state published to downstream dashboards.
    pub fn movement_state(&self) -> &'static str {
        match self {
            PhaseStatus::Red | PhaseStatus::FlashingRed => "stopAndRemain",
            PhaseStatus::PermissiveGreen => "permissiveMovementAllowed",
            PhaseStatus::ProtectedGreen => "protectedMovementAllowed",
            PhaseStatus::PermissiveYellow | PhaseStatus::ProtectedYellow => "yellow",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decoded message documents
// ---------------------------------------------------------------------------

/// Decoded MAP document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMessage {
    #[serde(rename = "IntersectionName")]
    pub intersection_name: String,
    #[serde(rename = "MapPayload")]
    pub map_payload: String,
    #[serde(rename = "IntersectionID")]
    pub intersection_id: u32,
    /// Reference point found while decoding. Not part of the document.
    #[serde(skip)]
    pub reference: Option<MapGeometry>,
}

/// Decoded SPaT document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatMessage {
    #[serde(rename = "Timestamp_verbose", default)]
    pub timestamp_verbose: String,
    #[serde(rename = "Timestamp_posix", default)]
    pub timestamp_posix: f64,
    #[serde(rename = "Spat")]
    pub spat: SpatBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatBody {
    pub intersection_state: IntersectionState,
    pub msg_cnt: u8,
    pub minute_of_year: u32,
    pub ms_of_minute: u16,
    pub status: String,
    #[serde(default)]
    pub phase_state: Vec<PhaseStateEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntersectionState {
    #[serde(rename = "regionalID")]
    pub regional_id: u16,
    #[serde(rename = "intersectionID")]
    pub intersection_id: u32,
}

/// One permitted phase in a SPaT document. Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStateEntry {
    pub phase_no: u8,
    pub start_time: f64,
    pub min_end_time: f64,
    pub max_end_time: f64,
    pub elapsed_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curr_state: Option<PhaseStatus>,
}

/// Decoded BSM document wrapping the vehicle snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BsmMessage {
    #[serde(rename = "Timestamp_verbose", default)]
    pub timestamp_verbose: String,
    #[serde(rename = "Timestamp_posix", default)]
    pub timestamp_posix: f64,
    #[serde(rename = "BasicVehicle")]
    pub basic_vehicle: BasicVehicle,
}

/// Vehicle snapshot in its canonical JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicVehicle {
    #[serde(rename = "temporaryID")]
    pub temporary_id: u32,
    #[serde(rename = "secMark_Second")]
    pub sec_mark_second: f64,
    #[serde(rename = "speed_MeterPerSecond")]
    pub speed_meter_per_second: f64,
    #[serde(rename = "heading_Degree")]
    pub heading_degree: f64,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub position: VehiclePosition,
    pub size: VehicleSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    #[serde(rename = "latitude_DecimalDegree")]
    pub latitude: f64,
    #[serde(rename = "longitude_DecimalDegree")]
    pub longitude: f64,
    #[serde(rename = "elevation_Meter")]
    pub elevation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleSize {
    pub length_cm: u16,
    pub width_cm: u16,
}

impl BasicVehicle {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<BasicVehicle> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Union of all decoded documents, tagged by `MsgType` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "MsgType")]
pub enum Message {
    #[serde(rename = "MAP")]
    Map(MapMessage),
    #[serde(rename = "SPaT")]
    Spat(SpatMessage),
    #[serde(rename = "BSM")]
    Bsm(BsmMessage),
}

impl Message {
    pub fn kind(&self) -> MsgKind {
        match self {
            Message::Map(_) => MsgKind::Map,
            Message::Spat(_) => MsgKind::Spat,
            Message::Bsm(_) => MsgKind::Bsm,
        }
    }

    /// Receive time stamped at decode. MAP documents carry none.
    pub fn timestamp_posix(&self) -> Option<f64> {
        match self {
            Message::Map(_) => None,
            Message::Spat(m) => Some(m.timestamp_posix),
            Message::Bsm(m) => Some(m.timestamp_posix),
        }
    }

    /// Compact JSON rendering of the document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Message> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_bytes() {
        assert_eq!(hex_to_bytes("0014aB").unwrap(), vec![0x00, 0x14, 0xAB]);
        assert_eq!(hex_to_bytes("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_hex_odd_trailing_dropped() {
        assert_eq!(hex_to_bytes("00141").unwrap(), vec![0x00, 0x14]);
    }

    #[test]
    fn test_hex_invalid_chars() {
        assert!(matches!(hex_to_bytes("00ZZ"), Err(V2xError::InvalidHex(_))));
    }

    #[test]
    fn test_hex_reencode_even_input() {
        let samples = [
            "001425004000009670D465F99BB7113E3626083F7FFFFFFFF0F312C0FDFA1FA1007FFF8000962580",
            "00136b455fbd01838cc00028055fbd4a920b",
        ];
        for s in samples {
            let bytes = hex_to_bytes(s).unwrap();
            assert_eq!(bytes_to_hex(&bytes), s.to_ascii_lowercase());
        }
    }

    #[test]
    fn test_phase_status_codes() {
        assert_eq!(PhaseStatus::from_code(3), Some(PhaseStatus::Red));
        assert_eq!(PhaseStatus::from_code(5), Some(PhaseStatus::ProtectedGreen));
        assert_eq!(PhaseStatus::from_code(6), Some(PhaseStatus::PermissiveGreen));
        assert_eq!(PhaseStatus::from_code(8), Some(PhaseStatus::ProtectedYellow));
        assert_eq!(PhaseStatus::from_code(0), None);
        assert_eq!(PhaseStatus::from_code(9), None);
    }

    #[test]
    fn test_movement_state() {
        assert_eq!(PhaseStatus::FlashingRed.movement_state(), "stopAndRemain");
        assert_eq!(
            PhaseStatus::ProtectedGreen.movement_state(),
            "protectedMovementAllowed"
        );
        assert_eq!(PhaseStatus::PermissiveYellow.movement_state(), "yellow");
    }

    #[test]
    fn test_message_tagged_by_msg_type() {
        let msg = Message::Map(MapMessage {
            intersection_name: "Map2351".into(),
            map_payload: "3801".into(),
            intersection_id: 2351,
            reference: None,
        });
        let json = msg.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"MsgType":"MAP","IntersectionName":"Map2351","MapPayload":"3801","IntersectionID":2351}"#
        );
        assert_eq!(Message::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_unknown_msg_type_rejected() {
        assert!(Message::from_json(r#"{"MsgType":"SSM"}"#).is_err());
    }
}
