//! Raw UPER message frames and the bit-decoder seam.
//!
//! Responsibilities:
//! - Define the field layout the ASN.1 decoder hands back for SPaT and BSM
//! - Wrap the decoder call and reject empty input, decoder failures,
//!   and frames whose kind disagrees with the classified tag

use crate::types::{MsgKind, Result, V2xError};

/// Number of vehicle phases carried in a SPaT frame.
pub const MAX_PHASES: usize = 8;

// ---------------------------------------------------------------------------
// Frame types
// ---------------------------------------------------------------------------

/// Per-phase timing and state as decoded from a SPaT movement.
///
/// Times are tenths of a second since the top of the current UTC hour.
/// 36001 means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseStateFrame {
    pub curr_state: u8,
    pub start_time: i32,
    pub min_end_time: i32,
    pub max_end_time: i32,
}

/// Decoded SPaT intersection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpatFrame {
    pub regional_id: u16,
    pub intersection_id: u16,
    pub msg_cnt: u8,
    pub minute_of_year: u32,
    /// Milliseconds within the minute (0-59999)
    pub ms_of_minute: u16,
    /// 16-bit intersection status object
    pub status: u16,
    /// Bit `i` set means phase `i + 1` is permitted
    pub permitted_phases: u8,
    pub phase_state: [PhaseStateFrame; MAX_PHASES],
}

impl SpatFrame {
    /// True if phase `phase_no` (1-based) is in the permitted set.
    pub fn is_permitted(&self, phase_no: usize) -> bool {
        (1..=MAX_PHASES).contains(&phase_no) && (self.permitted_phases >> (phase_no - 1)) & 1 == 1
    }
}

/// Decoded BSM core data in raw J2735 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BsmFrame {
    pub id: u32,
    /// Milliseconds within the minute
    pub sec_mark: u16,
    /// 1/10 micro-degree
    pub latitude: i32,
    /// 1/10 micro-degree
    pub longitude: i32,
    /// Decimeters
    pub elevation: i32,
    /// 0.02 m/s units
    pub speed: u16,
    /// 0.0125 degree units
    pub heading: u16,
    pub length_cm: u16,
    pub width_cm: u16,
}

/// A decoded message frame, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Spat(SpatFrame),
    Bsm(BsmFrame),
}

impl Frame {
    pub fn kind(&self) -> MsgKind {
        match self {
            Frame::Spat(_) => MsgKind::Spat,
            Frame::Bsm(_) => MsgKind::Bsm,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder seam
// ---------------------------------------------------------------------------

/// ASN.1 UPER message-frame decoder.
pub trait BitDecoder {
    /// Decode one message frame. `None` if the bytes are rejected.
    fn decode(&self, bytes: &[u8]) -> Option<Frame>;
}

impl<T: BitDecoder + ?Sized> BitDecoder for &T {
    fn decode(&self, bytes: &[u8]) -> Option<Frame> {
        (**self).decode(bytes)
    }
}

impl<T: BitDecoder + ?Sized> BitDecoder for Box<T> {
    fn decode(&self, bytes: &[u8]) -> Option<Frame> {
        (**self).decode(bytes)
    }
}

/// Run the bit decoder and check the result against the classified kind.
pub fn decode_frame<D: BitDecoder + ?Sized>(
    decoder: &D,
    bytes: &[u8],
    expected: MsgKind,
) -> Result<Frame> {
    if bytes.is_empty() {
        return Err(V2xError::DecodeFailed("empty payload".into()));
    }

    let frame = decoder
        .decode(bytes)
        .ok_or_else(|| V2xError::DecodeFailed(format!("decoder rejected {} bytes", bytes.len())))?;

    if frame.kind() != expected {
        return Err(V2xError::KindMismatch {
            expected,
            actual: frame.kind(),
        });
    }

    Ok(frame)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
