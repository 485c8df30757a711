//! Translate tagged hex payloads into MAP, SPaT, and BSM documents.
//!
//! - MAP:  payload handed in memory to the geometry engine for its intersection ID
//! - SPaT: permitted phases with derived timing and coarse state
//! - BSM:  vehicle snapshot with J2735 units converted to SI / decimal degrees
//!
//! The bit-level ASN.1 decode is delegated to a `BitDecoder`.

use chrono::DateTime;

use crate::classify::{classify, strip_tag};
use crate::frame::{decode_frame, BitDecoder, BsmFrame, Frame, SpatFrame, MAX_PHASES};
use crate::geometry::{Geometry, MAP_NAME};
use crate::timing::phase_timing;
use crate::types::*;

const KPH_TO_MPS: f64 = 0.277778;

/// Vehicle type reported for every decoded BSM.
pub const DEFAULT_VEHICLE_TYPE: &str = "0";

// ---------------------------------------------------------------------------
// Unit conversions
// ---------------------------------------------------------------------------

/// 1/10 micro-degree to decimal degrees.
pub fn degrees_from_units(units: i32) -> f64 {
    units as f64 / 10_000_000.0
}

/// Decimeters to meters.
pub fn meters_from_decimeters(units: i32) -> f64 {
    units as f64 / 10.0
}

/// 0.02 m/s units to whole meters per second (via km/h).
pub fn speed_mps_from_units(units: u16) -> f64 {
    let kph = units as f64 * 0.02 * 3.6;
    (kph * KPH_TO_MPS).round()
}

/// 0.0125 degree units to whole degrees.
pub fn heading_from_units(units: u16) -> f64 {
    (units as f64 * 0.0125).round()
}

/// Human-readable UTC timestamp with millisecond precision.
pub fn verbose_timestamp(posix: f64) -> String {
    DateTime::from_timestamp_millis((posix * 1000.0) as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Per-type decoders
// ---------------------------------------------------------------------------

/// Decode an untagged MAP payload.
pub fn map_decoder<G: Geometry + ?Sized>(hex: &str, geometry: &G) -> Result<MapMessage> {
    // Reject malformed payloads before the geometry engine sees them
    let bytes = hex_to_bytes(hex)?;
    if bytes.is_empty() {
        return Err(V2xError::DecodeFailed("empty MAP payload".into()));
    }

    let map = geometry
        .load_map(MAP_NAME, hex)
        .ok_or_else(|| V2xError::DecodeFailed("geometry engine rejected MAP payload".into()))?;

    Ok(MapMessage {
        intersection_name: format!("{MAP_NAME}{}", map.intersection_id),
        map_payload: hex.to_string(),
        intersection_id: map.intersection_id,
        reference: Some(map),
    })
}

/// Decode an untagged SPaT payload.
pub fn spat_decoder<D: BitDecoder + ?Sized>(
    decoder: &D,
    hex: &str,
    now: f64,
) -> Result<SpatMessage> {
    let bytes = hex_to_bytes(hex)?;
    match decode_frame(decoder, &bytes, MsgKind::Spat)? {
        Frame::Spat(spat) => Ok(spat_from_frame(&spat, now)),
        other => Err(V2xError::KindMismatch {
            expected: MsgKind::Spat,
            actual: other.kind(),
        }),
    }
}

/// Decode an untagged BSM payload.
pub fn bsm_decoder<D: BitDecoder + ?Sized>(
    decoder: &D,
    hex: &str,
    now: f64,
) -> Result<BsmMessage> {
    let bytes = hex_to_bytes(hex)?;
    match decode_frame(decoder, &bytes, MsgKind::Bsm)? {
        Frame::Bsm(bsm) => Ok(BsmMessage {
            timestamp_verbose: verbose_timestamp(now),
            timestamp_posix: now,
            basic_vehicle: basic_vehicle_from_frame(&bsm),
        }),
        other => Err(V2xError::KindMismatch {
            expected: MsgKind::Bsm,
            actual: other.kind(),
        }),
    }
}

/// Build the SPaT document from a decoded frame.
pub fn spat_from_frame(frame: &SpatFrame, now: f64) -> SpatMessage {
    let phase_state = (1..=MAX_PHASES)
        .filter(|&phase_no| frame.is_permitted(phase_no))
        .map(|phase_no| {
            let raw = &frame.phase_state[phase_no - 1];
            let timing = phase_timing(
                frame.minute_of_year,
                frame.ms_of_minute,
                raw.start_time,
                raw.min_end_time,
                raw.max_end_time,
            );
            PhaseStateEntry {
                phase_no: phase_no as u8,
                start_time: timing.start,
                min_end_time: timing.min_end_remaining,
                max_end_time: timing.max_end_remaining,
                elapsed_time: timing.elapsed,
                curr_state: PhaseStatus::from_code(raw.curr_state),
            }
        })
        .collect();

    SpatMessage {
        timestamp_verbose: verbose_timestamp(now),
        timestamp_posix: now,
        spat: SpatBody {
            intersection_state: IntersectionState {
                regional_id: frame.regional_id,
                intersection_id: frame.intersection_id as u32,
            },
            msg_cnt: frame.msg_cnt,
            minute_of_year: frame.minute_of_year,
            ms_of_minute: frame.ms_of_minute,
            status: format!("{:016b}", frame.status),
            phase_state,
        },
    }
}

/// Build the vehicle snapshot from a decoded BSM frame.
pub fn basic_vehicle_from_frame(frame: &BsmFrame) -> BasicVehicle {
    BasicVehicle {
        temporary_id: frame.id,
        sec_mark_second: frame.sec_mark as f64 / 1000.0,
        speed_meter_per_second: speed_mps_from_units(frame.speed),
        heading_degree: heading_from_units(frame.heading),
        vehicle_type: DEFAULT_VEHICLE_TYPE.to_string(),
        position: VehiclePosition {
            latitude: degrees_from_units(frame.latitude),
            longitude: degrees_from_units(frame.longitude),
            elevation: meters_from_decimeters(frame.elevation),
        },
        size: VehicleSize {
            length_cm: frame.length_cm,
            width_cm: frame.width_cm,
        },
    }
}

// ---------------------------------------------------------------------------
// Main decode functions
// ---------------------------------------------------------------------------

/// Classify a tagged payload and decode it into a document.
pub fn decode<D, G>(payload: &str, decoder: &D, geometry: &G, now: f64) -> Result<Message>
where
    D: BitDecoder + ?Sized,
    G: Geometry + ?Sized,
{
    let body = strip_tag(payload);
    match classify(payload) {
        MsgKind::Map => map_decoder(body, geometry).map(Message::Map),
        MsgKind::Spat => spat_decoder(decoder, body, now).map(Message::Spat),
        MsgKind::Bsm => bsm_decoder(decoder, body, now).map(Message::Bsm),
        MsgKind::Unknown => Err(V2xError::UnknownTag(
            payload.chars().take(4).collect(),
        )),
    }
}

/// Decode straight to compact JSON. Failures are logged and produce no document.
pub fn decode_to_json<D, G>(payload: &str, decoder: &D, geometry: &G, now: f64) -> Option<String>
where
    D: BitDecoder + ?Sized,
    G: Geometry + ?Sized,
{
    match decode(payload, decoder, geometry, now).and_then(|msg| msg.to_json()) {
        Ok(json) => Some(json),
        Err(e) => {
            log::warn!("dropping payload: {e}");
            None
        }
    }
}

/// A bit decoder and geometry engine bundled for repeated decoding.
#[derive(Debug, Clone)]
pub struct MsgDecoder<D, G> {
    decoder: D,
    geometry: G,
}

impl<D: BitDecoder, G: Geometry> MsgDecoder<D, G> {
    pub fn new(decoder: D, geometry: G) -> Self {
        MsgDecoder { decoder, geometry }
    }

    pub fn decode(&self, payload: &str, now: f64) -> Result<Message> {
        decode(payload, &self.decoder, &self.geometry, now)
    }

    pub fn decode_to_json(&self, payload: &str, now: f64) -> Option<String> {
        decode_to_json(payload, &self.decoder, &self.geometry, now)
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PhaseStateFrame;
    use crate::geometry::{LaneResolution, MapGeometry};
    use crate::maps::DecodedMap;
    use crate::timing::UNKNOWN_TIME_MARK;

    struct Fixed(Option<Frame>);

    impl BitDecoder for Fixed {
        fn decode(&self, _bytes: &[u8]) -> Option<Frame> {
            self.0.clone()
        }
    }

    struct OneMap(u32);

    impl Geometry for OneMap {
        fn load_map(&self, name: &str, _payload: &str) -> Option<MapGeometry> {
            assert_eq!(name, MAP_NAME);
            Some(MapGeometry {
                intersection_id: self.0,
                ref_lat: 41.7,
                ref_lon: -87.98,
            })
        }

        fn resolve(&self, _map: &DecodedMap, _v: &BasicVehicle) -> Option<LaneResolution> {
            None
        }
    }

    fn sample_bsm() -> BsmFrame {
        BsmFrame {
            id: 1201,
            sec_mark: 45_300,
            latitude: 417_052_345,
            longitude: -879_889_012,
            elevation: 2_145,
            speed: 500, // 10 m/s
            heading: 7_211, // 90.1375 deg
            length_cm: 450,
            width_cm: 180,
        }
    }

    fn sample_spat() -> SpatFrame {
        let mut frame = SpatFrame {
            regional_id: 0,
            intersection_id: 2351,
            msg_cnt: 7,
            minute_of_year: 61,
            ms_of_minute: 40_000, // now = 100s into the hour
            status: 0,
            permitted_phases: 0b0010_0110, // phases 2, 3, 6
            ..Default::default()
        };
        frame.phase_state[1] = PhaseStateFrame {
            curr_state: 5,
            start_time: 900,
            min_end_time: 1_100,
            max_end_time: 1_300,
        };
        frame.phase_state[2] = PhaseStateFrame {
            curr_state: 3,
            start_time: UNKNOWN_TIME_MARK,
            min_end_time: 1_500,
            max_end_time: 1_800,
        };
        frame.phase_state[5] = PhaseStateFrame {
            curr_state: 1, // not mapped
            start_time: 0,
            min_end_time: 0,
            max_end_time: 0,
        };
        // Not permitted, must not appear
        frame.phase_state[0].curr_state = 6;
        frame
    }

    #[test]
    fn test_unit_conversions() {
        assert!((degrees_from_units(417_052_345) - 41.7052345).abs() < 1e-9);
        assert!((meters_from_decimeters(2_145) - 214.5).abs() < 1e-9);
        assert_eq!(speed_mps_from_units(500), 10.0);
        assert_eq!(speed_mps_from_units(0), 0.0);
        assert_eq!(heading_from_units(7_211), 90.0);
        assert_eq!(heading_from_units(28_799), 360.0);
    }

    #[test]
    fn test_verbose_timestamp() {
        assert_eq!(verbose_timestamp(0.0), "1970-01-01 00:00:00.000");
        assert_eq!(verbose_timestamp(1_700_000_000.25), "2023-11-14 22:13:20.250");
    }

    #[test]
    fn test_bsm_decoder() {
        let dec = Fixed(Some(Frame::Bsm(sample_bsm())));
        let msg = bsm_decoder(&dec, "25004000", 10.0).unwrap();
        let bv = &msg.basic_vehicle;
        assert_eq!(bv.temporary_id, 1201);
        assert!((bv.sec_mark_second - 45.3).abs() < 1e-9);
        assert_eq!(bv.speed_meter_per_second, 10.0);
        assert_eq!(bv.heading_degree, 90.0);
        assert_eq!(bv.vehicle_type, "0");
        assert_eq!(bv.size.length_cm, 450);
        assert_eq!(bv.size.width_cm, 180);
        assert!((bv.position.longitude + 87.9889012).abs() < 1e-9);
    }

    #[test]
    fn test_bsm_json_shape() {
        let dec = Fixed(Some(Frame::Bsm(sample_bsm())));
        let json = decode_to_json("001425004000", &dec, &OneMap(1), 0.0).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["MsgType"], "BSM");
        assert_eq!(v["BasicVehicle"]["temporaryID"], 1201);
        assert_eq!(v["BasicVehicle"]["type"], "0");
        assert_eq!(v["BasicVehicle"]["position"]["elevation_Meter"], 214.5);
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_spat_phase_selection_and_states() {
        let dec = Fixed(Some(Frame::Spat(sample_spat())));
        let msg = spat_decoder(&dec, "455fbd01", 5.0).unwrap();
        let phases = &msg.spat.phase_state;

        let numbers: Vec<u8> = phases.iter().map(|p| p.phase_no).collect();
        assert_eq!(numbers, vec![2, 3, 6]);

        assert_eq!(phases[0].curr_state, Some(PhaseStatus::ProtectedGreen));
        assert!((phases[0].min_end_time - 10.001).abs() < 1e-9);
        assert!((phases[0].elapsed_time - 10.0).abs() < 1e-9);

        assert_eq!(phases[1].curr_state, Some(PhaseStatus::Red));
        assert_eq!(phases[1].start_time, -1.0);
        assert_eq!(phases[1].elapsed_time, -1.0);

        assert_eq!(phases[2].curr_state, None);
    }

    #[test]
    fn test_spat_json_shape() {
        let dec = Fixed(Some(Frame::Spat(sample_spat())));
        let json = decode_to_json("0013455fbd01", &dec, &OneMap(1), 5.0).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["MsgType"], "SPaT");
        assert_eq!(v["Spat"]["intersectionState"]["intersectionID"], 2351);
        assert_eq!(v["Spat"]["msgCnt"], 7);
        assert_eq!(v["Spat"]["status"], "0000000000000000");
        assert_eq!(v["Spat"]["phaseState"][0]["currState"], "protected_green");
        // Unmapped state code omits the field
        assert!(v["Spat"]["phaseState"][2].get("currState").is_none());
    }

    #[test]
    fn test_map_decoder() {
        let msg = map_decoder("38013020", &OneMap(2351)).unwrap();
        assert_eq!(msg.intersection_id, 2351);
        assert_eq!(msg.intersection_name, "Map2351");
        assert_eq!(msg.map_payload, "38013020");
        assert_eq!(msg.reference.map(|r| r.ref_lat), Some(41.7));
    }

    #[test]
    fn test_map_decoder_rejects_bad_hex() {
        assert!(matches!(
            map_decoder("38zz", &OneMap(1)),
            Err(V2xError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_decode_dispatch() {
        let dec = Fixed(Some(Frame::Bsm(sample_bsm())));
        let geo = OneMap(12);
        assert_eq!(
            decode("0012ab", &dec, &geo, 0.0).unwrap().kind(),
            MsgKind::Map
        );
        assert_eq!(
            decode("0014ab", &dec, &geo, 0.0).unwrap().kind(),
            MsgKind::Bsm
        );
    }

    #[test]
    fn test_unknown_tag_not_decoded() {
        // The decoder would accept this; Unknown must stop before it is called
        let dec = Fixed(Some(Frame::Bsm(sample_bsm())));
        let err = decode("9999ab", &dec, &OneMap(1), 0.0).unwrap_err();
        assert!(matches!(err, V2xError::UnknownTag(ref t) if t == "9999"));
    }

    #[test]
    fn test_kind_mismatch_produces_no_document() {
        let dec = Fixed(Some(Frame::Bsm(sample_bsm())));
        assert!(decode_to_json("0013ab", &dec, &OneMap(1), 0.0).is_none());
    }

    #[test]
    fn test_decoder_rejection_produces_no_document() {
        let dec = Fixed(None);
        assert!(decode_to_json("0014ab", &dec, &OneMap(1), 0.0).is_none());
        assert!(decode_to_json("0014", &dec, &OneMap(1), 0.0).is_none());
    }

    #[test]
    fn test_msg_decoder_bundles_collaborators() {
        let md = MsgDecoder::new(Fixed(Some(Frame::Bsm(sample_bsm()))), OneMap(77));
        assert_eq!(md.decode("0014ab", 0.0).unwrap().kind(), MsgKind::Bsm);
        let json = md.decode_to_json("0012ab", 0.0).unwrap();
        assert!(json.contains("\"IntersectionID\":77"));
        assert!(md.decode_to_json("0015ab", 0.0).is_none());
    }
}
