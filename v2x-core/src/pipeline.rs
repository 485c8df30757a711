//! One datagram in, documents out: locate → classify → decode → track → enrich.
//!
//! Each call to `process()` runs to completion before the next; the tracker
//! is owned exclusively by the pipeline.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::classify::{classify, locate_frame};
use crate::config::TrackerConfig;
use crate::decode::MsgDecoder;
use crate::frame::BitDecoder;
use crate::geometry::Geometry;
use crate::tracker::{TrackEvent, Tracker};
use crate::types::*;

/// Source of receive timestamps.
pub trait Clock {
    fn posix_seconds(&self) -> f64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn posix_seconds(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn posix_seconds(&self) -> f64 {
        (**self).posix_seconds()
    }
}

/// Result of processing one datagram.
#[derive(Debug, Clone)]
pub struct Processed {
    pub kind: MsgKind,
    /// Decoded document as compact JSON
    pub document: String,
    /// BSM with lane and signal fields merged in (BSMs only)
    pub enriched: Option<String>,
    pub events: Vec<TrackEvent>,
}

pub struct Pipeline<D, G, C> {
    decoder: MsgDecoder<D, G>,
    tracker: Tracker,
    clock: C,
    pub datagrams: u64,
    pub dropped: u64,
}

impl<D: BitDecoder, G: Geometry, C: Clock> Pipeline<D, G, C> {
    pub fn new(decoder: D, geometry: G, clock: C, config: &TrackerConfig) -> Self {
        Pipeline {
            decoder: MsgDecoder::new(decoder, geometry),
            tracker: Tracker::new(config),
            clock,
            datagrams: 0,
            dropped: 0,
        }
    }

    /// Process one received datagram.
    pub fn process(&mut self, datagram: &str) -> Result<Processed> {
        self.datagrams += 1;
        let result = self.process_inner(datagram);
        if let Err(e) = &result {
            self.dropped += 1;
            log::warn!("dropping datagram: {e}");
        }
        result
    }

    fn process_inner(&mut self, datagram: &str) -> Result<Processed> {
        let frame = locate_frame(datagram)
            .ok_or_else(|| V2xError::UnknownTag(datagram.chars().take(4).collect()))?;

        let kind = classify(frame);
        if kind == MsgKind::Unknown {
            return Err(V2xError::UnknownTag(frame.chars().take(4).collect()));
        }

        let now = self.clock.posix_seconds();
        let msg = self.decoder.decode(frame, now)?;
        let document = msg.to_json()?;
        let (enriched, events) = self.tracker.update(&msg, self.decoder.geometry(), now)?;

        Ok(Processed {
            kind,
            document,
            enriched,
            events,
        })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::frame::{BsmFrame, Frame};
    use crate::geometry::{LaneResolution, MapGeometry, MAP_NAME};
    use crate::maps::DecodedMap;

    const REF_LAT: f64 = 41.7000;
    const REF_LON: f64 = -87.9800;

    struct ManualClock(Cell<f64>);

    impl Clock for ManualClock {
        fn posix_seconds(&self) -> f64 {
            self.0.get()
        }
    }

    /// Reads the BSM frame straight from the payload:
    /// 4 bytes ID, 4 bytes latitude, 4 bytes longitude (big-endian).
    struct PackedBsm;

    impl BitDecoder for PackedBsm {
        fn decode(&self, bytes: &[u8]) -> Option<Frame> {
            if bytes.len() != 12 {
                return None;
            }
            let word = |i: usize| {
                let b: [u8; 4] = bytes[i..i + 4].try_into().ok()?;
                Some(i32::from_be_bytes(b))
            };
            Some(Frame::Bsm(BsmFrame {
                id: word(0)? as u32,
                latitude: word(4)?,
                longitude: word(8)?,
                ..Default::default()
            }))
        }
    }

    /// Any vehicle within the DSRC range can be placed on lane 1.
    struct AnyLane;

    impl Geometry for AnyLane {
        fn load_map(&self, _name: &str, _payload: &str) -> Option<MapGeometry> {
            Some(MapGeometry {
                intersection_id: 1001,
                ref_lat: REF_LAT,
                ref_lon: REF_LON,
            })
        }

        fn resolve(&self, _map: &DecodedMap, _v: &BasicVehicle) -> Option<LaneResolution> {
            Some(LaneResolution {
                lane_id: 1,
                approach_id: 7,
                signal_group: 2,
            })
        }
    }

    fn bsm_datagram(id: u32, lat: f64, lon: f64) -> String {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&id.to_be_bytes());
        bytes.extend_from_slice(&((lat * 1e7).round() as i32).to_be_bytes());
        bytes.extend_from_slice(&((lon * 1e7).round() as i32).to_be_bytes());
        format!("0014{}", bytes_to_hex(&bytes))
    }

    fn pipeline() -> Pipeline<PackedBsm, AnyLane, ManualClock> {
        Pipeline::new(
            PackedBsm,
            AnyLane,
            ManualClock(Cell::new(1_700_000_000.0)),
            &TrackerConfig::default(),
        )
    }

    fn lane_of(p: &Processed) -> serde_json::Value {
        let v: serde_json::Value = serde_json::from_str(p.enriched.as_deref().unwrap()).unwrap();
        v["BasicVehicle"]["laneID"].clone()
    }

    #[test]
    fn test_map_then_bsm_in_range_gains_lane() {
        let mut p = pipeline();
        let map = p.process("0012380130200f").unwrap();
        assert_eq!(map.kind, MsgKind::Map);
        assert!(map.document.contains("\"IntersectionID\":1001"));
        assert!(map.enriched.is_none());

        // ~556 m north of the reference point
        let bsm = p
            .process(&bsm_datagram(501, REF_LAT + 0.005, REF_LON))
            .unwrap();
        assert_eq!(bsm.kind, MsgKind::Bsm);
        assert_eq!(lane_of(&bsm), 1);

        let v: serde_json::Value =
            serde_json::from_str(bsm.enriched.as_deref().unwrap()).unwrap();
        assert_eq!(v["BasicVehicle"]["approachID"], 7);
        assert_eq!(v["BasicVehicle"]["signalGroup"], 2);
        assert_eq!(v["Timestamp_verbose"], "2023-11-14 22:13:20.000");
    }

    #[test]
    fn test_map_then_bsm_out_of_range_never_gains_lane() {
        let mut p = pipeline();
        p.process("0012380130200f").unwrap();

        // ~890 m north of the reference point
        for _ in 0..3 {
            let bsm = p
                .process(&bsm_datagram(502, REF_LAT + 0.008, REF_LON))
                .unwrap();
            assert_eq!(lane_of(&bsm), 0);
        }
        assert!(p.tracker().get(502).unwrap().maps.is_empty());
    }

    #[test]
    fn test_transport_prefix_and_padding_stripped() {
        let mut p = pipeline();
        let datagram = format!("\u{2}xx{}\0\0", bsm_datagram(7, REF_LAT, REF_LON));
        let out = p.process(&datagram).unwrap();
        assert_eq!(out.kind, MsgKind::Bsm);
        assert!(p.tracker().get(7).is_some());
    }

    #[test]
    fn test_unknown_and_garbage_dropped() {
        let mut p = pipeline();
        assert!(matches!(p.process("0019abcd"), Err(V2xError::UnknownTag(_))));
        assert!(matches!(p.process("hello"), Err(V2xError::UnknownTag(_))));
        assert!(matches!(p.process("0014abcd"), Err(V2xError::DecodeFailed(_))));
        assert_eq!(p.datagrams, 3);
        assert_eq!(p.dropped, 3);
        assert!(p.tracker().registry.is_empty());
    }

    #[test]
    fn test_clock_drives_eviction() {
        let mut p = pipeline();
        p.process(&bsm_datagram(1, REF_LAT, REF_LON)).unwrap();
        p.clock.0.set(1_700_000_011.0);
        let out = p.process(&bsm_datagram(2, REF_LAT, REF_LON)).unwrap();
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e, TrackEvent::VehicleEvicted { id: 1, .. })));
    }

    /// Parses each MAP payload once, under the logical MAP name only.
    #[derive(Default)]
    struct CountingMaps {
        loads: Cell<u32>,
    }

    impl Geometry for CountingMaps {
        fn load_map(&self, name: &str, _payload: &str) -> Option<MapGeometry> {
            self.loads.set(self.loads.get() + 1);
            (name == MAP_NAME).then_some(MapGeometry {
                intersection_id: 1001,
                ref_lat: REF_LAT,
                ref_lon: REF_LON,
            })
        }

        fn resolve(&self, _map: &DecodedMap, _v: &BasicVehicle) -> Option<LaneResolution> {
            Some(LaneResolution {
                lane_id: 4,
                approach_id: 1,
                signal_group: 6,
            })
        }
    }

    #[test]
    fn test_map_payload_parsed_once() {
        let mut p = Pipeline::new(
            PackedBsm,
            CountingMaps::default(),
            ManualClock(Cell::new(1_700_000_000.0)),
            &TrackerConfig::default(),
        );

        let map = p.process("0012380130200f").unwrap();
        assert!(map.events.iter().any(|e| matches!(
            e,
            TrackEvent::MapReceived {
                intersection_id: 1001,
                ..
            }
        )));

        let bsm = p.process(&bsm_datagram(601, REF_LAT + 0.001, REF_LON)).unwrap();
        assert_eq!(lane_of(&bsm), 4);
        assert_eq!(p.decoder.geometry().loads.get(), 1);

        // The emitted document carries no reference point
        match Message::from_json(&map.document).unwrap() {
            Message::Map(doc) => assert_eq!(doc.reference, None),
            other => panic!("expected MAP, got {other:?}"),
        }
    }
}
