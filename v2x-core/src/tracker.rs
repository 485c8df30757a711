//! Vehicle tracking state machine.
//!
//! Pure logic, no I/O. Consumes decoded MAP, SPaT and BSM documents, keeps
//! the vehicle registry, per-vehicle map sets and SPaT cache current, and
//! returns the enriched BSM plus `TrackEvent` outputs for the caller.
//!
//! Timeout eviction, map aging and SPaT expiry run once per `update()`.

use log::{debug, warn};

use crate::config::TrackerConfig;
use crate::enrich::merge_vehicle;
use crate::geometry::Geometry;
use crate::maps::{DecodedMap, MapAssociation};
use crate::registry::{SnapshotOutcome, TrackedVehicle, VehicleRegistry};
use crate::spat::SpatCache;
use crate::types::*;

// ---------------------------------------------------------------------------
// Track events (output)
// ---------------------------------------------------------------------------

/// Events emitted by the tracker for the caller to report.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// First BSM from this transient ID.
    VehicleAdded { id: u32, timestamp: f64 },
    /// Known vehicle refreshed.
    VehicleUpdated { id: u32, timestamp: f64 },
    /// Vehicle timed out and was removed.
    VehicleEvicted { id: u32, timestamp: f64 },
    /// Vehicle placed on a lane of an intersection map.
    LaneResolved {
        id: u32,
        intersection_id: u32,
        lane_id: i32,
        approach_id: i32,
        signal_group: i32,
    },
    /// MAP accepted and attached to the vehicles in range.
    MapReceived {
        intersection_id: u32,
        vehicles_attached: usize,
        timestamp: f64,
    },
    /// MAP whose reference point the geometry engine could not load.
    MapRejected { intersection_id: u32 },
    /// SPaT cached for an intersection.
    SpatReceived {
        intersection_id: u32,
        vehicles_resolved: usize,
        timestamp: f64,
    },
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Track vehicles and their lane/signal state from decoded documents.
///
/// Call `update()` with each document; BSMs return the enriched vehicle JSON.
pub struct Tracker {
    pub registry: VehicleRegistry,
    pub maps: MapAssociation,
    pub spat: SpatCache,

    // Counters
    pub total_messages: u64,
    pub map_messages: u64,
    pub spat_messages: u64,
    pub bsm_messages: u64,
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Tracker {
            registry: VehicleRegistry::new(config.vehicle_timeout, config.eviction),
            maps: MapAssociation::new(config.dsrc_range_m, config.map_timeout),
            spat: SpatCache::new(config.spat_timeout),
            total_messages: 0,
            map_messages: 0,
            spat_messages: 0,
            bsm_messages: 0,
        }
    }

    /// Process one decoded document. Returns enriched BSM JSON (BSMs only)
    /// and the events produced.
    pub fn update<G: Geometry + ?Sized>(
        &mut self,
        msg: &Message,
        geometry: &G,
        now: f64,
    ) -> Result<(Option<String>, Vec<TrackEvent>)> {
        self.total_messages += 1;
        let mut events = Vec::new();

        self.maps.expire(now);
        if !self.spat.expire(now).is_empty() {
            self.spat.refresh_signal_status(&mut self.registry);
        }

        let enriched = match msg {
            Message::Map(m) => {
                self.map_messages += 1;
                self.on_map(m, geometry, now, &mut events);
                None
            }
            Message::Spat(m) => {
                self.spat_messages += 1;
                self.spat.on_spat_decoded(m, now);
                let vehicles_resolved = self.spat.refresh_signal_status(&mut self.registry);
                events.push(TrackEvent::SpatReceived {
                    intersection_id: m.spat.intersection_state.intersection_id,
                    vehicles_resolved,
                    timestamp: now,
                });
                None
            }
            Message::Bsm(m) => {
                self.bsm_messages += 1;
                Some(self.on_bsm(msg, &m.basic_vehicle, geometry, now, &mut events))
            }
        };

        // Sweep even when enrichment failed
        for id in self.registry.sweep_timeouts(now) {
            events.push(TrackEvent::VehicleEvicted { id, timestamp: now });
        }

        Ok((enriched.transpose()?, events))
    }

    /// Parse a JSON document and process it.
    pub fn update_json<G: Geometry + ?Sized>(
        &mut self,
        json: &str,
        geometry: &G,
        now: f64,
    ) -> Result<(Option<String>, Vec<TrackEvent>)> {
        let msg = Message::from_json(json)?;
        self.update(&msg, geometry, now)
    }

    fn on_map<G: Geometry + ?Sized>(
        &mut self,
        msg: &MapMessage,
        geometry: &G,
        now: f64,
        events: &mut Vec<TrackEvent>,
    ) {
        let Some(map) = DecodedMap::from_message(msg, geometry) else {
            warn!(
                "no reference point for {}, map not associated",
                msg.intersection_name
            );
            events.push(TrackEvent::MapRejected {
                intersection_id: msg.intersection_id,
            });
            return;
        };

        let intersection_id = map.intersection_id;
        let vehicles_attached = self.maps.on_map_decoded(&mut self.registry, map, now);
        debug!("map {intersection_id} attached to {vehicles_attached} vehicles");
        events.push(TrackEvent::MapReceived {
            intersection_id,
            vehicles_attached,
            timestamp: now,
        });
    }

    fn on_bsm<G: Geometry + ?Sized>(
        &mut self,
        msg: &Message,
        snapshot: &BasicVehicle,
        geometry: &G,
        now: f64,
        events: &mut Vec<TrackEvent>,
    ) -> Result<String> {
        let id = snapshot.temporary_id;
        events.push(match self.registry.on_snapshot(snapshot, now) {
            SnapshotOutcome::Added => TrackEvent::VehicleAdded { id, timestamp: now },
            SnapshotOutcome::Updated => TrackEvent::VehicleUpdated { id, timestamp: now },
        });

        let vehicle = self
            .registry
            .get_mut(id)
            .ok_or_else(|| V2xError::Enrich(format!("vehicle {id} missing after update")))?;

        if let Some((intersection_id, lane)) =
            self.maps.on_vehicle_processed(vehicle, snapshot, geometry, now)
        {
            events.push(TrackEvent::LaneResolved {
                id,
                intersection_id,
                lane_id: lane.lane_id,
                approach_id: lane.approach_id,
                signal_group: lane.signal_group,
            });
        }
        self.spat.refresh_vehicle(vehicle);

        merge_vehicle(&msg.to_json()?, vehicle)
    }

    pub fn get(&self, id: u32) -> Option<&TrackedVehicle> {
        self.registry.get(id)
    }

    /// All tracked vehicles, most recently updated first.
    pub fn get_active(&self) -> Vec<&TrackedVehicle> {
        let mut active: Vec<_> = self.registry.iter().collect();
        active.sort_by(|a, b| {
            b.last_update
                .total_cmp(&a.last_update)
                .then(a.id.cmp(&b.id))
        });
        active
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker::new(&TrackerConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
