//! Associate intersection maps with nearby vehicles.
//!
//! A MAP is attached to a vehicle when the vehicle is within DSRC range of
//! the map's reference point. Each vehicle keeps its own set of available
//! maps; lane, approach and signal group are then resolved against that set
//! by the geometry engine. Maps not rebroadcast within the map timeout age out.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::geo::haversine_m;
use crate::geometry::{Geometry, LaneResolution};
use crate::registry::{TrackedVehicle, VehicleRegistry};
use crate::types::{BasicVehicle, MapMessage};

/// Nominal DSRC communication radius in meters.
pub const DSRC_RANGE_M: f64 = 800.0;

/// Maps are dropped after this many seconds without a rebroadcast.
pub const MAP_TIMEOUT: f64 = 30.0;

/// A MAP whose intersection and reference point are known.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMap {
    pub intersection_id: u32,
    pub intersection_name: String,
    pub ref_lat: f64,
    pub ref_lon: f64,
    /// Hex MAP payload as decoded
    pub payload: String,
}

impl DecodedMap {
    /// Reference point for a decoded MAP document.
    ///
    /// Uses the point found at decode time; documents read back from JSON
    /// are looked up by intersection ID instead of being parsed again.
    pub fn from_message<G: Geometry + ?Sized>(msg: &MapMessage, geometry: &G) -> Option<DecodedMap> {
        let geo = msg
            .reference
            .or_else(|| geometry.lookup(msg.intersection_id))?;
        Some(DecodedMap {
            intersection_id: msg.intersection_id,
            intersection_name: msg.intersection_name.clone(),
            ref_lat: geo.ref_lat,
            ref_lon: geo.ref_lon,
            payload: msg.map_payload.clone(),
        })
    }

    /// Distance in meters from the reference point.
    pub fn distance_m(&self, lat: f64, lon: f64) -> f64 {
        haversine_m(self.ref_lat, self.ref_lon, lat, lon)
    }
}

// ---------------------------------------------------------------------------
// Per-vehicle map set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct AvailableMap {
    map: Arc<DecodedMap>,
    refreshed: f64,
}

/// Maps available to a single vehicle, keyed by intersection ID.
#[derive(Debug, Clone, Default)]
pub struct AvailableMaps {
    maps: HashMap<u32, AvailableMap>,
}

impl AvailableMaps {
    /// Add a map or refresh its timestamp.
    pub fn attach(&mut self, map: Arc<DecodedMap>, refreshed: f64) {
        let id = map.intersection_id;
        match self.maps.get_mut(&id) {
            Some(entry) => {
                entry.map = map;
                entry.refreshed = entry.refreshed.max(refreshed);
            }
            None => {
                self.maps.insert(id, AvailableMap { map, refreshed });
            }
        }
    }

    /// Drop maps not refreshed within `timeout`. Returns count removed.
    pub fn age(&mut self, now: f64, timeout: f64) -> usize {
        let before = self.maps.len();
        self.maps.retain(|_, m| now - m.refreshed <= timeout);
        before - self.maps.len()
    }

    /// Drop maps whose reference point is farther than `range_m`.
    pub fn retain_within(&mut self, lat: f64, lon: f64, range_m: f64) -> usize {
        let before = self.maps.len();
        self.maps.retain(|_, m| m.map.distance_m(lat, lon) <= range_m);
        before - self.maps.len()
    }

    /// Available maps ordered by distance from the given point.
    pub fn nearest_first(&self, lat: f64, lon: f64) -> Vec<&DecodedMap> {
        let mut maps: Vec<(&DecodedMap, f64)> = self
            .maps
            .values()
            .map(|m| (m.map.as_ref(), m.map.distance_m(lat, lon)))
            .collect();
        maps.sort_by(|a, b| a.1.total_cmp(&b.1));
        maps.into_iter().map(|(m, _)| m).collect()
    }

    pub fn contains(&self, intersection_id: u32) -> bool {
        self.maps.contains_key(&intersection_id)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Map association
// ---------------------------------------------------------------------------

/// Distributes decoded maps to vehicles and resolves vehicle lanes.
///
/// Recently received maps are cached so a vehicle first heard after a MAP
/// broadcast still picks it up on its next BSM.
#[derive(Debug)]
pub struct MapAssociation {
    range_m: f64,
    timeout: f64,
    recent: HashMap<u32, AvailableMap>,
}

impl MapAssociation {
    pub fn new(range_m: f64, timeout: f64) -> Self {
        MapAssociation {
            range_m,
            timeout,
            recent: HashMap::new(),
        }
    }

    /// Attach a freshly decoded map to every vehicle in range. Returns the
    /// number of vehicles it was attached to.
    pub fn on_map_decoded(
        &mut self,
        registry: &mut VehicleRegistry,
        map: DecodedMap,
        now: f64,
    ) -> usize {
        let map = Arc::new(map);
        let mut attached = 0;

        for vehicle in registry.iter_mut() {
            if map.distance_m(vehicle.lat, vehicle.lon) <= self.range_m {
                vehicle.maps.attach(Arc::clone(&map), now);
                attached += 1;
            }
        }

        if !self.recent.contains_key(&map.intersection_id) {
            info!(
                "map {} available at ({:.6}, {:.6})",
                map.intersection_name, map.ref_lat, map.ref_lon
            );
        }
        self.recent.insert(
            map.intersection_id,
            AvailableMap {
                map,
                refreshed: now,
            },
        );
        attached
    }

    /// Refresh a vehicle's available maps and resolve where it is on them.
    ///
    /// The nearest map that places the vehicle on a lane wins. With no
    /// match the vehicle's lane fields fall back to their defaults.
    pub fn on_vehicle_processed<G: Geometry + ?Sized>(
        &self,
        vehicle: &mut TrackedVehicle,
        snapshot: &BasicVehicle,
        geometry: &G,
        now: f64,
    ) -> Option<(u32, LaneResolution)> {
        vehicle.maps.age(now, self.timeout);

        for entry in self.recent.values() {
            if entry.map.distance_m(vehicle.lat, vehicle.lon) <= self.range_m {
                vehicle.maps.attach(Arc::clone(&entry.map), entry.refreshed);
            }
        }
        vehicle.maps.retain_within(vehicle.lat, vehicle.lon, self.range_m);

        let resolved = vehicle
            .maps
            .nearest_first(vehicle.lat, vehicle.lon)
            .into_iter()
            .find_map(|map| {
                geometry
                    .resolve(map, snapshot)
                    .map(|lane| (map.intersection_id, lane))
            });

        match resolved {
            Some((intersection_id, lane)) => {
                if vehicle.intersection_id != Some(intersection_id) {
                    // Status belonged to another intersection
                    vehicle.signal_status = None;
                }
                vehicle.intersection_id = Some(intersection_id);
                vehicle.lane_id = lane.lane_id;
                vehicle.approach_id = lane.approach_id;
                vehicle.signal_group = lane.signal_group;
                debug!(
                    "vehicle {} on intersection {intersection_id} lane {} approach {} group {}",
                    vehicle.id, lane.lane_id, lane.approach_id, lane.signal_group
                );
            }
            None => vehicle.clear_resolution(),
        }
        resolved
    }

    /// Drop cached maps not rebroadcast within the timeout. Returns count removed.
    pub fn expire(&mut self, now: f64) -> usize {
        let timeout = self.timeout;
        let before = self.recent.len();
        self.recent.retain(|_, m| now - m.refreshed <= timeout);
        before - self.recent.len()
    }

    /// Number of maps currently cached.
    pub fn known_maps(&self) -> usize {
        self.recent.len()
    }
}

impl Default for MapAssociation {
    fn default() -> Self {
        MapAssociation::new(DSRC_RANGE_M, MAP_TIMEOUT)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
