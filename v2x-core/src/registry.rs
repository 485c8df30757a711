//! In-memory registry of vehicles heard from recently.
//!
//! One record per transient ID. A record is created on the first BSM from an
//! ID, refreshed by every later one, and evicted once it has gone unrefreshed
//! for longer than the vehicle timeout.

use std::collections::HashMap;

use log::debug;

use crate::maps::AvailableMaps;
use crate::types::{BasicVehicle, PhaseStatus};

/// Vehicles are evicted after this many seconds without a BSM.
pub const VEHICLE_TIMEOUT: f64 = 10.0;

/// How many expired records a single sweep removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionMode {
    /// Every expired record.
    #[default]
    All,
    /// At most one (the stalest) per sweep. Legacy behavior.
    FirstOnly,
}

impl EvictionMode {
    pub fn from_name(name: &str) -> Option<EvictionMode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "all" => Some(EvictionMode::All),
            "first" | "first_only" => Some(EvictionMode::FirstOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionMode::All => "all",
            EvictionMode::FirstOnly => "first",
        }
    }
}

/// Which path `on_snapshot` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Added,
    Updated,
}

// ---------------------------------------------------------------------------
// Tracked vehicle
// ---------------------------------------------------------------------------

/// Registry record for one vehicle.
#[derive(Debug, Clone)]
pub struct TrackedVehicle {
    pub id: u32,
    pub vehicle_type: String,
    /// Posix seconds of the last BSM
    pub last_update: f64,

    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,

    // Resolved against intersection geometry
    pub intersection_id: Option<u32>,
    pub lane_id: i32,
    pub approach_id: i32,
    pub signal_group: i32,
    pub signal_status: Option<PhaseStatus>,

    /// Maps within range of this vehicle
    pub maps: AvailableMaps,
}

impl TrackedVehicle {
    pub fn new(snapshot: &BasicVehicle, now: f64) -> Self {
        TrackedVehicle {
            id: snapshot.temporary_id,
            vehicle_type: snapshot.vehicle_type.clone(),
            last_update: now,
            lat: snapshot.position.latitude,
            lon: snapshot.position.longitude,
            elevation: snapshot.position.elevation,
            intersection_id: None,
            lane_id: 0,
            approach_id: 0,
            signal_group: 0,
            signal_status: None,
            maps: AvailableMaps::default(),
        }
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_update
    }

    pub fn is_expired(&self, now: f64, timeout: f64) -> bool {
        self.age(now) > timeout
    }

    /// Signal status as published, empty when unresolved.
    pub fn signal_status_str(&self) -> &'static str {
        self.signal_status.map(|s| s.as_str()).unwrap_or("")
    }

    /// Reset lane, approach, signal group and status to their unresolved defaults.
    pub fn clear_resolution(&mut self) {
        self.intersection_id = None;
        self.lane_id = 0;
        self.approach_id = 0;
        self.signal_group = 0;
        self.signal_status = None;
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Hash-indexed table of tracked vehicles, keyed by transient ID.
#[derive(Debug)]
pub struct VehicleRegistry {
    vehicles: HashMap<u32, TrackedVehicle>,
    timeout: f64,
    mode: EvictionMode,
}

impl VehicleRegistry {
    pub fn new(timeout: f64, mode: EvictionMode) -> Self {
        VehicleRegistry {
            vehicles: HashMap::new(),
            timeout,
            mode,
        }
    }

    /// Insert a new record or refresh an existing one.
    ///
    /// Updates touch only the timestamp and position; the vehicle type is
    /// fixed at first sighting.
    pub fn on_snapshot(&mut self, snapshot: &BasicVehicle, now: f64) -> SnapshotOutcome {
        let id = snapshot.temporary_id;
        match self.vehicles.get_mut(&id) {
            Some(v) => {
                v.last_update = now;
                v.lat = snapshot.position.latitude;
                v.lon = snapshot.position.longitude;
                v.elevation = snapshot.position.elevation;
                debug!("vehicle {id} updated ({:.7}, {:.7})", v.lat, v.lon);
                SnapshotOutcome::Updated
            }
            None => {
                self.vehicles.insert(id, TrackedVehicle::new(snapshot, now));
                debug!("vehicle {id} added ({} tracked)", self.vehicles.len());
                SnapshotOutcome::Added
            }
        }
    }

    /// Evict timed-out vehicles. Returns the evicted IDs.
    pub fn sweep_timeouts(&mut self, now: f64) -> Vec<u32> {
        let timeout = self.timeout;
        let mut expired: Vec<(u32, f64)> = self
            .vehicles
            .values()
            .filter(|v| v.is_expired(now, timeout))
            .map(|v| (v.id, v.last_update))
            .collect();

        if self.mode == EvictionMode::FirstOnly {
            expired.sort_by(|a, b| a.1.total_cmp(&b.1));
            expired.truncate(1);
        }

        let evicted: Vec<u32> = expired.into_iter().map(|(id, _)| id).collect();
        for id in &evicted {
            self.vehicles.remove(id);
            debug!("vehicle {id} timed out");
        }
        evicted
    }

    pub fn get(&self, id: u32) -> Option<&TrackedVehicle> {
        self.vehicles.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut TrackedVehicle> {
        self.vehicles.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedVehicle> {
        self.vehicles.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedVehicle> {
        self.vehicles.values_mut()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn timeout(&self) -> f64 {
        self.timeout
    }

    pub fn mode(&self) -> EvictionMode {
        self.mode
    }
}

impl Default for VehicleRegistry {
    fn default() -> Self {
        VehicleRegistry::new(VEHICLE_TIMEOUT, EvictionMode::All)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
