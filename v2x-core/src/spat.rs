//! Latest signal phase state per intersection.
//!
//! Each SPaT replaces the cached phase states for its intersection. A vehicle's
//! signal status is the current state of the phase matching its signal group
//! on the intersection its lane was resolved against.

use std::collections::HashMap;

use log::{debug, info};

use crate::registry::{TrackedVehicle, VehicleRegistry};
use crate::types::{PhaseStatus, SpatMessage};

/// SPaT entries are dropped after this many seconds without an update.
pub const SPAT_TIMEOUT: f64 = 5.0;

#[derive(Debug, Clone)]
struct SpatEntry {
    received_at: f64,
    msg_cnt: u8,
    /// Phase number -> current state (None when the state code is unmapped)
    phases: HashMap<u8, Option<PhaseStatus>>,
}

/// Per-intersection cache of the most recent SPaT.
#[derive(Debug)]
pub struct SpatCache {
    entries: HashMap<u32, SpatEntry>,
    timeout: f64,
}

impl SpatCache {
    pub fn new(timeout: f64) -> Self {
        SpatCache {
            entries: HashMap::new(),
            timeout,
        }
    }

    /// Replace the cached phase states for the SPaT's intersection.
    pub fn on_spat_decoded(&mut self, spat: &SpatMessage, now: f64) {
        let id = spat.spat.intersection_state.intersection_id;
        let phases = spat
            .spat
            .phase_state
            .iter()
            .map(|p| (p.phase_no, p.curr_state))
            .collect();

        let entry = SpatEntry {
            received_at: now,
            msg_cnt: spat.spat.msg_cnt,
            phases,
        };
        match self.entries.insert(id, entry) {
            None => info!("signal phase timing available for intersection {id}"),
            Some(prev) => debug!(
                "intersection {id} SPaT msgCnt {} -> {}",
                prev.msg_cnt, spat.spat.msg_cnt
            ),
        }
    }

    /// Drop entries older than the timeout. Returns the expired intersection IDs.
    pub fn expire(&mut self, now: f64) -> Vec<u32> {
        let timeout = self.timeout;
        let expired: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, e)| now - e.received_at > timeout)
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            self.entries.remove(id);
            debug!("SPaT for intersection {id} expired");
        }
        expired
    }

    /// Current status of a signal group at an intersection, if known.
    pub fn resolve_status(&self, intersection_id: u32, signal_group: i32) -> Option<PhaseStatus> {
        let phase_no = u8::try_from(signal_group).ok()?;
        self.entries
            .get(&intersection_id)?
            .phases
            .get(&phase_no)
            .copied()
            .flatten()
    }

    /// Set one vehicle's signal status from the cache.
    pub fn refresh_vehicle(&self, vehicle: &mut TrackedVehicle) {
        vehicle.signal_status = vehicle
            .intersection_id
            .and_then(|id| self.resolve_status(id, vehicle.signal_group));
    }

    /// Set the signal status of every tracked vehicle. Returns how many resolved.
    pub fn refresh_signal_status(&self, registry: &mut VehicleRegistry) -> usize {
        let mut resolved = 0;
        for vehicle in registry.iter_mut() {
            self.refresh_vehicle(vehicle);
            if vehicle.signal_status.is_some() {
                resolved += 1;
            }
        }
        resolved
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SpatCache {
    fn default() -> Self {
        SpatCache::new(SPAT_TIMEOUT)
    }
}
