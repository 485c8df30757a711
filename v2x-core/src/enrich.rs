//! Merge resolved lane and signal fields into outbound BSM JSON.
//!
//! The incoming document is treated as opaque JSON: every existing field is
//! kept, and `BasicVehicle.{laneID, approachID, signalGroup, signalStatus}`
//! are set (created if missing).

use serde_json::{Map, Value};

use crate::registry::TrackedVehicle;
use crate::types::{Result, V2xError};

pub const BASIC_VEHICLE_KEY: &str = "BasicVehicle";

/// Set the resolved fields on a BSM document and re-serialize it compactly.
pub fn merge(
    bsm_json: &str,
    lane_id: i32,
    approach_id: i32,
    signal_group: i32,
    signal_status: &str,
) -> Result<String> {
    let mut doc: Value = serde_json::from_str(bsm_json)?;
    let root = doc
        .as_object_mut()
        .ok_or_else(|| V2xError::Enrich("BSM document is not a JSON object".into()))?;

    let vehicle = root
        .entry(BASIC_VEHICLE_KEY)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| V2xError::Enrich(format!("{BASIC_VEHICLE_KEY} is not a JSON object")))?;

    vehicle.insert("laneID".into(), lane_id.into());
    vehicle.insert("approachID".into(), approach_id.into());
    vehicle.insert("signalGroup".into(), signal_group.into());
    vehicle.insert("signalStatus".into(), signal_status.into());

    Ok(serde_json::to_string(&doc)?)
}

/// Merge a tracked vehicle's current resolution into a BSM document.
pub fn merge_vehicle(bsm_json: &str, vehicle: &TrackedVehicle) -> Result<String> {
    merge(
        bsm_json,
        vehicle.lane_id,
        vehicle.approach_id,
        vehicle.signal_group,
        vehicle.signal_status_str(),
    )
}
