//! Reference points supplied on the command line.
//!
//! Stands in for a full lane geometry engine: MAPs are placed at a known
//! reference point so they can be associated with nearby vehicles, but no
//! vehicle is ever placed on a lane. Without a lane engine the raw MAP
//! payload cannot be read, so a payload only resolves when exactly one
//! reference point is configured. Decoded documents are looked up by ID.

use std::collections::HashMap;

use v2x_core::geometry::{Geometry, LaneResolution, MapGeometry, MAP_NAME};
use v2x_core::maps::DecodedMap;
use v2x_core::BasicVehicle;

#[derive(Debug, Default)]
pub struct ReferencePoints {
    points: HashMap<u32, (f64, f64)>,
}

impl ReferencePoints {
    /// Parse `ID:LAT:LON` entries.
    pub fn parse(entries: &[String]) -> Result<Self, String> {
        let mut points = HashMap::new();
        for entry in entries {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [id, lat, lon] = parts.as_slice() else {
                return Err(format!("expected ID:LAT:LON, got {entry:?}"));
            };
            let id: u32 = id.parse().map_err(|_| format!("bad intersection ID in {entry:?}"))?;
            let lat: f64 = lat.parse().map_err(|_| format!("bad latitude in {entry:?}"))?;
            let lon: f64 = lon.parse().map_err(|_| format!("bad longitude in {entry:?}"))?;
            points.insert(id, (lat, lon));
        }
        Ok(ReferencePoints { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    fn point(&self, intersection_id: u32) -> Option<MapGeometry> {
        let &(ref_lat, ref_lon) = self.points.get(&intersection_id)?;
        Some(MapGeometry {
            intersection_id,
            ref_lat,
            ref_lon,
        })
    }
}

impl Geometry for ReferencePoints {
    fn load_map(&self, name: &str, _payload: &str) -> Option<MapGeometry> {
        if name != MAP_NAME || self.points.len() != 1 {
            return None;
        }
        let &intersection_id = self.points.keys().next()?;
        self.point(intersection_id)
    }

    fn lookup(&self, intersection_id: u32) -> Option<MapGeometry> {
        self.point(intersection_id)
    }

    fn resolve(&self, _map: &DecodedMap, _vehicle: &BasicVehicle) -> Option<LaneResolution> {
        None
    }
}
