//! Intersection geometry seam.
//!
//! Parsing MAP lane geometry and locating a vehicle on it is the job of an
//! external map engine. The tracker only needs two answers from it: which
//! intersection (and reference point) a MAP payload describes, and which
//! lane/approach/signal group a vehicle occupies on that map.
//!
//! Payloads are always handed over under `MAP_NAME`. A MAP that arrives
//! already decoded (as a JSON document) is looked up by intersection ID.

use crate::maps::DecodedMap;
use crate::types::BasicVehicle;

/// Logical name under which MAP payloads are handed to the geometry engine.
pub const MAP_NAME: &str = "Map";

/// Identity and reference point of a parsed MAP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapGeometry {
    pub intersection_id: u32,
    pub ref_lat: f64,
    pub ref_lon: f64,
}

/// Where a vehicle sits on an intersection map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneResolution {
    pub lane_id: i32,
    pub approach_id: i32,
    pub signal_group: i32,
}

pub trait Geometry {
    /// Parse a hex MAP payload registered under `name`. `None` if unparseable.
    fn load_map(&self, name: &str, payload: &str) -> Option<MapGeometry>;

    /// Identity and reference point of a map the engine already knows.
    fn lookup(&self, _intersection_id: u32) -> Option<MapGeometry> {
        None
    }

    /// Locate a vehicle on a map. `None` if it is not on any mapped lane.
    fn resolve(&self, map: &DecodedMap, vehicle: &BasicVehicle) -> Option<LaneResolution>;
}

impl<T: Geometry + ?Sized> Geometry for &T {
    fn load_map(&self, name: &str, payload: &str) -> Option<MapGeometry> {
        (**self).load_map(name, payload)
    }

    fn lookup(&self, intersection_id: u32) -> Option<MapGeometry> {
        (**self).lookup(intersection_id)
    }

    fn resolve(&self, map: &DecodedMap, vehicle: &BasicVehicle) -> Option<LaneResolution> {
        (**self).resolve(map, vehicle)
    }
}

impl<T: Geometry + ?Sized> Geometry for Box<T> {
    fn load_map(&self, name: &str, payload: &str) -> Option<MapGeometry> {
        (**self).load_map(name, payload)
    }

    fn lookup(&self, intersection_id: u32) -> Option<MapGeometry> {
        (**self).lookup(intersection_id)
    }

    fn resolve(&self, map: &DecodedMap, vehicle: &BasicVehicle) -> Option<LaneResolution> {
        (**self).resolve(map, vehicle)
    }
}

/// Geometry engine that knows no maps. Every lookup is a soft miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeometry;

impl Geometry for NoGeometry {
    fn load_map(&self, _name: &str, _payload: &str) -> Option<MapGeometry> {
        None
    }

    fn resolve(&self, _map: &DecodedMap, _vehicle: &BasicVehicle) -> Option<LaneResolution> {
        None
    }
}
