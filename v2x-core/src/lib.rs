//! v2x-core: Pure decode + tracking library for SAE J2735 MAP / SPaT / BSM.
//!
//! No async, no network I/O. Bit-level UPER decoding and lane geometry are
//! supplied by the caller through the `BitDecoder` and `Geometry` traits.
//! This crate is the shared core used by the `v2x` command-line tool.

pub mod classify;
pub mod config;
pub mod decode;
pub mod enrich;
pub mod frame;
pub mod geo;
pub mod geometry;
pub mod maps;
pub mod pipeline;
pub mod registry;
pub mod spat;
pub mod timing;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use classify::{classify, locate_frame};
pub use decode::{decode, MsgDecoder};
pub use frame::{BitDecoder, Frame};
pub use geometry::{Geometry, NoGeometry};
pub use pipeline::{Clock, Pipeline, SystemClock};
pub use registry::{EvictionMode, TrackedVehicle, VehicleRegistry};
pub use tracker::{TrackEvent, Tracker};
pub use types::*;
