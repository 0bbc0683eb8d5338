// Track geometry: arc-length projection of lap progress onto a circuit polyline,
// sector partitioning, and curvature-derived rendering gradients

pub mod circuit;
pub mod gradient;
pub mod projector;

use serde::{Deserialize, Serialize};

pub use circuit::{Circuit, TrackStats, load_circuit};
pub use gradient::{GradientConfig, GradientStop, Rgb, smoothed_curvature, speed_gradient};
pub use projector::{
    TrackPolyline, build_cumulative_distances, extract_sub_line, haversine_distance,
    interpolate, sector_boundaries, split_into_sectors, sub_line_progress,
};

/// A geographic coordinate in decimal degrees
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Linear blend towards `other`, `frac` is expected in [0, 1]
    pub fn lerp(self, other: LngLat, frac: f64) -> LngLat {
        LngLat::new(
            self.lng + (other.lng - self.lng) * frac,
            self.lat + (other.lat - self.lat) * frac,
        )
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(value: [f64; 2]) -> Self {
        LngLat::new(value[0], value[1])
    }
}

/// Clamp a progress fraction into [0, 1]; NaN collapses to the start of the lap
pub fn clamp_fraction(t: f64) -> f64 {
    if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) }
}
