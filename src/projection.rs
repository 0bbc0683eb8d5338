// Places every car on the circuit from its lap timing

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::debug;
use serde::Serialize;

use crate::{
    geometry::{LngLat, TrackPolyline, clamp_fraction},
    telemetry::{DriverNumber, LapRecord, Roster},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CarMarker {
    pub driver_number: DriverNumber,
    pub code: String,
    pub lap_number: u32,
    /// Fraction of the current lap covered, in [0, 1]
    pub progress: f64,
    pub position: LngLat,
}

/// Fraction of `lap` covered at `at`.
///
/// Uses the lap duration, or the start of the next lap when the duration is missing.
pub fn lap_progress(
    lap: &LapRecord,
    next_start: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> Option<f64> {
    let start = lap.date_start?;
    let duration_ms = lap
        .lap_duration_ms
        .filter(|d| d.is_finite() && *d > 0.0)
        .or_else(|| {
            next_start
                .map(|next| (next - start).num_milliseconds() as f64)
                .filter(|d| *d > 0.0)
        })?;
    let elapsed_ms = (at - start).num_milliseconds() as f64;
    Some(clamp_fraction(elapsed_ms / duration_ms))
}

/// Marker for every roster driver whose current lap started at or before `at`
pub fn project_cars(
    laps: &[LapRecord],
    at: DateTime<Utc>,
    polyline: &TrackPolyline,
    roster: &Roster,
) -> Vec<CarMarker> {
    laps.iter()
        .filter(|l| l.date_start.is_some())
        .into_group_map_by(|l| l.driver_number)
        .into_iter()
        .sorted_by_key(|(driver, _)| *driver)
        .filter_map(|(driver, mut driver_laps)| {
            let info = roster.get(&driver)?;
            driver_laps.sort_by_key(|l| l.lap_number);
            let current = driver_laps
                .iter()
                .rposition(|l| l.date_start.is_some_and(|start| start <= at))?;
            let lap = driver_laps[current];
            let next_start = driver_laps.get(current + 1).and_then(|l| l.date_start);
            let Some(progress) = lap_progress(lap, next_start, at) else {
                debug!("No lap length for driver {} on lap {}", driver, lap.lap_number);
                return None;
            };
            let position = polyline.interpolate(progress)?;
            Some(CarMarker {
                driver_number: driver,
                code: info.name_acronym.clone(),
                lap_number: lap.lap_number,
                progress,
                position,
            })
        })
        .collect()
}
