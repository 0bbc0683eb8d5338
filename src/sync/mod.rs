// Consistent truncation of independently sampled streams to one virtual cutoff.
//
// Fine-grained streams are cut on the continuous clock every frame. Coarse streams
// (laps, stints, pit stops) are cut on lap boundaries and shared behind an `Arc`,
// so they and everything derived from them change once per lap, not per frame.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::telemetry::{
    IntervalSample, LapRecord, LapScoped, PitRecord, PositionSample, RaceControlEvent,
    StintRecord, Timestamped, WeatherSample,
};

/// Streams as delivered by the polling layer. A stream that has not arrived yet is `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawStreams {
    pub positions: Option<Vec<PositionSample>>,
    pub laps: Option<Vec<LapRecord>>,
    pub stints: Option<Vec<StintRecord>>,
    pub pits: Option<Vec<PitRecord>>,
    pub race_control: Option<Vec<RaceControlEvent>>,
    pub intervals: Option<Vec<IntervalSample>>,
    pub weather: Option<Vec<WeatherSample>>,
}

/// How far coarse streams are revealed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum LapLimit {
    /// No cutoff: reveal every record
    Unbounded,
    /// Reveal records up to and including this lap
    Through(u32),
    /// The cutoff precedes the first lap start
    BeforeFirstLap,
}

impl LapLimit {
    pub fn admits(&self, lap: u32) -> bool {
        match self {
            LapLimit::Unbounded => true,
            LapLimit::Through(limit) => lap <= *limit,
            LapLimit::BeforeFirstLap => false,
        }
    }
}

/// Identity of one computation of the coarse views
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct LapViewKey {
    pub fingerprint: u64,
    pub limit: LapLimit,
}

/// Coarse streams cut at a lap boundary
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapViews {
    pub key: LapViewKey,
    /// Highest lap revealed, `None` before the first lap starts
    pub lap_cutoff: Option<u32>,
    /// Instant the revealed lap began: the earliest start of lap `lap_cutoff`.
    /// `None` when every record is revealed or no lap has started.
    pub revealed_at: Option<DateTime<Utc>>,
    pub laps: Vec<LapRecord>,
    pub stints: Vec<StintRecord>,
    pub pits: Vec<PitRecord>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilteredStreams {
    pub cutoff: Option<DateTime<Utc>>,
    pub positions: Vec<PositionSample>,
    pub race_control: Vec<RaceControlEvent>,
    pub intervals: Vec<IntervalSample>,
    pub weather: Vec<WeatherSample>,
    pub lap_views: Arc<LapViews>,
}

impl FilteredStreams {
    pub fn lap_cutoff(&self) -> Option<u32> {
        self.lap_views.lap_cutoff
    }

    pub fn laps(&self) -> &[LapRecord] {
        &self.lap_views.laps
    }

    pub fn stints(&self) -> &[StintRecord] {
        &self.lap_views.stints
    }

    pub fn pits(&self) -> &[PitRecord] {
        &self.lap_views.pits
    }

    /// Records of a continuous stream up to the start of the revealed lap.
    ///
    /// Anything derived from these changes only when the lap views do.
    pub fn at_lap_boundary<T: Timestamped + Clone>(&self, records: &[T]) -> Vec<T> {
        match self.lap_views.revealed_at {
            Some(boundary) => records
                .iter()
                .filter(|r| r.timestamp() <= boundary)
                .cloned()
                .collect(),
            None => records.to_vec(),
        }
    }
}

/// Highest lap number whose start is at or before `cutoff`.
///
/// Without a cutoff every lap counts, so this is the highest lap number recorded.
pub fn lap_cutoff(laps: &[LapRecord], cutoff: Option<DateTime<Utc>>) -> Option<u32> {
    match cutoff {
        None => laps.iter().map(|l| l.lap_number).max(),
        Some(cutoff) => laps
            .iter()
            .filter(|l| l.date_start.is_some_and(|start| start <= cutoff))
            .map(|l| l.lap_number)
            .max(),
    }
}

pub fn lap_limit(laps: &[LapRecord], cutoff: Option<DateTime<Utc>>) -> LapLimit {
    match (cutoff, lap_cutoff(laps, cutoff)) {
        (None, _) => LapLimit::Unbounded,
        (Some(_), Some(lap)) => LapLimit::Through(lap),
        (Some(_), None) => LapLimit::BeforeFirstLap,
    }
}

fn filter_by_time<T: Timestamped + Clone>(
    records: &Option<Vec<T>>,
    cutoff: Option<DateTime<Utc>>,
) -> Vec<T> {
    let Some(records) = records else {
        return Vec::new();
    };
    match cutoff {
        None => records.clone(),
        Some(cutoff) => records
            .iter()
            .filter(|r| r.timestamp() <= cutoff)
            .cloned()
            .collect(),
    }
}

fn filter_by_lap<T: LapScoped + Clone>(records: &Option<Vec<T>>, limit: LapLimit) -> Vec<T> {
    records
        .iter()
        .flatten()
        .filter(|r| limit.admits(r.lap()))
        .cloned()
        .collect()
}

fn hash_stream<T, K: Hash>(hasher: &mut DefaultHasher, records: &Option<Vec<T>>, key: impl Fn(&T) -> K) {
    match records {
        None => 0u8.hash(hasher),
        Some(records) => {
            1u8.hash(hasher);
            records.len().hash(hasher);
            for record in records {
                key(record).hash(hasher);
            }
        }
    }
}

/// Content key of the coarse streams.
///
/// Every record takes part, so a re-polled stream with any changed record gets
/// a new key even when its length and ends are unchanged.
pub fn fingerprint(raw: &RawStreams) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_stream(&mut hasher, &raw.laps, LapRecord::content_key);
    hash_stream(&mut hasher, &raw.stints, |s| {
        (s.driver_number, s.stint_number, s.compound, s.lap_start, s.lap_end)
    });
    hash_stream(&mut hasher, &raw.pits, |p| {
        (p.driver_number, p.lap_number, p.date, p.pit_duration_ms.map(f64::to_bits))
    });
    hasher.finish()
}

fn build_lap_views(raw: &RawStreams, key: LapViewKey) -> LapViews {
    let revealed_at = match key.limit {
        LapLimit::Through(lap) => raw
            .laps
            .iter()
            .flatten()
            .filter(|l| l.lap_number == lap)
            .filter_map(|l| l.date_start)
            .min(),
        LapLimit::Unbounded | LapLimit::BeforeFirstLap => None,
    };
    LapViews {
        key,
        revealed_at,
        lap_cutoff: match key.limit {
            LapLimit::Through(lap) => Some(lap),
            LapLimit::Unbounded => lap_cutoff(raw.laps.as_deref().unwrap_or_default(), None),
            LapLimit::BeforeFirstLap => None,
        },
        laps: filter_by_lap(&raw.laps, key.limit),
        stints: filter_by_lap(&raw.stints, key.limit),
        pits: filter_by_lap(&raw.pits, key.limit),
    }
}

fn lap_view_key(raw: &RawStreams, cutoff: Option<DateTime<Utc>>) -> LapViewKey {
    LapViewKey {
        fingerprint: fingerprint(raw),
        limit: lap_limit(raw.laps.as_deref().unwrap_or_default(), cutoff),
    }
}

fn assemble(raw: &RawStreams, cutoff: Option<DateTime<Utc>>, lap_views: Arc<LapViews>) -> FilteredStreams {
    FilteredStreams {
        cutoff,
        positions: filter_by_time(&raw.positions, cutoff),
        race_control: filter_by_time(&raw.race_control, cutoff),
        intervals: filter_by_time(&raw.intervals, cutoff),
        weather: filter_by_time(&raw.weather, cutoff),
        lap_views,
    }
}

/// Truncate every stream to `cutoff` from scratch. `None` reveals everything.
pub fn sync(raw: &RawStreams, cutoff: Option<DateTime<Utc>>) -> FilteredStreams {
    let key = lap_view_key(raw, cutoff);
    assemble(raw, cutoff, Arc::new(build_lap_views(raw, key)))
}

/// Incremental form of [`sync`] that rebuilds the coarse views only when the lap
/// cutoff or the underlying streams change. Its output always equals `sync`.
#[derive(Debug, Default)]
pub struct StreamSynchronizer {
    cached: Option<Arc<LapViews>>,
    rebuilds: usize,
}

impl StreamSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synchronize(&mut self, raw: &RawStreams, cutoff: Option<DateTime<Utc>>) -> FilteredStreams {
        let key = lap_view_key(raw, cutoff);
        let lap_views = match &self.cached {
            Some(views) if views.key == key => views.clone(),
            _ => {
                debug!("Rebuilding lap views for {:?}", key.limit);
                let views = Arc::new(build_lap_views(raw, key));
                self.cached = Some(views.clone());
                self.rebuilds += 1;
                views
            }
        };
        assemble(raw, cutoff, lap_views)
    }

    /// Number of times the coarse views were rebuilt
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
