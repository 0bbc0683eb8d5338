use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::debug;
use serde::Serialize;

use crate::telemetry::{
    DriverNumber, DriverScoped, IntervalSample, LapContent, LapRecord, PositionSample,
    RaceControlEvent, Roster, StintRecord, TyreCompound,
};

/// Latest running order, driver number to position (1 is the leader)
pub type Ranks = HashMap<DriverNumber, u32>;

/// Places gained (positive) or lost (negative) since the previous snapshot
pub type PositionDelta = HashMap<DriverNumber, i32>;

pub const SECTORS: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FastestLap {
    pub driver_number: DriverNumber,
    pub lap_number: u32,
    pub duration_ms: f64,
}

/// Records of drivers in the roster, anything else is dropped silently
fn known<'a, T: DriverScoped>(records: &'a [T], roster: &'a Roster) -> impl Iterator<Item = &'a T> {
    records
        .iter()
        .filter(move |r| roster.contains_key(&r.driver_number()))
}

fn usable_duration(duration: Option<f64>) -> Option<f64> {
    duration.filter(|d| d.is_finite() && *d > 0.0)
}

/// Quickest timed lap, ignoring pit-out laps. On a tie the first lap encountered wins.
pub fn fastest_lap(laps: &[LapRecord]) -> Option<FastestLap> {
    let mut best: Option<FastestLap> = None;
    for lap in laps.iter().filter(|l| !l.is_pit_out_lap) {
        let Some(duration) = usable_duration(lap.lap_duration_ms) else {
            continue;
        };
        if best.as_ref().is_none_or(|b| duration < b.duration_ms) {
            best = Some(FastestLap {
                driver_number: lap.driver_number,
                lap_number: lap.lap_number,
                duration_ms: duration,
            });
        }
    }
    best
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectorBest {
    pub driver_number: DriverNumber,
    pub lap_number: u32,
    pub duration_ms: f64,
}

/// Best time per sector, overall and for every driver
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SectorBestState {
    pub overall: [Option<SectorBest>; SECTORS],
    pub per_driver: BTreeMap<DriverNumber, [Option<f64>; SECTORS]>,
}

impl SectorBestState {
    /// Fold one lap in. Existing bests only ever get lower.
    pub fn fold(&mut self, lap: &LapRecord) {
        for (sector, duration) in lap.sector_durations_ms.iter().enumerate() {
            let Some(duration) = usable_duration(*duration) else {
                continue;
            };
            let driver_best = &mut self.per_driver.entry(lap.driver_number).or_default()[sector];
            if driver_best.is_none_or(|b| duration < b) {
                *driver_best = Some(duration);
            }
            let overall = &mut self.overall[sector];
            if overall.as_ref().is_none_or(|b| duration < b.duration_ms) {
                *overall = Some(SectorBest {
                    driver_number: lap.driver_number,
                    lap_number: lap.lap_number,
                    duration_ms: duration,
                });
            }
        }
    }

    pub fn overall_ms(&self, sector: usize) -> Option<f64> {
        self.overall.get(sector)?.as_ref().map(|b| b.duration_ms)
    }

    pub fn driver_ms(&self, driver: DriverNumber, sector: usize) -> Option<f64> {
        *self.per_driver.get(&driver)?.get(sector)?
    }
}

/// Running sector minimums over `laps`, restricted to drivers in the roster
pub fn sector_bests(laps: &[LapRecord], roster: &Roster) -> SectorBestState {
    let mut state = SectorBestState::default();
    for lap in known(laps, roster) {
        state.fold(lap);
    }
    state
}

/// Keeps sector bests across frames, folding in only lap records it has not seen.
///
/// Records are told apart by content, so a lap refreshed with its sector times
/// is folded again. The state is dropped when the session or the circuit
/// changes. A backwards scrub or a refresh that hides folded records also
/// rebuilds it from what is visible.
#[derive(Debug, Default)]
pub struct SectorBestTracker {
    identity: Option<(u64, u64)>,
    folded: HashSet<LapContent>,
    state: SectorBestState,
}

impl SectorBestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SectorBestState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.folded.clear();
        self.state = SectorBestState::default();
    }

    pub fn update(
        &mut self,
        session_key: u64,
        track_fingerprint: u64,
        laps: &[LapRecord],
        roster: &Roster,
    ) -> &SectorBestState {
        let identity = (session_key, track_fingerprint);
        if self.identity != Some(identity) {
            if self.identity.is_some() {
                debug!("Session or circuit changed, resetting sector bests");
            }
            self.identity = Some(identity);
            self.reset();
        }

        let visible: HashSet<LapContent> =
            known(laps, roster).map(LapRecord::content_key).collect();
        if !self.folded.is_subset(&visible) {
            debug!("Folded laps are no longer visible, rebuilding sector bests");
            self.reset();
        }

        for lap in known(laps, roster) {
            if self.folded.insert(lap.content_key()) {
                self.state.fold(lap);
            }
        }
        &self.state
    }
}

/// Signed `prev - curr` for every driver ranked in both snapshots
pub fn position_delta(prev: &Ranks, curr: &Ranks) -> PositionDelta {
    curr.iter()
        .filter_map(|(driver, now)| {
            prev.get(driver)
                .map(|before| (*driver, *before as i32 - *now as i32))
        })
        .collect()
}

/// Holds the rank snapshot of the previous frame.
///
/// Reading deltas never touches the snapshot, [`RankTracker::commit`] replaces it
/// once the frame has been assembled.
#[derive(Debug, Default)]
pub struct RankTracker {
    previous: Option<Ranks>,
}

impl RankTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&Ranks> {
        self.previous.as_ref()
    }

    pub fn deltas(&self, current: &Ranks) -> PositionDelta {
        match &self.previous {
            Some(prev) => position_delta(prev, current),
            None => PositionDelta::new(),
        }
    }

    pub fn commit(&mut self, current: Ranks) {
        self.previous = Some(current);
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Most recent position of every roster driver
pub fn current_ranks(positions: &[PositionSample], roster: &Roster) -> Ranks {
    let mut latest: HashMap<DriverNumber, &PositionSample> = HashMap::new();
    for sample in known(positions, roster) {
        match latest.get(&sample.driver_number) {
            Some(seen) if seen.date > sample.date => {}
            _ => {
                latest.insert(sample.driver_number, sample);
            }
        }
    }
    latest
        .into_iter()
        .map(|(driver, sample)| (driver, sample.position))
        .collect()
}

/// Driver numbers of the first `k` places
pub fn top_k(ranks: &Ranks, k: usize) -> Vec<DriverNumber> {
    ranks
        .iter()
        .sorted_by_key(|(driver, position)| (**position, **driver))
        .take(k)
        .map(|(driver, _)| *driver)
        .collect()
}

/// Compound each roster driver runs on `lap`: their latest stint started by then
pub fn current_compounds(
    stints: &[StintRecord],
    lap: u32,
    roster: &Roster,
) -> BTreeMap<DriverNumber, TyreCompound> {
    known(stints, roster)
        .filter(|s| s.lap_start <= lap)
        .into_group_map_by(|s| s.driver_number)
        .into_iter()
        .filter_map(|(driver, stints)| {
            stints
                .into_iter()
                .max_by_key(|s| (s.stint_number, s.lap_start))
                .map(|s| (driver, s.compound))
        })
        .collect()
}

pub fn latest_race_control(events: &[RaceControlEvent]) -> Option<&RaceControlEvent> {
    events.iter().max_by_key(|e| e.date)
}

/// One chart row: the lap number plus one gap (seconds) per driver code
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GapRow {
    pub lap: u32,
    #[serde(flatten)]
    pub gaps: BTreeMap<String, Option<f64>>,
}

/// Sample closest in time to `at`; on a tie the earlier sample wins. `samples` is sorted by date.
fn nearest<'a>(samples: &[&'a IntervalSample], at: DateTime<Utc>) -> Option<&'a IntervalSample> {
    let idx = samples.partition_point(|s| s.date < at);
    let after = samples.get(idx).copied();
    let before = idx.checked_sub(1).and_then(|i| samples.get(i)).copied();
    match (before, after) {
        (Some(b), Some(a)) => {
            if (at - b.date) <= (a.date - at) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (b, a) => b.or(a),
    }
}

/// Gap to the leader of each `drivers` entry at the start of every revealed lap.
///
/// Each value is the `gap_to_leader` of that driver's interval sample nearest to
/// their own lap start. A missing lap, sample or gap stays `None`.
pub fn gap_series(
    drivers: &[DriverNumber],
    intervals: &[IntervalSample],
    laps: &[LapRecord],
    roster: &Roster,
) -> Vec<GapRow> {
    let drivers: Vec<(DriverNumber, &str)> = drivers
        .iter()
        .filter_map(|d| roster.get(d).map(|info| (*d, info.name_acronym.as_str())))
        .collect();

    let mut samples: HashMap<DriverNumber, Vec<&IntervalSample>> =
        intervals.iter().into_group_map_by(|s| s.driver_number);
    for series in samples.values_mut() {
        series.sort_by_key(|s| s.date);
    }

    let lap_starts: HashMap<(DriverNumber, u32), DateTime<Utc>> = laps
        .iter()
        .filter_map(|l| l.date_start.map(|start| ((l.driver_number, l.lap_number), start)))
        .collect();

    laps.iter()
        .map(|l| l.lap_number)
        .sorted()
        .dedup()
        .map(|lap| {
            let gaps = drivers
                .iter()
                .map(|(driver, code)| {
                    let gap = lap_starts.get(&(*driver, lap)).and_then(|start| {
                        let series = samples.get(driver)?;
                        nearest(series, *start)?.gap_to_leader
                    });
                    (code.to_string(), gap)
                })
                .collect();
            GapRow { lap, gaps }
        })
        .collect()
}
