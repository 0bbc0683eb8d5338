// One replay session: clock, synchronizer and analytics wired together

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use super::{
    clock::{PlaybackSpeed, ReplayMode},
    controller::ReplayController,
};
use crate::{
    analytics::{
        self, FastestLap, GapRow, RankTracker, SectorBestState, SectorBestTracker,
    },
    geometry::TrackPolyline,
    projection::{CarMarker, project_cars},
    sync::{FilteredStreams, LapViewKey, StreamSynchronizer},
    telemetry::{
        ArchiveRecord, DriverNumber, RaceControlEvent, Roster, SessionArchive, TyreCompound,
        WeatherSample,
    },
};

pub const DEFAULT_GAP_TOP_K: usize = 5;

/// Figures that only change when a lap boundary is crossed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LapAggregates {
    pub lap: Option<u32>,
    pub fastest_lap: Option<FastestLap>,
    pub sector_bests: SectorBestState,
    pub compounds: BTreeMap<DriverNumber, TyreCompound>,
    pub gap_series: Vec<GapRow>,
}

/// Everything a renderer needs for one frame
#[derive(Clone, Debug, Serialize)]
pub struct FrameView {
    pub mode: ReplayMode,
    pub speed: PlaybackSpeed,
    pub elapsed_ms: f64,
    pub progress: f64,
    pub cutoff: Option<DateTime<Utc>>,
    pub ranks: BTreeMap<DriverNumber, u32>,
    pub position_deltas: BTreeMap<DriverNumber, i32>,
    pub cars: Vec<CarMarker>,
    pub race_control: Option<RaceControlEvent>,
    pub weather: Option<WeatherSample>,
    pub aggregates: Arc<LapAggregates>,
}

pub struct ReplayEngine {
    archive: SessionArchive,
    roster: Roster,
    polyline: TrackPolyline,
    controller: ReplayController,
    synchronizer: StreamSynchronizer,
    ranks: RankTracker,
    sector_bests: SectorBestTracker,
    aggregates: Option<(LapViewKey, Arc<LapAggregates>)>,
    aggregate_builds: usize,
    gap_top_k: usize,
}

impl ReplayEngine {
    pub fn new(archive: SessionArchive, polyline: TrackPolyline) -> Self {
        let roster = archive.roster();
        let controller = ReplayController::new(archive.info.bounds());
        Self {
            archive,
            roster,
            polyline,
            controller,
            synchronizer: StreamSynchronizer::new(),
            ranks: RankTracker::new(),
            sector_bests: SectorBestTracker::new(),
            aggregates: None,
            aggregate_builds: 0,
            gap_top_k: DEFAULT_GAP_TOP_K,
        }
    }

    pub fn with_gap_top_k(mut self, k: usize) -> Self {
        self.gap_top_k = k;
        self
    }

    pub fn archive(&self) -> &SessionArchive {
        &self.archive
    }

    pub fn polyline(&self) -> &TrackPolyline {
        &self.polyline
    }

    pub fn controller(&self) -> &ReplayController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ReplayController {
        &mut self.controller
    }

    /// Number of times the lap aggregates were recomputed
    pub fn aggregate_builds(&self) -> usize {
        self.aggregate_builds
    }

    /// Take in a record that arrived after loading
    pub fn append(&mut self, record: ArchiveRecord) {
        let new_driver = matches!(record, ArchiveRecord::Driver(_));
        self.archive.append(record);
        if new_driver {
            self.roster = self.archive.roster();
        }
        // late positions and intervals can land before the lap boundary, and they
        // are not part of the lap view key
        self.aggregates = None;
    }

    /// Advance the clock to `now` and assemble the frame
    pub fn frame(&mut self, now: Instant) -> FrameView {
        self.controller.frame(now);
        self.view()
    }

    /// Assemble the frame for the current clock position without advancing it
    pub fn view(&mut self) -> FrameView {
        let clock = self.controller.clock();
        let cutoff = clock.cutoff();
        let filtered = self.synchronizer.synchronize(&self.archive.streams, cutoff);
        let aggregates = self.lap_aggregates(&filtered);

        let ranks = analytics::current_ranks(&filtered.positions, &self.roster);
        let position_deltas = self.ranks.deltas(&ranks).into_iter().collect();

        let at = cutoff.unwrap_or(self.archive.info.date_end);
        // raw laps: a lap without a duration ends at the next lap's start, which
        // the lap views hide until that lap is revealed. Laps after `at` are
        // never drawn.
        let laps = self.archive.streams.laps.as_deref().unwrap_or_default();
        let cars = project_cars(laps, at, &self.polyline, &self.roster);

        let clock = self.controller.clock();
        let view = FrameView {
            mode: clock.mode(),
            speed: clock.speed(),
            elapsed_ms: clock.elapsed_ms(),
            progress: clock.progress(),
            cutoff,
            ranks: ranks.iter().map(|(d, p)| (*d, *p)).collect(),
            position_deltas,
            cars,
            race_control: analytics::latest_race_control(&filtered.race_control).cloned(),
            weather: filtered.weather.iter().max_by_key(|w| w.date).cloned(),
            aggregates,
        };
        // the snapshot moves only after this frame's deltas were read
        self.ranks.commit(ranks);
        view
    }

    fn lap_aggregates(&mut self, filtered: &FilteredStreams) -> Arc<LapAggregates> {
        let key = filtered.lap_views.key;
        if let Some((cached_key, aggregates)) = &self.aggregates {
            if *cached_key == key {
                return aggregates.clone();
            }
        }

        debug!("Recomputing lap aggregates for {:?}", key.limit);
        // continuous streams are read as of the lap boundary so the result only
        // depends on the key, never on the frame that first crossed it
        let positions = filtered.at_lap_boundary(&filtered.positions);
        let intervals = filtered.at_lap_boundary(&filtered.intervals);
        let ranks = analytics::current_ranks(&positions, &self.roster);
        let leaders = analytics::top_k(&ranks, self.gap_top_k);
        let sector_bests = self
            .sector_bests
            .update(
                self.archive.info.session_key,
                self.polyline.fingerprint(),
                filtered.laps(),
                &self.roster,
            )
            .clone();
        let lap = filtered.lap_cutoff();
        let aggregates = Arc::new(LapAggregates {
            lap,
            fastest_lap: analytics::fastest_lap(filtered.laps()),
            sector_bests,
            compounds: lap
                .map(|lap| analytics::current_compounds(filtered.stints(), lap, &self.roster))
                .unwrap_or_default(),
            gap_series: analytics::gap_series(
                &leaders,
                &intervals,
                filtered.laps(),
                &self.roster,
            ),
        });
        self.aggregate_builds += 1;
        self.aggregates = Some((key, aggregates.clone()));
        aggregates
    }
}
