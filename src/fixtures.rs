// Synthetic three-car session shared by the unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::sync::RawStreams;
use crate::telemetry::{
    DriverInfo, DriverNumber, IntervalSample, LapRecord, PitRecord, PositionSample,
    RaceControlEvent, SessionArchive, SessionInfo, StintRecord, TyreCompound, WeatherSample,
};

pub(crate) const SESSION_MS: i64 = 500_000;
pub(crate) const LAPS: u32 = 5;
/// (driver number, acronym, gap to the leader at the start in ms)
pub(crate) const GRID: [(DriverNumber, &str, i64); 3] = [(1, "VER", 0), (11, "PER", 2_000), (16, "LEC", 4_000)];
/// Driver 11 leaves the pits at the start of this lap
pub(crate) const PIT_OUT_LAP: u32 = 4;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, 15, 0, 0).unwrap()
}

pub(crate) fn at(ms: i64) -> DateTime<Utc> {
    t0() + Duration::milliseconds(ms)
}

pub(crate) fn lap_duration_ms(grid_idx: usize, lap: u32) -> f64 {
    90_000.0 - lap as f64 * 100.0 + grid_idx as f64 * 50.0
}

pub(crate) fn lap_start_ms(grid_idx: usize, lap: u32) -> i64 {
    let offset = GRID[grid_idx].2;
    offset + (1..lap).map(|l| lap_duration_ms(grid_idx, l) as i64).sum::<i64>()
}

pub(crate) fn drivers() -> Vec<DriverInfo> {
    GRID.iter()
        .map(|(number, code, _)| DriverInfo {
            driver_number: *number,
            name_acronym: code.to_string(),
            team_name: None,
            team_colour: None,
        })
        .collect()
}

pub(crate) fn laps() -> Vec<LapRecord> {
    let mut laps = Vec::new();
    for lap in 1..=LAPS {
        for (idx, (number, _, _)) in GRID.iter().enumerate() {
            let duration = lap_duration_ms(idx, lap);
            let pit_out = *number == 11 && lap == PIT_OUT_LAP;
            // the out-lap reads artificially quick so tests can see it being skipped
            let duration = if pit_out { 80_000.0 } else { duration };
            laps.push(LapRecord {
                driver_number: *number,
                lap_number: lap,
                date_start: Some(at(lap_start_ms(idx, lap))),
                lap_duration_ms: Some(duration),
                sector_durations_ms: [
                    Some((duration * 0.32).round()),
                    Some((duration * 0.35).round()),
                    Some(duration - (duration * 0.32).round() - (duration * 0.35).round()),
                ],
                is_pit_out_lap: pit_out,
            });
        }
    }
    laps
}

pub(crate) fn positions() -> Vec<PositionSample> {
    let mut samples = Vec::new();
    for ms in (0..SESSION_MS).step_by(10_000) {
        for (idx, (number, _, _)) in GRID.iter().enumerate() {
            // LEC passes PER at 200 s
            let position = match (idx, ms >= 200_000) {
                (1, true) => 3,
                (2, true) => 2,
                _ => idx as u32 + 1,
            };
            samples.push(PositionSample {
                driver_number: *number,
                date: at(ms),
                position,
            });
        }
    }
    samples
}

pub(crate) fn intervals() -> Vec<IntervalSample> {
    let mut samples = Vec::new();
    for ms in (0..SESSION_MS).step_by(4_000) {
        for (number, _, offset) in GRID.iter() {
            samples.push(IntervalSample {
                driver_number: *number,
                date: at(ms),
                gap_to_leader: (*offset > 0).then(|| *offset as f64 / 1000.0 + ms as f64 / 1e6),
                interval: None,
            });
        }
    }
    samples
}

pub(crate) fn stints() -> Vec<StintRecord> {
    GRID.iter()
        .flat_map(|(number, _, _)| {
            [
                StintRecord {
                    driver_number: *number,
                    stint_number: 1,
                    compound: TyreCompound::Soft,
                    lap_start: 1,
                    lap_end: PIT_OUT_LAP - 1,
                },
                StintRecord {
                    driver_number: *number,
                    stint_number: 2,
                    compound: TyreCompound::Medium,
                    lap_start: PIT_OUT_LAP,
                    lap_end: LAPS,
                },
            ]
        })
        .collect()
}

pub(crate) fn pits() -> Vec<PitRecord> {
    GRID.iter()
        .enumerate()
        .map(|(idx, (number, _, _))| PitRecord {
            driver_number: *number,
            lap_number: PIT_OUT_LAP - 1,
            date: at(lap_start_ms(idx, PIT_OUT_LAP) - 20_000),
            pit_duration_ms: Some(22_400.0),
        })
        .collect()
}

pub(crate) fn race_control() -> Vec<RaceControlEvent> {
    vec![
        RaceControlEvent {
            date: at(0),
            category: "Flag".to_string(),
            flag: Some("GREEN".to_string()),
            message: "GREEN LIGHT - PIT EXIT OPEN".to_string(),
            lap_number: Some(1),
        },
        RaceControlEvent {
            date: at(100_000),
            category: "Flag".to_string(),
            flag: Some("YELLOW".to_string()),
            message: "YELLOW IN TRACK SECTOR 4".to_string(),
            lap_number: Some(2),
        },
    ]
}

pub(crate) fn weather() -> Vec<WeatherSample> {
    (0..SESSION_MS)
        .step_by(60_000)
        .map(|ms| WeatherSample {
            date: at(ms),
            air_temperature: 18.0,
            track_temperature: 31.0 - ms as f64 / 100_000.0,
            humidity: 46.0,
            pressure: 1017.0,
            rainfall: false,
            wind_speed: 1.2,
        })
        .collect()
}

pub(crate) fn raw_streams() -> RawStreams {
    RawStreams {
        positions: Some(positions()),
        laps: Some(laps()),
        stints: Some(stints()),
        pits: Some(pits()),
        race_control: Some(race_control()),
        intervals: Some(intervals()),
        weather: Some(weather()),
    }
}

pub(crate) fn session_info() -> SessionInfo {
    SessionInfo {
        session_key: 9472,
        session_name: "Race".to_string(),
        circuit_short_name: "Sakhir".to_string(),
        date_start: t0(),
        date_end: at(SESSION_MS),
    }
}

pub(crate) fn archive() -> SessionArchive {
    SessionArchive {
        info: session_info(),
        drivers: drivers(),
        streams: raw_streams(),
    }
}
