pub mod archive;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use archive::{ArchiveRecord, SessionArchive, load_session_archive};

pub type DriverNumber = u32;

/// Records sampled on a continuous clock.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Records that belong to a lap rather than to an instant.
pub trait LapScoped {
    fn lap(&self) -> u32;
}

/// Records attributed to a single car.
pub trait DriverScoped {
    fn driver_number(&self) -> DriverNumber;
}

/// Absolute bounds of a recorded session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SessionBounds {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Session length in milliseconds, zero when the bounds are inverted
    pub fn duration_ms(&self) -> u64 {
        (self.end - self.start).num_milliseconds().max(0) as u64
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub session_key: u64,
    pub session_name: String,
    pub circuit_short_name: String,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
}

impl SessionInfo {
    pub fn bounds(&self) -> SessionBounds {
        SessionBounds::new(self.date_start, self.date_end)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DriverInfo {
    pub driver_number: DriverNumber,
    /// Three letter code used to key chart series (e.g. "VER")
    pub name_acronym: String,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub team_colour: Option<String>,
}

/// Driver lookup for per-driver aggregates. Records for drivers missing here are ignored.
pub type Roster = HashMap<DriverNumber, DriverInfo>;

pub fn build_roster(drivers: &[DriverInfo]) -> Roster {
    drivers
        .iter()
        .map(|d| (d.driver_number, d.clone()))
        .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PositionSample {
    pub driver_number: DriverNumber,
    pub date: DateTime<Utc>,
    /// Running order, 1 is the leader
    pub position: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LapRecord {
    pub driver_number: DriverNumber,
    pub lap_number: u32,
    #[serde(default)]
    pub date_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lap_duration_ms: Option<f64>,
    #[serde(default)]
    pub sector_durations_ms: [Option<f64>; 3],
    #[serde(default)]
    pub is_pit_out_lap: bool,
}

/// Hashable identity of every field of a [`LapRecord`], floats by bit pattern
pub type LapContent = (
    DriverNumber,
    u32,
    Option<DateTime<Utc>>,
    Option<u64>,
    [Option<u64>; 3],
    bool,
);

impl LapRecord {
    pub fn content_key(&self) -> LapContent {
        let bits = |ms: Option<f64>| ms.map(f64::to_bits);
        (
            self.driver_number,
            self.lap_number,
            self.date_start,
            bits(self.lap_duration_ms),
            self.sector_durations_ms.map(bits),
            self.is_pit_out_lap,
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TyreCompound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StintRecord {
    pub driver_number: DriverNumber,
    pub stint_number: u32,
    pub compound: TyreCompound,
    pub lap_start: u32,
    pub lap_end: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PitRecord {
    pub driver_number: DriverNumber,
    pub lap_number: u32,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub pit_duration_ms: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RaceControlEvent {
    pub date: DateTime<Utc>,
    pub category: String,
    #[serde(default)]
    pub flag: Option<String>,
    pub message: String,
    #[serde(default)]
    pub lap_number: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntervalSample {
    pub driver_number: DriverNumber,
    pub date: DateTime<Utc>,
    /// Seconds behind the leader, absent for the leader and for lapped cars
    #[serde(default)]
    pub gap_to_leader: Option<f64>,
    /// Seconds behind the car ahead
    #[serde(default)]
    pub interval: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeatherSample {
    pub date: DateTime<Utc>,
    pub air_temperature: f64,
    pub track_temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    #[serde(default)]
    pub rainfall: bool,
    pub wind_speed: f64,
}

macro_rules! timestamped {
    ($($ty:ty),*) => {
        $(impl Timestamped for $ty {
            fn timestamp(&self) -> DateTime<Utc> {
                self.date
            }
        })*
    };
}

macro_rules! driver_scoped {
    ($($ty:ty),*) => {
        $(impl DriverScoped for $ty {
            fn driver_number(&self) -> DriverNumber {
                self.driver_number
            }
        })*
    };
}

timestamped!(PositionSample, PitRecord, RaceControlEvent, IntervalSample, WeatherSample);
driver_scoped!(PositionSample, LapRecord, StintRecord, PitRecord, IntervalSample);

impl LapScoped for LapRecord {
    fn lap(&self) -> u32 {
        self.lap_number
    }
}

impl LapScoped for StintRecord {
    /// A stint is revealed once its first lap starts
    fn lap(&self) -> u32 {
        self.lap_start
    }
}

impl LapScoped for PitRecord {
    fn lap(&self) -> u32 {
        self.lap_number
    }
}
