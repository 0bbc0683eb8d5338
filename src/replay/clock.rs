use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{TarmacError, geometry::clamp_fraction, telemetry::SessionBounds};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayMode {
    /// Following the session as it arrives, no virtual cursor
    Live,
    ReplayPaused,
    ReplayPlaying,
    ReplayEnded,
}

/// Playback multipliers offered to the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PlaybackSpeed {
    #[default]
    X1,
    X2,
    X5,
    X10,
    X30,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 5] = [
        PlaybackSpeed::X1,
        PlaybackSpeed::X2,
        PlaybackSpeed::X5,
        PlaybackSpeed::X10,
        PlaybackSpeed::X30,
    ];

    pub fn multiplier(&self) -> u32 {
        match self {
            PlaybackSpeed::X1 => 1,
            PlaybackSpeed::X2 => 2,
            PlaybackSpeed::X5 => 5,
            PlaybackSpeed::X10 => 10,
            PlaybackSpeed::X30 => 30,
        }
    }
}

impl From<PlaybackSpeed> for u32 {
    fn from(value: PlaybackSpeed) -> Self {
        value.multiplier()
    }
}

impl TryFrom<u32> for PlaybackSpeed {
    type Error = TarmacError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PlaybackSpeed::ALL
            .into_iter()
            .find(|s| s.multiplier() == value)
            .ok_or_else(|| TarmacError::InvalidUserInput {
                field: "speed".to_string(),
                reason: format!("{value}x is not one of 1, 2, 5, 10, 30"),
            })
    }
}

impl FromStr for PlaybackSpeed {
    type Err = TarmacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().trim_end_matches(['x', 'X']);
        let value = raw.parse::<u32>().map_err(|e| TarmacError::InvalidUserInput {
            field: "speed".to_string(),
            reason: format!("{s:?}: {e}"),
        })?;
        PlaybackSpeed::try_from(value)
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

/// Virtual cursor over a finished session.
///
/// Only `ReplayPlaying` moves the cursor, and only through [`SessionClock::tick`].
/// Every other transition is an immediate state write.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionClock {
    bounds: SessionBounds,
    duration_ms: f64,
    elapsed_ms: f64,
    speed: PlaybackSpeed,
    mode: ReplayMode,
}

impl SessionClock {
    pub fn new(bounds: SessionBounds) -> Self {
        Self {
            bounds,
            duration_ms: bounds.duration_ms() as f64,
            elapsed_ms: 0.0,
            speed: PlaybackSpeed::default(),
            mode: ReplayMode::Live,
        }
    }

    pub fn bounds(&self) -> SessionBounds {
        self.bounds
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    pub fn is_replay(&self) -> bool {
        self.mode != ReplayMode::Live
    }

    /// Switch between live and replay. Either way the cursor restarts at zero.
    pub fn toggle_replay(&mut self) {
        self.mode = match self.mode {
            ReplayMode::Live => ReplayMode::ReplayPaused,
            _ => ReplayMode::Live,
        };
        self.elapsed_ms = 0.0;
        debug!("Replay toggled, now {:?}", self.mode);
    }

    /// Start playback. A finished replay restarts from the beginning.
    pub fn play(&mut self) -> bool {
        match self.mode {
            ReplayMode::ReplayPaused => {}
            ReplayMode::ReplayEnded => self.elapsed_ms = 0.0,
            ReplayMode::Live | ReplayMode::ReplayPlaying => return false,
        }
        self.mode = ReplayMode::ReplayPlaying;
        debug!("Playing from {:.0} ms at {}", self.elapsed_ms, self.speed);
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.mode != ReplayMode::ReplayPlaying {
            return false;
        }
        self.mode = ReplayMode::ReplayPaused;
        debug!("Paused at {:.0} ms", self.elapsed_ms);
        true
    }

    /// Advance by `delta_ms` of wall-clock time scaled by the playback speed.
    /// Returns the virtual time actually advanced.
    pub fn tick(&mut self, delta_ms: f64) -> f64 {
        if self.mode != ReplayMode::ReplayPlaying {
            return 0.0;
        }
        let before = self.elapsed_ms;
        let step = delta_ms.max(0.0) * self.speed.multiplier() as f64;
        self.elapsed_ms = (self.elapsed_ms + step).clamp(0.0, self.duration_ms);
        if self.elapsed_ms >= self.duration_ms {
            self.elapsed_ms = self.duration_ms;
            self.mode = ReplayMode::ReplayEnded;
            debug!("Replay reached the end of the session");
        }
        self.elapsed_ms - before
    }

    /// Jump to a fraction of the session. Scrubbing always leaves the clock paused.
    pub fn scrub(&mut self, fraction: f64) {
        if self.mode == ReplayMode::Live {
            return;
        }
        self.mode = ReplayMode::ReplayPaused;
        self.elapsed_ms = clamp_fraction(fraction) * self.duration_ms;
    }

    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
    }

    pub fn progress(&self) -> f64 {
        if self.duration_ms > 0.0 {
            self.elapsed_ms / self.duration_ms
        } else {
            0.0
        }
    }

    /// Virtual instant up to which records are revealed.
    ///
    /// `None` means no truncation: in live mode, and for a zero-length session.
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        if self.mode == ReplayMode::Live || self.duration_ms <= 0.0 {
            return None;
        }
        let offset = Duration::microseconds((self.elapsed_ms * 1000.0).round() as i64);
        Some(self.bounds.start + offset)
    }
}
