use std::time::{Duration, Instant};

use log::debug;

use super::clock::{PlaybackSpeed, ReplayMode, SessionClock};
use crate::telemetry::SessionBounds;

/// Recurring frame subscription held only while the clock is playing.
///
/// Measures real time between invocations so playback speed does not depend on
/// how often frames are requested.
#[derive(Debug, Default)]
pub struct FrameTicker {
    last_frame: Option<Instant>,
    frames: u64,
}

impl FrameTicker {
    fn new() -> Self {
        Self::default()
    }

    /// Wall-clock time since the previous invocation. The first call only sets the baseline.
    fn advance(&mut self, now: Instant) -> Duration {
        let delta = match self.last_frame {
            Some(previous) => now.saturating_duration_since(previous),
            None => Duration::ZERO,
        };
        self.last_frame = Some(now);
        self.frames += 1;
        delta
    }
}

/// Drives a [`SessionClock`] from frame callbacks
#[derive(Debug)]
pub struct ReplayController {
    clock: SessionClock,
    ticker: Option<FrameTicker>,
}

impl ReplayController {
    pub fn new(bounds: SessionBounds) -> Self {
        Self {
            clock: SessionClock::new(bounds),
            ticker: None,
        }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn toggle_replay(&mut self) {
        self.clock.toggle_replay();
        self.sync_ticker();
    }

    pub fn play(&mut self) {
        self.clock.play();
        self.sync_ticker();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        self.sync_ticker();
    }

    pub fn scrub(&mut self, fraction: f64) {
        self.clock.scrub(fraction);
        self.sync_ticker();
    }

    /// Applied from the next frame on
    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.clock.set_speed(speed);
    }

    /// Advance the clock by the real time elapsed since the previous frame.
    /// Returns the virtual milliseconds advanced.
    pub fn frame(&mut self, now: Instant) -> f64 {
        let Some(ticker) = self.ticker.as_mut() else {
            return 0.0;
        };
        let delta = ticker.advance(now);
        let advanced = self.clock.tick(delta.as_secs_f64() * 1000.0);
        self.sync_ticker();
        advanced
    }

    fn sync_ticker(&mut self) {
        let playing = self.clock.mode() == ReplayMode::ReplayPlaying;
        match (playing, self.ticker.take()) {
            (true, None) => {
                debug!("Subscribing frame ticker");
                self.ticker = Some(FrameTicker::new());
            }
            (true, Some(ticker)) => self.ticker = Some(ticker),
            (false, Some(ticker)) => {
                debug!("Frame ticker cancelled after {} frames", ticker.frames);
            }
            (false, None) => {}
        }
    }
}
