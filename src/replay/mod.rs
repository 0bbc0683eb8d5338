pub mod clock;
pub mod controller;
pub mod engine;

pub use clock::{PlaybackSpeed, ReplayMode, SessionClock};
pub use controller::{FrameTicker, ReplayController};
pub use engine::{FrameView, LapAggregates, ReplayEngine};
