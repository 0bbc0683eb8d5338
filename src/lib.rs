// Library interface for tarmac
// The binary and the integration tests drive the engine through these modules

pub mod analytics;
pub mod config;
pub mod errors;
pub mod geometry;
pub mod projection;
pub mod rate_limit;
pub mod replay;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use config::ReplayConfig;
pub use errors::TarmacError;
pub use geometry::{Circuit, LngLat, TrackPolyline, load_circuit};
pub use rate_limit::RateLimiter;
pub use replay::{FrameView, PlaybackSpeed, ReplayController, ReplayEngine, ReplayMode, SessionClock};
pub use sync::{FilteredStreams, RawStreams, StreamSynchronizer, sync};
pub use telemetry::{SessionArchive, load_session_archive};
