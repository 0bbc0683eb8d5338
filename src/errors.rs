// Error types for tarmac

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum TarmacError {
    // Session archive errors
    #[snafu(display("Session archive not found: {path}"))]
    InvalidArchiveFile { path: String },
    #[snafu(display("Error reading session archive"))]
    ArchiveLoaderError { source: io::Error },
    #[snafu(display("Session archive has no session header"))]
    MissingSessionHeader,

    // Circuit geometry errors
    #[snafu(display("Error reading circuit file"))]
    CircuitIOError { source: io::Error },
    #[snafu(display("Error parsing circuit GeoJSON"))]
    CircuitParseError { source: serde_json::Error },
    #[snafu(display("Circuit geometry is unusable: {reason}"))]
    CircuitGeometryError { reason: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Command line surface errors
    #[snafu(display("Could not start the frame loop"))]
    RuntimeError { source: io::Error },
    #[snafu(display("Error writing snapshot"))]
    SnapshotWriteError { source: io::Error },
    #[snafu(display("Error serializing snapshot"))]
    SnapshotSerializeError { source: serde_json::Error },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}
