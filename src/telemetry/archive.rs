use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{
    DriverInfo, IntervalSample, LapRecord, PitRecord, PositionSample, RaceControlEvent,
    Roster, SessionInfo, StintRecord, WeatherSample, build_roster,
};
use crate::{TarmacError, sync::RawStreams};

/// One line of a session archive file
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ArchiveRecord {
    Session(SessionInfo),
    Driver(DriverInfo),
    Position(PositionSample),
    Lap(LapRecord),
    Stint(StintRecord),
    Pit(PitRecord),
    RaceControl(RaceControlEvent),
    Interval(IntervalSample),
    Weather(WeatherSample),
}

/// Everything recorded for one finished session, as handed over by the polling layer.
#[derive(Clone, Debug)]
pub struct SessionArchive {
    pub info: SessionInfo,
    pub drivers: Vec<DriverInfo>,
    pub streams: RawStreams,
}

impl SessionArchive {
    pub fn from_records(
        records: impl IntoIterator<Item = ArchiveRecord>,
    ) -> Result<Self, TarmacError> {
        let mut info: Option<SessionInfo> = None;
        let mut drivers = Vec::new();
        let mut streams = RawStreams::default();

        for record in records {
            match record {
                ArchiveRecord::Session(session) => {
                    if let Some(previous) = &info {
                        warn!(
                            "Archive holds more than one session header, replacing {} with {}",
                            previous.session_key, session.session_key
                        );
                    }
                    info = Some(session);
                }
                ArchiveRecord::Driver(driver) => drivers.push(driver),
                other => push_stream_record(&mut streams, other),
            }
        }

        let info = info.ok_or(TarmacError::MissingSessionHeader)?;
        Ok(Self {
            info,
            drivers,
            streams,
        })
    }

    /// Add a record polled after the archive was loaded
    pub fn append(&mut self, record: ArchiveRecord) {
        match record {
            ArchiveRecord::Session(session) => {
                if session.session_key != self.info.session_key {
                    warn!(
                        "Ignoring header of session {} while replaying {}",
                        session.session_key, self.info.session_key
                    );
                } else {
                    self.info = session;
                }
            }
            ArchiveRecord::Driver(driver) => self.drivers.push(driver),
            other => push_stream_record(&mut self.streams, other),
        }
    }

    pub fn roster(&self) -> Roster {
        build_roster(&self.drivers)
    }
}

fn push_stream_record(streams: &mut RawStreams, record: ArchiveRecord) {
    match record {
        ArchiveRecord::Position(p) => streams.positions.get_or_insert_with(Vec::new).push(p),
        ArchiveRecord::Lap(l) => streams.laps.get_or_insert_with(Vec::new).push(l),
        ArchiveRecord::Stint(s) => streams.stints.get_or_insert_with(Vec::new).push(s),
        ArchiveRecord::Pit(p) => streams.pits.get_or_insert_with(Vec::new).push(p),
        ArchiveRecord::RaceControl(r) => streams.race_control.get_or_insert_with(Vec::new).push(r),
        ArchiveRecord::Interval(i) => streams.intervals.get_or_insert_with(Vec::new).push(i),
        ArchiveRecord::Weather(w) => streams.weather.get_or_insert_with(Vec::new).push(w),
        ArchiveRecord::Session(_) | ArchiveRecord::Driver(_) => {}
    }
}

pub fn load_session_archive(source_file: &Path) -> Result<SessionArchive, TarmacError> {
    if !source_file.exists() {
        return Err(TarmacError::InvalidArchiveFile {
            path: format!("{:?}", source_file),
        });
    }

    let records = serde_jsonlines::json_lines(source_file)
        .map_err(|e| TarmacError::ArchiveLoaderError { source: e })?
        .collect::<Result<Vec<ArchiveRecord>, std::io::Error>>()
        .map_err(|e| TarmacError::ArchiveLoaderError { source: e })?;
    let record_count = records.len();

    let archive = SessionArchive::from_records(records)?;
    info!(
        "Loaded {:?}: session {} ({}) with {} records and {} drivers",
        source_file,
        archive.info.session_key,
        archive.info.session_name,
        record_count,
        archive.drivers.len()
    );
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SESSION_LINE: &str = r#"{"Session":{"session_key":9158,"session_name":"Race","circuit_short_name":"Singapore","date_start":"2023-09-17T12:00:00+00:00","date_end":"2023-09-17T14:00:00+00:00"}}"#;

    #[test]
    fn test_load_archive_groups_streams() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", SESSION_LINE).unwrap();
        writeln!(
            file,
            r#"{{"Driver":{{"driver_number":55,"name_acronym":"SAI"}}}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"Position":{{"driver_number":55,"date":"2023-09-17T12:01:00+00:00","position":1}}}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"Lap":{{"driver_number":55,"lap_number":1,"date_start":"2023-09-17T12:03:00+00:00"}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let archive = load_session_archive(file.path()).unwrap();
        assert_eq!(archive.info.session_key, 9158);
        assert_eq!(archive.drivers.len(), 1);
        assert_eq!(archive.streams.positions.as_ref().map(Vec::len), Some(1));
        assert_eq!(archive.streams.laps.as_ref().map(Vec::len), Some(1));
        // streams without a single record stay absent
        assert!(archive.streams.intervals.is_none());
        assert!(archive.streams.weather.is_none());
        assert_eq!(archive.roster()[&55].name_acronym, "SAI");
    }

    #[test]
    fn test_archive_without_session_header_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"Driver":{{"driver_number":1,"name_acronym":"VER"}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        match load_session_archive(file.path()) {
            Err(TarmacError::MissingSessionHeader) => {}
            other => panic!("Expected MissingSessionHeader, got {:?}", other.map(|a| a.info)),
        }
    }

    #[test]
    fn test_append_polled_records() {
        let header: ArchiveRecord = serde_json::from_str(SESSION_LINE).unwrap();
        let mut archive = SessionArchive::from_records([header.clone()]).unwrap();
        assert!(archive.streams.laps.is_none());

        let lap: ArchiveRecord = serde_json::from_str(
            r#"{"Lap":{"driver_number":55,"lap_number":1,"lap_duration_ms":98123.0}}"#,
        )
        .unwrap();
        archive.append(lap);
        archive.append(header);
        assert_eq!(archive.streams.laps.as_ref().map(Vec::len), Some(1));
        assert_eq!(archive.info.session_key, 9158);
    }

    #[test]
    fn test_missing_archive_file() {
        let result = load_session_archive(Path::new("/definitely/not/here.jsonl"));
        assert!(matches!(result, Err(TarmacError::InvalidArchiveFile { .. })));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", SESSION_LINE).unwrap();
        writeln!(file, r#"{{"Lap":{{"driver_number":"one"}}}}"#).unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_session_archive(file.path()),
            Err(TarmacError::ArchiveLoaderError { .. })
        ));
    }
}
