//! Flight recorder
//!
//! The calculation worker records every processed fix. Fixes are buffered and
//! appended to the log file in batches; `close` writes out whatever is still
//! buffered. A failed write keeps the batch for the next attempt.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::blackboard::SensorState;
use crate::registry::SubsystemError;

/// Buffered fixes written out in one append
pub const FLUSH_THRESHOLD: usize = 32;

/// One logged position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub vario: f64,
}

impl Fix {
    /// `None` for samples without a time fix
    pub fn from_sensor(sensor: &SensorState) -> Option<Self> {
        Some(Self {
            time: sensor.time?,
            latitude: sensor.latitude,
            longitude: sensor.longitude,
            altitude: sensor.altitude,
            vario: sensor.vario,
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.1},{:.2}\n",
            self.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.latitude,
            self.longitude,
            self.altitude,
            self.vario
        )
    }
}

#[derive(Debug, Default)]
struct LogBuffer {
    pending: Vec<Fix>,
    written: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct FlightLogger {
    path: PathBuf,
    buffer: Mutex<LogBuffer>,
}

impl FlightLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "FlightLogger::new: called");
        Self {
            path,
            buffer: Mutex::new(LogBuffer::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer a fix; true if it was taken
    ///
    /// Samples without a fix and samples arriving after close are skipped.
    pub fn record(&self, sensor: &SensorState) -> Result<bool, SubsystemError> {
        let Some(fix) = Fix::from_sensor(sensor) else {
            return Ok(false);
        };
        let mut buffer = self.buffer.lock();
        if buffer.closed {
            debug!("FlightLogger::record: closed, fix skipped");
            return Ok(false);
        }
        buffer.pending.push(fix);
        if buffer.pending.len() >= FLUSH_THRESHOLD {
            self.write_out(&mut buffer)?;
        }
        Ok(true)
    }

    /// Append buffered fixes to the log file; returns how many were written
    pub fn flush(&self) -> Result<usize, SubsystemError> {
        let mut buffer = self.buffer.lock();
        self.write_out(&mut buffer)
    }

    /// Flush and stop recording; a second close writes nothing
    pub fn close(&self) -> Result<usize, SubsystemError> {
        let mut buffer = self.buffer.lock();
        if buffer.closed {
            return Ok(0);
        }
        let written = self.write_out(&mut buffer)?;
        buffer.closed = true;
        info!(path = %self.path.display(), total = buffer.written, "Flight log closed");
        Ok(written)
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().pending.len()
    }

    /// Fixes written to the file since construction
    pub fn written(&self) -> u64 {
        self.buffer.lock().written
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.lock().closed
    }

    fn write_out(&self, buffer: &mut LogBuffer) -> Result<usize, SubsystemError> {
        if buffer.pending.is_empty() {
            return Ok(0);
        }
        let io_err = |source| SubsystemError::Io {
            id: "flight_logger".to_string(),
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let lines: String = buffer.pending.iter().map(Fix::to_line).collect();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(lines.as_bytes()).map_err(io_err)?;

        let count = buffer.pending.len();
        buffer.pending.clear();
        buffer.written += count as u64;
        debug!(count, path = %self.path.display(), "FlightLogger: batch written");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(altitude: f64) -> SensorState {
        SensorState {
            time: Some(Utc::now()),
            latitude: -36.5,
            longitude: 146.0,
            altitude,
            vario: 1.25,
            ..Default::default()
        }
    }

    #[test]
    fn test_record_buffers_until_flush() {
        let dir = TempDir::new().unwrap();
        let logger = FlightLogger::new(dir.path().join("logs").join("flight.csv"));

        assert!(logger.record(&sample(1000.0)).unwrap());
        assert!(logger.record(&sample(1001.0)).unwrap());
        assert_eq!(logger.pending(), 2);
        assert!(!logger.path().exists());

        assert_eq!(logger.flush().unwrap(), 2);
        assert_eq!(logger.pending(), 0);
        let content = fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().next().unwrap().ends_with(",1000.0,1.25"));
    }

    #[test]
    fn test_samples_without_fix_are_skipped() {
        let dir = TempDir::new().unwrap();
        let logger = FlightLogger::new(dir.path().join("flight.csv"));
        assert!(!logger.record(&SensorState::default()).unwrap());
        assert_eq!(logger.pending(), 0);
    }

    #[test]
    fn test_threshold_triggers_write() {
        let dir = TempDir::new().unwrap();
        let logger = FlightLogger::new(dir.path().join("flight.csv"));
        for i in 0..FLUSH_THRESHOLD {
            logger.record(&sample(i as f64)).unwrap();
        }
        assert_eq!(logger.pending(), 0);
        assert_eq!(logger.written(), FLUSH_THRESHOLD as u64);
    }

    #[test]
    fn test_close_flushes_then_refuses() {
        let dir = TempDir::new().unwrap();
        let logger = FlightLogger::new(dir.path().join("flight.csv"));
        logger.record(&sample(900.0)).unwrap();

        assert_eq!(logger.close().unwrap(), 1);
        assert!(logger.is_closed());
        assert_eq!(logger.close().unwrap(), 0);
        assert!(!logger.record(&sample(901.0)).unwrap());
        assert_eq!(fs::read_to_string(logger.path()).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_failed_write_keeps_batch() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let path = dir.path().join("flight.csv");
        fs::create_dir_all(&path).unwrap();
        let logger = FlightLogger::new(&path);
        logger.record(&sample(500.0)).unwrap();

        assert!(logger.flush().is_err());
        assert_eq!(logger.pending(), 1);
    }

    #[test]
    fn test_appends_across_loggers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flight.csv");
        for run in 0..2 {
            let logger = FlightLogger::new(&path);
            logger.record(&sample(run as f64)).unwrap();
            logger.close().unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
