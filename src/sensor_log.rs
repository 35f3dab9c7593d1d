// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use canonical_error::{CanonicalError, unavailable_error};
use chrono::offset::Local;
use log::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// Append-only readings log, one timestamped line per entry. Kept separate
// from the application log so the data stream stays machine-parseable.
pub struct SensorLog {
    path: PathBuf,
    file: File,
}

impl SensorLog {
    pub fn new(log_dir: &Path, filename: &str) -> Result<Self, CanonicalError> {
        fs::create_dir_all(log_dir)
            .map_err(|e| unavailable_error(
                &format!("Failed to create {:?}: {:?}", log_dir, e)))?;
        let path = log_dir.join(filename);
        let file = OpenOptions::new().create(true).append(true).open(&path)
            .map_err(|e| unavailable_error(
                &format!("Failed to open {:?}: {:?}", path, e)))?;
        Ok(SensorLog { path, file })
    }

    /// Append a timestamped line. Write failures are warned and dropped so a
    /// full disk cannot take down the read path.
    pub fn append(&mut self, payload: &str) {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let line = format_line(&timestamp, payload);
        let result = self.file.write_all(line.as_bytes())
            .and_then(|()| self.file.flush());
        if let Err(e) = result {
            warn!("Failed to append to {:?}: {:?}", self.path, e);
        }
    }
}

fn format_line(timestamp: &str, payload: &str) -> String {
    format!("{},{}\n", timestamp, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_format_line() {
        assert_eq!(format_line("2025-06-01 12:34:56.789", "23.50,30.25"),
                   "2025-06-01 12:34:56.789,23.50,30.25\n");
    }

    #[test]
    fn test_append() {
        let dir = env::temp_dir().join(
            format!("sensor_log_test_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut log = SensorLog::new(&dir, "fir.txt").unwrap();
        log.append("23.50,30.25");
        log.append("READ_ERROR,bus timeout");

        let contents = fs::read_to_string(dir.join("fir.txt")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(",23.50,30.25"));
        assert!(lines[1].ends_with(",READ_ERROR,bus timeout"));

        // Each line starts with a full "YYYY-MM-DD HH:MM:SS.mmm" timestamp.
        assert_eq!(lines[0].split(',').next().unwrap().len(), 23);

        // Reopening appends rather than truncating.
        drop(log);
        let mut log = SensorLog::new(&dir, "fir.txt").unwrap();
        log.append("24.00,31.00");
        let contents = fs::read_to_string(dir.join("fir.txt")).unwrap();
        assert_eq!(contents.lines().count(), 3);

        fs::remove_dir_all(&dir).unwrap();
    }
}
