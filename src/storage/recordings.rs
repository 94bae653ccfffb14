//! Recording file naming and discovery
//!
//! Recordings are named `YYYY-MM-DD_HHMMSS.<ext>`. The name is the only
//! record of when a message was left, so playback parses it back to build
//! the spoken introduction.

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::{debug, warn};

const STAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";
/// Length of a formatted stamp, e.g. `2024-03-09_141502`
const STAMP_LEN: usize = 17;

/// Timestamp encoded in a recording's filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordingStamp(NaiveDateTime);

impl RecordingStamp {
    pub fn new(at: NaiveDateTime) -> Self {
        // Filenames only carry whole seconds
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    /// Filename for a recording made at this time
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0.format(STAMP_FORMAT), extension)
    }

    /// Parse a filename produced by [`RecordingStamp::file_name`]
    pub fn parse_file_name(name: &str, extension: &str) -> Option<Self> {
        let stem = name.strip_suffix(extension)?.strip_suffix('.')?;
        if stem.len() != STAMP_LEN {
            return None;
        }
        NaiveDateTime::parse_from_str(stem, STAMP_FORMAT)
            .ok()
            .map(Self)
    }

    /// Spoken introduction played before the message
    pub fn introduction(&self) -> String {
        let at = self.0;
        let month = month_name(at.month());
        let (is_pm, hour) = at.hour12();
        let minute = match at.minute() {
            0 => "o'clock".to_string(),
            m if m < 10 => format!("oh {}", m),
            m => m.to_string(),
        };
        let am_pm = if is_pm { "P.M." } else { "A.M." };

        format!(
            "Recorded on {} {} at {} {} {}",
            month,
            at.day(),
            hour,
            minute,
            am_pm
        )
    }
}

impl std::fmt::Display for RecordingStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

fn month_name(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    MONTHS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("")
}

/// A recording found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub path: PathBuf,
    pub stamp: RecordingStamp,
}

/// Directory holding the recordings
#[derive(Debug, Clone)]
pub struct RecordingStore {
    directory: PathBuf,
    extension: String,
}

impl RecordingStore {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path for a new recording made at `at`
    pub fn path_for(&self, at: NaiveDateTime) -> PathBuf {
        self.directory
            .join(RecordingStamp::new(at).file_name(&self.extension))
    }

    /// All recognised recordings, newest first.
    ///
    /// Files that do not follow the naming pattern are skipped. A missing
    /// or unreadable directory yields an empty list.
    pub fn list_newest_first(&self) -> Vec<Recording> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = ?self.directory, error = %e, "cannot list recordings");
                return Vec::new();
            }
        };

        let mut recordings: Vec<Recording> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                match RecordingStamp::parse_file_name(name, &self.extension) {
                    Some(stamp) => Some(Recording {
                        path: entry.path(),
                        stamp,
                    }),
                    None => {
                        debug!(file = name, "skipping unrecognised file");
                        None
                    }
                }
            })
            .collect();

        recordings.sort_by(|a, b| b.stamp.cmp(&a.stamp).then_with(|| b.path.cmp(&a.path)));
        recordings
    }
}
