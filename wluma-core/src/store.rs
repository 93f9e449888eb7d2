// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain-text persistence of the training set.
//!
//! One record per line, `<lux> <luma> <backlight>` separated by single
//! spaces, written in set order. The file lives at
//! `${XDG_DATA_HOME:-$HOME/.local/share}/wluma/data` and is opened with
//! `O_DSYNC` so a confirmed edit reaches stable storage before the save
//! returns; a crash loses at most the edit being saved.

use std::env;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use rustix::fs::{Mode, OFlags};
use thiserror::Error;
use tracing::debug;

use crate::point::TrainingPoint;
use crate::training::TrainingSet;

/// Errors from opening, loading or saving the training store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Neither `$XDG_DATA_HOME` nor `$HOME` is available.
    #[error("neither $XDG_DATA_HOME nor $HOME is set")]
    NoDataDir,
    /// The data directory could not be created.
    #[error("unable to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: rustix::io::Errno,
    },
    /// The data file could not be opened.
    #[error("unable to open data file {path}: {source}")]
    Open {
        path: PathBuf,
        source: rustix::io::Errno,
    },
    /// Reading or writing the already-open file failed.
    #[error("training data i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// A line is not three in-range integers.
    #[error("malformed training record on line {line}: {content:?}")]
    Malformed { line: usize, content: String },
}

/// Handle to the on-disk training data file.
///
/// The file is opened once, read-write, for the process lifetime. Every
/// [`save`](Self::save) truncates and rewrites the whole set; every
/// [`load`](Self::load) parses it from the start.
#[derive(Debug)]
pub struct TrainingStore {
    file: File,
    path: PathBuf,
}

impl TrainingStore {
    /// Opens the store at the default XDG location, creating the `wluma`
    /// data directory (mode `0700`) and the file (mode `0600`) on first
    /// run.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = default_data_dir()?;
        match rustix::fs::mkdir(&dir, Mode::RWXU) {
            Ok(()) | Err(rustix::io::Errno::EXIST) => {}
            Err(source) => return Err(StoreError::CreateDir { path: dir, source }),
        }
        Self::open_at(dir.join("data"))
    }

    /// Opens (or creates) the store at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, StoreError> {
        let flags = OFlags::RDWR | OFlags::CREATE | OFlags::DSYNC | OFlags::CLOEXEC;
        let fd = rustix::fs::open(&path, flags, Mode::RUSR | Mode::WUSR)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "opened training store");
        Ok(Self {
            file: File::from(fd),
            path,
        })
    }

    /// Parses the whole file into a training set.
    ///
    /// Any malformed line fails the load; the caller is expected to log and
    /// start from an empty set. The file itself is left untouched.
    pub fn load(&mut self) -> Result<TrainingSet, StoreError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        self.file.read_to_string(&mut content)?;

        let points = parse_points(&content)?;
        Ok(TrainingSet::from_points(points))
    }

    /// Truncates the file and rewrites every point in set order.
    pub fn save(&mut self, set: &TrainingSet) -> Result<(), StoreError> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(encode_points(set.points()).as_bytes())?;
        debug!(path = %self.path.display(), points = set.len(), "saved training data");
        Ok(())
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn default_data_dir() -> Result<PathBuf, StoreError> {
    if let Some(base) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(base).join("wluma"));
    }
    match env::var_os("HOME").filter(|v| !v.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join(".local/share/wluma")),
        None => Err(StoreError::NoDataDir),
    }
}

/// Parses the text format: one `<lux> <luma> <backlight>` record per line.
pub fn parse_points(content: &str) -> Result<Vec<TrainingPoint>, StoreError> {
    let mut points = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let malformed = || StoreError::Malformed {
            line: index + 1,
            content: line.to_string(),
        };

        let mut fields = line.split_whitespace();
        let lux: i64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(malformed)?;
        let luma: u8 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(malformed)?;
        let backlight: u8 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(malformed)?;

        if fields.next().is_some() || lux < 0 || luma > 100 || backlight > 100 {
            return Err(malformed());
        }
        points.push(TrainingPoint::new(lux, luma, backlight));
    }
    Ok(points)
}

/// Encodes points into the text format, one line per point.
#[must_use]
pub fn encode_points(points: &[TrainingPoint]) -> String {
    let mut out = String::new();
    for point in points {
        out.push_str(&format!("{} {} {}\n", point.lux, point.luma, point.backlight));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{TrainingStore, encode_points, parse_points};
    use crate::point::TrainingPoint;
    use crate::training::TrainingSet;

    fn scratch_file(name: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "wluma-store-test-{}-{unique}-{name}",
            std::process::id()
        ))
    }

    #[test]
    fn encode_writes_one_record_per_line() {
        let points = [
            TrainingPoint::new(200, 50, 70),
            TrainingPoint::new(0, 100, 1),
        ];
        assert_eq!(encode_points(&points), "200 50 70\n0 100 1\n");
    }

    #[test]
    fn parse_round_trips_encode() {
        let points = vec![
            TrainingPoint::new(0, 0, 1),
            TrainingPoint::new(12345, 67, 89),
            TrainingPoint::new(7, 100, 100),
        ];
        assert_eq!(parse_points(&encode_points(&points)).unwrap(), points);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(parse_points("200 50\n").is_err());
        assert!(parse_points("200 50 70 9\n").is_err());
        assert!(parse_points("abc 50 70\n").is_err());
        assert!(parse_points("200 50 70\ngarbage\n").is_err());
        assert!(parse_points("-5 50 70\n").is_err());
        assert!(parse_points("200 101 70\n").is_err());
    }

    #[test]
    fn parse_of_empty_file_is_an_empty_set() {
        assert_eq!(parse_points("").unwrap(), Vec::new());
    }

    #[test]
    fn save_then_load_round_trips_the_set() {
        let path = scratch_file("round-trip");
        let mut store = TrainingStore::open_at(path.clone()).unwrap();

        let set = TrainingSet::from_points(vec![
            TrainingPoint::new(200, 50, 70),
            TrainingPoint::new(500, 20, 90),
        ]);
        store.save(&set).unwrap();

        let mut reopened = TrainingStore::open_at(path.clone()).unwrap();
        assert_eq!(reopened.load().unwrap(), set);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn save_truncates_previous_contents() {
        let path = scratch_file("truncate");
        let mut store = TrainingStore::open_at(path.clone()).unwrap();

        let big = TrainingSet::from_points(vec![
            TrainingPoint::new(11111, 50, 70),
            TrainingPoint::new(22222, 60, 80),
        ]);
        store.save(&big).unwrap();

        let small = TrainingSet::from_points(vec![TrainingPoint::new(1, 2, 3)]);
        store.save(&small).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1 2 3\n");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn load_of_corrupt_file_fails_without_deleting_it() {
        let path = scratch_file("corrupt");
        std::fs::write(&path, "200 50 70\nnot a record\n").unwrap();

        let mut store = TrainingStore::open_at(path.clone()).unwrap();
        assert!(store.load().is_err());
        assert!(path.exists(), "load must not remove the file");

        let _ = std::fs::remove_file(path);
    }
}
