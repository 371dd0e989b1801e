//! Bounded-cost directory sizing.
//!
//! A full walk is attempted first. When it runs past the wall-clock budget or
//! visits more entries than allowed, the walk is abandoned and the top-level
//! listing is sampled instead. Sampled results are flagged as `estimated`.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use tracing::debug;
use walkdir::WalkDir;

pub const DEFAULT_BUDGET: Duration = Duration::from_secs(8);
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    pub bytes: u64,
    pub estimated: bool,
    pub last_modified: Option<SystemTime>,
}

impl Measurement {
    fn exact(bytes: u64, last_modified: Option<SystemTime>) -> Self {
        Measurement { bytes, estimated: false, last_modified }
    }

    /// Fold another measurement into this one.
    pub fn merge(&mut self, other: Measurement) {
        self.bytes = self.bytes.saturating_add(other.bytes);
        self.estimated |= other.estimated;
        self.last_modified = newest(self.last_modified, other.last_modified);
    }
}

#[derive(Debug, Clone)]
pub struct SizeEstimator {
    budget: Duration,
    max_entries: usize,
    sample_size: usize,
}

impl Default for SizeEstimator {
    fn default() -> Self {
        SizeEstimator {
            budget: DEFAULT_BUDGET,
            max_entries: DEFAULT_MAX_ENTRIES,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl SizeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Exact size when the walk finishes in time, otherwise an estimate.
    pub fn measure(&self, path: &Path) -> Measurement {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return Measurement::default(),
        };
        if !metadata.is_dir() {
            return Measurement::exact(metadata.len(), metadata.modified().ok());
        }

        let deadline = Instant::now() + self.budget;
        let mut total = 0u64;
        let mut visited = 0usize;
        let mut modified = None;

        for entry in WalkDir::new(path).follow_links(false) {
            if visited >= self.max_entries || Instant::now() >= deadline {
                debug!(
                    path = %path.display(),
                    visited,
                    "walk exceeded its budget, falling back to sampling"
                );
                let mut sampled = self.estimate(path);
                sampled.bytes = sampled.bytes.max(total);
                sampled.estimated = true;
                sampled.last_modified = newest(sampled.last_modified, modified);
                return sampled;
            }
            visited += 1;

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Skipping {:?}: {}", err.path(), err);
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!("Skipping {}: {}", entry.path().display(), err);
                    continue;
                }
            };
            modified = newest(modified, metadata.modified().ok());
            if metadata.is_file() {
                total = total.saturating_add(metadata.len());
            }
        }

        Measurement::exact(total, modified)
    }

    /// Sample the top-level listing and extrapolate to the full entry count.
    ///
    /// Assumes entries are roughly uniform in size, so directories dominated
    /// by a handful of huge files will be under- or over-estimated.
    pub fn estimate(&self, path: &Path) -> Measurement {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return Measurement::default(),
        };
        if !metadata.is_dir() {
            return Measurement::exact(metadata.len(), metadata.modified().ok());
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Skipping {}: {}", path.display(), err);
                return Measurement { estimated: true, ..Measurement::default() };
            }
        };

        let mut count = 0u64;
        let mut sampled = 0u64;
        let mut sampled_bytes = 0u64;
        let mut modified = metadata.modified().ok();
        for entry in entries.flatten() {
            count += 1;
            if sampled as usize >= self.sample_size {
                continue;
            }
            let Ok(entry_meta) = entry.metadata() else { continue };
            sampled += 1;
            modified = newest(modified, entry_meta.modified().ok());
            let bytes = if entry_meta.is_dir() {
                self.shallow_size(&entry.path())
            } else {
                entry_meta.len()
            };
            sampled_bytes = sampled_bytes.saturating_add(bytes);
        }

        let bytes = if sampled == 0 {
            0
        } else {
            let scaled = u128::from(sampled_bytes) * u128::from(count) / u128::from(sampled);
            u64::try_from(scaled).unwrap_or(u64::MAX)
        };
        Measurement { bytes, estimated: true, last_modified: modified }
    }

    // Sum of the regular files directly inside `dir`, capped at the sample size.
    fn shallow_size(&self, dir: &Path) -> u64 {
        let Ok(entries) = fs::read_dir(dir) else { return 0 };
        entries
            .flatten()
            .take(self.sample_size)
            .filter_map(|entry| entry.metadata().ok())
            .filter(|meta| meta.is_file())
            .fold(0u64, |acc, meta| acc.saturating_add(meta.len()))
    }
}

fn newest(a: Option<SystemTime>, b: Option<SystemTime>) -> Option<SystemTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
