//! Live status for a batch of concurrently running scans.
//!
//! `ProgressTracker` is a plain state machine whose `render` turns state into
//! text lines. `LiveProgress` is the thin terminal side: a ticker thread that
//! redraws the rendered lines through an indicatif bar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::format::format_bytes;

pub const TICK_INTERVAL: Duration = Duration::from_millis(80);

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Pending,
    Scanning,
    Complete,
    Error,
}

impl ScanStatus {
    fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Complete | ScanStatus::Error)
    }

    // Display order: running work first, untouched work last.
    fn rank(self) -> u8 {
        match self {
            ScanStatus::Scanning => 0,
            ScanStatus::Complete => 1,
            ScanStatus::Error => 2,
            ScanStatus::Pending => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerState {
    pub name: String,
    pub status: ScanStatus,
    pub size: Option<u64>,
    pub error: Option<String>,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
}

impl ScannerState {
    fn pending(name: String) -> Self {
        ScannerState {
            name,
            status: ScanStatus::Pending,
            size: None,
            error: None,
            started: None,
            finished: None,
        }
    }

    fn duration(&self, now: Instant) -> Option<Duration> {
        let started = self.started?;
        Some(self.finished.unwrap_or(now).saturating_duration_since(started))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total: usize,
    pub pending: usize,
    pub scanning: usize,
    pub complete: usize,
    pub error: usize,
}

#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    scanners: Vec<ScannerState>,
    frame: usize,
    stopped: bool,
}

impl ProgressTracker {
    /// The tracked set is fixed here; later updates for other names are ignored.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProgressTracker {
            started: Instant::now(),
            scanners: names.into_iter().map(|name| ScannerState::pending(name.into())).collect(),
            frame: 0,
            stopped: false,
        }
    }

    /// Apply a status change. Returns false when the name is unknown or the
    /// scanner already finished.
    pub fn update(
        &mut self,
        name: &str,
        status: ScanStatus,
        size: Option<u64>,
        error: Option<String>,
    ) -> bool {
        let Some(state) = self.scanners.iter_mut().find(|state| state.name == name) else {
            return false;
        };
        if state.status.is_terminal() {
            return false;
        }

        let now = Instant::now();
        match status {
            ScanStatus::Pending => return false,
            ScanStatus::Scanning => {
                state.started.get_or_insert(now);
            }
            ScanStatus::Complete | ScanStatus::Error => {
                state.started.get_or_insert(now);
                state.finished = Some(now);
            }
        }
        state.status = status;
        if size.is_some() {
            state.size = size;
        }
        if error.is_some() {
            state.error = error;
        }
        true
    }

    pub fn start(&mut self, name: &str) -> bool {
        self.update(name, ScanStatus::Scanning, None, None)
    }

    pub fn complete(&mut self, name: &str, size: u64) -> bool {
        self.update(name, ScanStatus::Complete, Some(size), None)
    }

    pub fn fail(&mut self, name: &str, error: impl Into<String>) -> bool {
        self.update(name, ScanStatus::Error, None, Some(error.into()))
    }

    pub fn state(&self, name: &str) -> Option<&ScannerState> {
        self.scanners.iter().find(|state| state.name == name)
    }

    pub fn summary(&self) -> ProgressSummary {
        let mut summary = ProgressSummary { total: self.scanners.len(), ..Default::default() };
        for state in &self.scanners {
            match state.status {
                ScanStatus::Pending => summary.pending += 1,
                ScanStatus::Scanning => summary.scanning += 1,
                ScanStatus::Complete => summary.complete += 1,
                ScanStatus::Error => summary.error += 1,
            }
        }
        summary
    }

    /// Advance the spinner one frame and render.
    pub fn tick(&mut self, now: Instant) -> Vec<String> {
        self.frame = self.frame.wrapping_add(1);
        self.render(now)
    }

    pub fn render(&self, now: Instant) -> Vec<String> {
        let summary = self.summary();
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let spinner = SPINNER[self.frame % SPINNER.len()];

        let mut lines = Vec::with_capacity(self.scanners.len() + 1);
        if self.stopped {
            lines.push(format!(
                "Scanned {} cache source(s) in {elapsed:.1}s: {} complete, {} failed",
                summary.total, summary.complete, summary.error
            ));
        } else {
            lines.push(format!(
                "{spinner} Scanning caches: {} active, {} complete, {} failed ({elapsed:.1}s)",
                summary.scanning, summary.complete, summary.error
            ));
        }

        let mut ordered: Vec<&ScannerState> = self.scanners.iter().collect();
        ordered.sort_by_key(|state| state.status.rank());
        for state in ordered {
            let seconds = state.duration(now).map(|d| d.as_secs_f64()).unwrap_or_default();
            let line = match state.status {
                ScanStatus::Scanning => format!("  {spinner} {} ({seconds:.1}s)", state.name),
                ScanStatus::Complete => format!(
                    "  ✓ {} {} ({seconds:.1}s)",
                    state.name,
                    format_bytes(state.size.unwrap_or_default())
                ),
                ScanStatus::Error => format!(
                    "  ✗ {} {}",
                    state.name,
                    state.error.as_deref().unwrap_or("failed")
                ),
                ScanStatus::Pending => format!("  · {}", state.name),
            };
            lines.push(line);
        }
        lines
    }

    /// Marks the session finished. Only the first call returns true.
    pub fn stop(&mut self) -> bool {
        !std::mem::replace(&mut self.stopped, true)
    }
}

/// Terminal driver around a shared `ProgressTracker`.
pub struct LiveProgress {
    tracker: Arc<Mutex<ProgressTracker>>,
    bar: ProgressBar,
    running: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl LiveProgress {
    pub fn start<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tracker = Arc::new(Mutex::new(ProgressTracker::new(names)));
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let running = Arc::new(AtomicBool::new(true));

        let ticker = {
            let tracker = Arc::clone(&tracker);
            let bar = bar.clone();
            let running = Arc::clone(&running);
            thread::spawn(move || {
                while running.load(Ordering::Acquire) {
                    let lines = lock(&tracker).tick(Instant::now());
                    bar.set_message(lines.join("\n"));
                    thread::sleep(TICK_INTERVAL);
                }
            })
        };

        LiveProgress { tracker, bar, running, ticker: Some(ticker) }
    }

    pub fn start_scan(&self, name: &str) {
        lock(&self.tracker).start(name);
    }

    pub fn complete(&self, name: &str, size: u64) {
        lock(&self.tracker).complete(name, size);
    }

    pub fn fail(&self, name: &str, error: &str) {
        lock(&self.tracker).fail(name, error);
    }

    pub fn summary(&self) -> ProgressSummary {
        lock(&self.tracker).summary()
    }

    /// Stop redrawing and clear the live view. Safe to call more than once.
    pub fn stop(&mut self) {
        let Some(ticker) = self.ticker.take() else { return };
        self.running.store(false, Ordering::Release);
        let _ = ticker.join();
        lock(&self.tracker).stop();
        self.bar.finish_and_clear();
    }
}

impl Drop for LiveProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(tracker: &Mutex<ProgressTracker>) -> MutexGuard<'_, ProgressTracker> {
    tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
