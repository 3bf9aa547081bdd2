//! Processing rate tracking

use serde::Serialize;
use std::time::{Duration, Instant};

/// Rate tracker for one processing phase
///
/// Logs the rate over the last interval every `report_every` items.
#[derive(Debug)]
pub struct PhaseStats {
    name: &'static str,
    report_every: u64,
    started: Instant,
    last_report: Instant,
    last_report_items: u64,
    items: u64,
    finished: Option<Duration>,
}

/// Final figures for one phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseSummary {
    /// Wall time spent in the phase, in seconds
    pub total_time_seconds: f64,
    /// Items processed
    pub items: u64,
    /// Items per second over the whole phase
    pub average_rate: f64,
}

impl PhaseStats {
    /// Start timing a phase
    pub fn start(name: &'static str, report_every: u64) -> Self {
        let now = Instant::now();
        Self {
            name,
            report_every: report_every.max(1),
            started: now,
            last_report: now,
            last_report_items: 0,
            items: 0,
            finished: None,
        }
    }

    /// Count one processed item
    pub fn tick(&mut self) {
        self.items += 1;
        if self.items % self.report_every == 0 {
            let now = Instant::now();
            let elapsed = now.duration_since(self.last_report).as_secs_f64();
            if elapsed > 0.0 {
                let rate = (self.items - self.last_report_items) as f64 / elapsed;
                tracing::info!("{} rate: {rate:.2}/second ({} so far)", self.name, self.items);
            }
            self.last_report = now;
            self.last_report_items = self.items;
        }
    }

    /// Stop the clock
    pub fn finish(&mut self) {
        if self.finished.is_none() {
            self.finished = Some(self.started.elapsed());
        }
    }

    /// Summary figures; uses the elapsed time so far if not finished
    pub fn summary(&self) -> PhaseSummary {
        let elapsed = self
            .finished
            .unwrap_or_else(|| self.started.elapsed())
            .as_secs_f64();
        let average_rate = if elapsed > 0.0 {
            self.items as f64 / elapsed
        } else {
            0.0
        };
        PhaseSummary {
            total_time_seconds: (elapsed * 100.0).round() / 100.0,
            items: self.items,
            average_rate: (average_rate * 100.0).round() / 100.0,
        }
    }
}
