//! Pathfinding timing buckets: last-query numbers plus a rolling window
//! that publishes averages every five seconds, so a host UI can show
//! "paths/s" without doing its own bookkeeping.

use std::time::Instant;

const STATS_WINDOW_SECS: f64 = 5.0;

/// Timing and throughput counters for path queries.
#[derive(Clone, Debug, Default)]
pub struct PathStats {
    /// Wall-clock milliseconds of the most recent `find_path`.
    pub last_path_ms: f64,
    /// Abstract-graph search share of the most recent HPA* query.
    pub hpa_abstract_ms: f64,
    /// Refinement share of the most recent HPA* query.
    pub hpa_refine_ms: f64,
    /// Cells/nodes expanded by the most recent query.
    pub nodes_explored: usize,

    /// Queries completed in the last published window.
    pub window_paths: u32,
    /// Total milliseconds spent pathfinding in the last published window.
    pub window_total_ms: f64,
    /// Average milliseconds per query over the last published window.
    pub avg_path_ms: f64,

    pending_paths: u32,
    pending_ms: f64,
    window_started: Option<Instant>,
}

impl PathStats {
    /// Fresh, zeroed stats.
    pub fn new() -> PathStats {
        PathStats::default()
    }

    /// Record one completed query.
    pub fn record_path(&mut self, ms: f64) {
        self.last_path_ms = ms;
        self.pending_paths += 1;
        self.pending_ms += ms;
    }

    /// Called once per tick; folds the pending counters into the published
    /// window every five seconds.
    pub fn update(&mut self) {
        let now = Instant::now();
        let started = *self.window_started.get_or_insert(now);
        if now.duration_since(started).as_secs_f64() >= STATS_WINDOW_SECS {
            self.window_paths = self.pending_paths;
            self.window_total_ms = self.pending_ms;
            self.avg_path_ms = if self.pending_paths > 0 {
                self.pending_ms / f64::from(self.pending_paths)
            } else {
                0.0
            };
            self.pending_paths = 0;
            self.pending_ms = 0.0;
            self.window_started = Some(now);
        }
    }

    /// Drop everything, pending and published. Used when switching the
    /// runtime path algorithm so windows do not mix measurements.
    pub fn reset(&mut self) {
        *self = PathStats::default();
    }
}
