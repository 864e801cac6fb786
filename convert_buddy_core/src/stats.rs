//! Monotone counters, timers and peaks owned by the kernel (spec §3 "Stats").
//!
//! `Stats` is handed out by value everywhere (to `stats()` callers and to
//! progress callbacks) so a host can retain a snapshot without holding a
//! reference into the kernel — see spec §9 "Callback control flow": budget
//! exactly one snapshot allocation (here, zero allocations at all, since the
//! type is entirely `Copy` scalars) per callback invocation.

use serde::Serialize;

use crate::config::Format;

/// A read-only, `Copy` snapshot of kernel counters. Timers read as zero
/// unless `profile` was enabled at construction (spec §6 `profile`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks_in: u64,
    pub chunks_out: u64,
    pub records_processed: u64,
    pub records_filtered: u64,

    pub parse_time_ms: f64,
    pub transform_time_ms: f64,
    pub write_time_ms: f64,

    pub max_buffer_size: usize,
    pub current_partial_size: usize,

    /// The format `auto` detection resolved to, once known. `None` before
    /// resolution or when a concrete format was configured explicitly.
    pub resolved_format: Option<Format>,
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            bytes_in: 0,
            bytes_out: 0,
            chunks_in: 0,
            chunks_out: 0,
            records_processed: 0,
            records_filtered: 0,
            parse_time_ms: 0.0,
            transform_time_ms: 0.0,
            write_time_ms: 0.0,
            max_buffer_size: 0,
            current_partial_size: 0,
            resolved_format: None,
        }
    }

    /// `bytesIn / (parseMs + transformMs + writeMs)` (spec §3). Zero when no
    /// time has been recorded (profiling off, or no bytes have been read
    /// yet) rather than dividing by zero.
    pub fn throughput_mb_per_sec(&self) -> f64 {
        let total_ms = self.parse_time_ms + self.transform_time_ms + self.write_time_ms;
        if total_ms <= 0.0 {
            return 0.0;
        }
        let mb = self.bytes_in as f64 / (1024.0 * 1024.0);
        mb / (total_ms / 1000.0)
    }

    pub(crate) fn note_buffer_size(&mut self, current: usize) {
        self.current_partial_size = current;
        if current > self.max_buffer_size {
            self.max_buffer_size = current;
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Stats::new()
    }
}

/// Accumulates wall-clock time around a block of work when profiling is on.
/// A no-op when `enabled` is false, so the hot path pays nothing beyond one
/// branch.
pub(crate) struct Timer {
    start: Option<web_time::Instant>,
}

impl Timer {
    pub fn start(enabled: bool) -> Self {
        Timer {
            start: if enabled {
                Some(web_time::Instant::now())
            } else {
                None
            },
        }
    }

    /// Returns elapsed milliseconds, or 0.0 if profiling was disabled.
    pub fn stop(self) -> f64 {
        match self.start {
            Some(start) => start.elapsed().as_secs_f64() * 1000.0,
            None => 0.0,
        }
    }
}
