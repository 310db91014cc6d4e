//! Progress snapshots handed to event consumers.
//!
//! A snapshot is a copy taken under the session lock, so consumers can format
//! rate and ETA without holding it.

/// Point-in-time view of one session's transfer progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Sum of per-chunk loaded bytes.
    pub loaded_bytes: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Monotonic progress fraction in [0.0, 1.0] as last computed by `update_progress`.
    pub fraction: f64,
    /// Instantaneous speed in bytes per second.
    pub current_speed: f64,
    /// Smoothed (EMA) speed in bytes per second.
    pub average_speed: f64,
    /// Chunks whose loaded bytes reached their size.
    pub chunks_done: usize,
    pub chunk_count: usize,
}

impl ProgressSnapshot {
    /// Progress as a percentage rounded to one decimal.
    pub fn percent(&self) -> f64 {
        (self.fraction * 1000.0).round() / 10.0
    }

    /// Estimated seconds remaining from the average speed
    /// (None if the speed is 0; Some(0) once every byte is loaded).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.loaded_bytes);
        if remaining == 0 {
            return Some(0.0);
        }
        if self.average_speed <= 0.0 {
            return None;
        }
        Some(remaining as f64 / self.average_speed)
    }
}
