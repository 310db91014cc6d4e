//! Upload sessions: the mutable per-file record of chunking and transfer progress.
//!
//! The partition pass publishes the chunk list and content hash into a
//! session exactly once; the scheduler then moves per-chunk loaded bytes and
//! recomputes progress and speed through [`UploadSession::update_progress`].

mod chunk;
mod progress;

pub use chunk::{Chunk, FileInformation};
pub use progress::ProgressSnapshot;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::source::SourceFile;

/// Weight of one instantaneous speed sample in the average speed.
pub const SPEED_SMOOTHING: f64 = 0.1;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct SessionState {
    content_hash: String,
    chunks: Vec<Chunk>,
    /// Parallel to `chunks`.
    loaded: Vec<u64>,
    progress: f64,
    current_speed: f64,
    average_speed: f64,
    last_update: Instant,
}

impl SessionState {
    fn loaded_sum(&self) -> u64 {
        self.loaded.iter().sum()
    }

    fn update_progress(&mut self, total_size: u64, now: Instant) {
        let delta_ms = now.saturating_duration_since(self.last_update).as_millis();
        if delta_ms == 0 || total_size == 0 {
            return;
        }
        let total = total_size as f64;
        let new_progress = self.loaded_sum() as f64 / total;
        // A reset (abort) can lower loaded bytes below the last progress.
        let increase = ((new_progress - self.progress) * total).max(0.0);
        let current_speed = increase / delta_ms as f64 * 1000.0;
        self.current_speed = current_speed;
        self.average_speed =
            SPEED_SMOOTHING * current_speed + (1.0 - SPEED_SMOOTHING) * self.average_speed;
        self.last_update = now;
        self.progress = new_progress.max(self.progress);
    }
}

/// Mutable record tracking one file's chunking, hashing and transfer progress.
///
/// Shared as `Arc<UploadSession>` between the caller, the scheduler loop and
/// in-flight request tasks; all mutable state sits behind one lock.
#[derive(Debug)]
pub struct UploadSession {
    id: SessionId,
    source: SourceFile,
    state: RwLock<SessionState>,
}

impl UploadSession {
    /// New session for `source` with no chunks yet.
    pub fn new(source: SourceFile) -> Self {
        Self {
            id: SessionId::next(),
            source,
            state: RwLock::new(SessionState {
                content_hash: String::new(),
                chunks: Vec::new(),
                loaded: Vec::new(),
                progress: 0.0,
                current_speed: 0.0,
                average_speed: 0.0,
                last_update: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn total_size(&self) -> u64 {
        self.source.size()
    }

    /// Content hash (empty until the partition pass has finished).
    pub fn content_hash(&self) -> String {
        self.state.read().unwrap().content_hash.clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.read().unwrap().chunks.len()
    }

    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        self.state.read().unwrap().chunks.get(index).cloned()
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        self.state.read().unwrap().chunks.clone()
    }

    /// True once the partition pass has published chunks.
    pub fn is_ready(&self) -> bool {
        !self.state.read().unwrap().chunks.is_empty()
    }

    /// Whole-file descriptor (None before partitioning).
    pub fn file_information(&self) -> Option<FileInformation> {
        self.state
            .read()
            .unwrap()
            .chunks
            .first()
            .map(Chunk::file_information)
    }

    /// Install the result of a finished partition pass and zero the loaded bytes.
    pub(crate) fn publish_partition(&self, chunks: Vec<Chunk>, content_hash: String) {
        let mut s = self.state.write().unwrap();
        s.loaded = vec![0; chunks.len()];
        s.chunks = chunks;
        s.content_hash = content_hash;
    }

    pub fn loaded_bytes(&self) -> Vec<u64> {
        self.state.read().unwrap().loaded.clone()
    }

    /// Set the loaded bytes of one chunk. Out-of-range indices are ignored.
    pub fn set_chunk_loaded(&self, index: usize, bytes: u64) {
        let mut s = self.state.write().unwrap();
        if let Some(slot) = s.loaded.get_mut(index) {
            *slot = bytes;
        }
    }

    /// Mark one chunk as fully transferred.
    pub fn mark_chunk_loaded(&self, index: usize) {
        let mut s = self.state.write().unwrap();
        if let Some(size) = s.chunks.get(index).map(|c| c.current_size) {
            s.loaded[index] = size;
        }
    }

    /// Mark every chunk as fully transferred.
    pub fn mark_all_loaded(&self) {
        let mut s = self.state.write().unwrap();
        let sizes: Vec<u64> = s.chunks.iter().map(|c| c.current_size).collect();
        s.loaded = sizes;
    }

    /// Every chunk's loaded bytes reached its size (and there is at least one chunk).
    pub fn is_complete(&self) -> bool {
        let s = self.state.read().unwrap();
        !s.chunks.is_empty()
            && s.chunks
                .iter()
                .zip(&s.loaded)
                .all(|(chunk, loaded)| *loaded >= chunk.current_size)
    }

    /// Recompute progress fraction, instantaneous and average speed from the
    /// current loaded bytes. No-op when no time has elapsed since the last update.
    pub fn update_progress(&self) {
        self.update_progress_at(Instant::now());
    }

    pub fn update_progress_at(&self, now: Instant) {
        let total = self.total_size();
        self.state.write().unwrap().update_progress(total, now);
    }

    /// Record a chunk-level byte update and, if `interval` has elapsed since
    /// the last progress update, recompute progress.
    ///
    /// The loaded bytes are always stored. Returns true when progress was
    /// recomputed, i.e. when the caller should emit a progress event.
    pub fn record_chunk_bytes(
        &self,
        index: usize,
        bytes: u64,
        interval: Duration,
        now: Instant,
    ) -> bool {
        let total = self.total_size();
        let mut s = self.state.write().unwrap();
        if let Some(slot) = s.loaded.get_mut(index) {
            *slot = bytes;
        }
        if now.saturating_duration_since(s.last_update) >= interval {
            s.update_progress(total, now);
            true
        } else {
            false
        }
    }

    /// True if `interval` has elapsed since the last progress update.
    pub fn interval_elapsed(&self, interval: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.state.read().unwrap().last_update) >= interval
    }

    /// Restart the speed clock (called when an upload starts).
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, now: Instant) {
        self.state.write().unwrap().last_update = now;
    }

    /// Zero every chunk's loaded bytes and both speeds (pause, cancel, fail).
    ///
    /// The progress fraction is left alone; it only ever grows through
    /// `update_progress`.
    pub fn reset_transfer(&self) {
        let mut s = self.state.write().unwrap();
        let n = s.chunks.len();
        s.loaded = vec![0; n];
        s.current_speed = 0.0;
        s.average_speed = 0.0;
    }

    pub fn progress(&self) -> f64 {
        self.state.read().unwrap().progress
    }

    pub fn current_speed(&self) -> f64 {
        self.state.read().unwrap().current_speed
    }

    pub fn average_speed(&self) -> f64 {
        self.state.read().unwrap().average_speed
    }

    pub fn last_update(&self) -> Instant {
        self.state.read().unwrap().last_update
    }

    pub fn progress_snapshot(&self) -> ProgressSnapshot {
        let s = self.state.read().unwrap();
        ProgressSnapshot {
            loaded_bytes: s.loaded_sum(),
            total_bytes: self.source.size(),
            fraction: s.progress,
            current_speed: s.current_speed,
            average_speed: s.average_speed,
            chunks_done: s
                .chunks
                .iter()
                .zip(&s.loaded)
                .filter(|(chunk, loaded)| **loaded >= chunk.current_size)
                .count(),
            chunk_count: s.chunks.len(),
        }
    }
}
