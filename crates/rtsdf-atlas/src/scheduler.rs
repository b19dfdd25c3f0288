// Generation scheduler: one in-flight generation per key, run on the worker
// pool, published into the cache only when the owner applies completions.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rtsdf_core::{FontId, GenerateError, GlyphBitmap, GlyphGenerator, GlyphKey};
use serde::Serialize;

use crate::cache::{AtlasSlot, GlyphCache};
use crate::config::AtlasConfig;
use crate::error::{ConfigError, GlyphError};
use crate::pool::WorkerPool;

pub type GlyphOutcome = Result<AtlasSlot, GlyphError>;

// ──────────────────────────────────────────────
// Pending handles
// ──────────────────────────────────────────────

#[derive(Default)]
struct PendingShared {
    outcome: Mutex<Option<GlyphOutcome>>,
    done: Condvar,
}

impl PendingShared {
    fn complete(&self, outcome: GlyphOutcome) {
        let mut slot = self.outcome.lock().expect("pending outcome mutex poisoned");
        *slot = Some(outcome);
        drop(slot);
        self.done.notify_all();
    }
}

/// Shared view of an in-flight request. Every caller that asked for the same
/// key while it was pending holds a handle to the same outcome.
#[derive(Clone)]
pub struct PendingHandle {
    key: GlyphKey,
    shared: Arc<PendingShared>,
}

impl PendingHandle {
    pub fn key(&self) -> GlyphKey {
        self.key
    }

    pub fn try_outcome(&self) -> Option<GlyphOutcome> {
        self.shared
            .outcome
            .lock()
            .expect("pending outcome mutex poisoned")
            .clone()
    }

    pub fn is_done(&self) -> bool {
        self.try_outcome().is_some()
    }

    /// Block until the outcome is published or `timeout` passes.
    /// Outcomes are published when completions are applied, so some other
    /// thread must be driving frames or `finish_pending`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<GlyphOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self
            .shared
            .outcome
            .lock()
            .expect("pending outcome mutex poisoned");
        while outcome.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            outcome = self
                .shared
                .done
                .wait_timeout(outcome, deadline - now)
                .expect("pending outcome condvar wait failed")
                .0;
        }
        outcome.clone()
    }

    pub fn same_request(&self, other: &PendingHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandle")
            .field("key", &self.key)
            .field("done", &self.is_done())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum GlyphRequest {
    Ready(AtlasSlot),
    Pending(PendingHandle),
    Failed(GlyphError),
}

// ──────────────────────────────────────────────
// Completions
// ──────────────────────────────────────────────

/// Result of one worker job, applied on the owner's side.
pub struct Completion {
    key: GlyphKey,
    version: u64,
    result: Result<GlyphBitmap, GenerateError>,
    attempts: u32,
}

/// Receiving end of the completion channel. Kept apart from the cache state
/// so a caller can block on it without holding the atlas lock.
pub struct CompletionReceiver {
    rx: mpsc::Receiver<Completion>,
}

impl CompletionReceiver {
    pub fn drain(&self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }

    /// Wait for at least one completion, then take every queued one.
    pub fn wait(&self, timeout: Duration) -> Vec<Completion> {
        match self.rx.recv_timeout(timeout) {
            Ok(first) => {
                let mut all = vec![first];
                all.extend(self.rx.try_iter());
                all
            }
            Err(_) => Vec::new(),
        }
    }
}

// ──────────────────────────────────────────────
// Scheduler
// ──────────────────────────────────────────────

struct PendingRequest {
    version: u64,
    shared: Arc<PendingShared>,
    /// The font changed while generating; the result must not be used.
    stale: bool,
    submitted_at: Instant,
}

struct FailedEntry {
    error: GlyphError,
    /// Frame from which the key may be requested again. `None` is permanent.
    retry_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub superseded: u64,
    pub failed: u64,
    pub retries: u64,
}

pub struct GenerationScheduler {
    generator: Arc<dyn GlyphGenerator>,
    pool: WorkerPool,
    tx: mpsc::Sender<Completion>,
    generation_attempts: u32,
    atlas_full_retry_frames: u64,
    pending: HashMap<GlyphKey, PendingRequest>,
    failed: HashMap<GlyphKey, FailedEntry>,
    next_version: u64,
    stats: SchedulerStats,
}

impl GenerationScheduler {
    pub fn new(
        config: &AtlasConfig,
        generator: Arc<dyn GlyphGenerator>,
    ) -> Result<(Self, CompletionReceiver), ConfigError> {
        let pool = WorkerPool::new(config.effective_worker_threads())
            .map_err(|e| ConfigError::WorkerSpawn(e.to_string()))?;
        let (tx, rx) = mpsc::channel();
        let scheduler = Self {
            generator,
            pool,
            tx,
            generation_attempts: config.generation_attempts,
            atlas_full_retry_frames: config.atlas_full_retry_frames,
            pending: HashMap::new(),
            failed: HashMap::new(),
            next_version: 1,
            stats: SchedulerStats::default(),
        };
        Ok((scheduler, CompletionReceiver { rx }))
    }

    /// Serve `key` from the cache, attach to its in-flight request, or start one.
    pub fn request(&mut self, key: GlyphKey, cache: &mut GlyphCache, frame: u64) -> GlyphRequest {
        if let Some(slot) = cache.lookup(&key) {
            return GlyphRequest::Ready(slot);
        }

        if let Some(entry) = self.failed.get(&key) {
            let retry_now = entry.retry_at.is_some_and(|at| frame >= at);
            if !retry_now {
                return GlyphRequest::Failed(entry.error.clone());
            }
            self.failed.remove(&key);
        }

        if let Some(pending) = self.pending.get(&key) {
            return GlyphRequest::Pending(PendingHandle {
                key,
                shared: Arc::clone(&pending.shared),
            });
        }

        let shared = Arc::new(PendingShared::default());
        let version = self.submit(key);
        self.pending.insert(
            key,
            PendingRequest {
                version,
                shared: Arc::clone(&shared),
                stale: false,
                submitted_at: Instant::now(),
            },
        );
        GlyphRequest::Pending(PendingHandle { key, shared })
    }

    fn submit(&mut self, key: GlyphKey) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        self.stats.submitted += 1;

        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();
        let max_attempts = self.generation_attempts;
        let job = Box::new(move || {
            let mut attempts = 0;
            let result = loop {
                attempts += 1;
                let result = catch_unwind(AssertUnwindSafe(|| generator.generate(&key)))
                    .unwrap_or_else(|_| {
                        Err(GenerateError::GenerationFailed("generator panicked".into()))
                    });
                match result {
                    Err(err) if !err.is_permanent() && attempts < max_attempts => {
                        log::debug!("Retrying {key:?} after failure: {err}");
                    }
                    other => break other,
                }
            };
            // The receiver is gone only when the atlas is shutting down.
            let _ = tx.send(Completion {
                key,
                version,
                result,
                attempts,
            });
        });

        if !self.pool.submit(job) {
            log::error!("Worker pool closed; {key:?} will not be generated");
            let _ = self.tx.send(Completion {
                key,
                version,
                result: Err(GenerateError::GenerationFailed("worker pool closed".into())),
                attempts: 0,
            });
        }
        version
    }

    /// Publish one finished generation.
    pub fn apply(&mut self, completion: Completion, cache: &mut GlyphCache, frame: u64) {
        let Completion {
            key,
            version,
            result,
            attempts,
        } = completion;
        self.stats.completed += 1;
        self.stats.retries += u64::from(attempts.saturating_sub(1));

        let Some(pending) = self.pending.get_mut(&key) else {
            self.stats.superseded += 1;
            log::debug!("Dropped completion for {key:?}: no pending request");
            return;
        };
        if pending.version != version {
            self.stats.superseded += 1;
            log::debug!("Dropped completion for {key:?}: version {version} superseded");
            return;
        }
        if pending.stale {
            // Same waiters, fresh generation. The previous call has returned,
            // so the two never overlap.
            self.stats.superseded += 1;
            let version = self.submit(key);
            if let Some(pending) = self.pending.get_mut(&key) {
                pending.version = version;
                pending.stale = false;
                pending.submitted_at = Instant::now();
            }
            log::debug!("Regenerating {key:?} after invalidation");
            return;
        }

        let Some(pending) = self.pending.remove(&key) else {
            return;
        };
        log::trace!(
            "Generated {key:?} in {:?} ({attempts} attempt(s))",
            pending.submitted_at.elapsed()
        );

        if let Some(slot) = cache.peek(&key) {
            // A valid slot already serves the key; the new bitmap is redundant.
            self.stats.superseded += 1;
            pending.shared.complete(Ok(slot.clone()));
            return;
        }

        let outcome = result
            .map_err(GlyphError::from)
            .and_then(|bitmap| cache.insert(key, bitmap, version).map_err(GlyphError::from));

        if let Err(error) = &outcome {
            self.stats.failed += 1;
            let retry_at =
                (!error.is_permanent()).then(|| frame + self.atlas_full_retry_frames.max(1));
            log::warn!("Glyph {key:?} failed: {error}");
            self.failed.insert(
                key,
                FailedEntry {
                    error: error.clone(),
                    retry_at,
                },
            );
        }
        pending.shared.complete(outcome);
    }

    /// Mark in-flight work for `font` stale and forget its failures.
    pub fn invalidate_font(&mut self, font: FontId) -> usize {
        self.failed.retain(|key, _| key.font != font);
        let mut marked = 0;
        for (key, pending) in self.pending.iter_mut() {
            if key.font == font {
                pending.stale = true;
                marked += 1;
            }
        }
        marked
    }

    /// Atlas space was released; keys that failed for lack of it may retry now.
    pub fn forget_atlas_full(&mut self) {
        self.failed
            .retain(|_, entry| entry.error != GlyphError::AtlasFull);
    }

    pub fn is_pending(&self, key: &GlyphKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn failure(&self, key: &GlyphKey) -> Option<&GlyphError> {
        self.failed.get(key).map(|entry| &entry.error)
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.threads()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }
}
