// Atlas manager: the one object the renderer talks to.
//
// Cache and scheduler share one mutex; completions arrive on their own
// channel and are applied at frame start (or by `finish_pending`), never in
// the middle of a cache mutation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use rtsdf_core::{FontId, GlyphGenerator, GlyphKey, GlyphMetrics, PageId, PixelRect, UvRect};
use serde::Serialize;

use crate::cache::{AtlasSlot, AtlasUpdate, CacheStats, FrameClock, GlyphCache};
use crate::config::AtlasConfig;
use crate::error::{ConfigError, GlyphError};
use crate::scheduler::{
    CompletionReceiver, GenerationScheduler, GlyphRequest, PendingHandle, SchedulerStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ready,
    /// Draw a placeholder and ask again next frame.
    Pending,
    /// Draw a placeholder; see `ResolvedGlyph::error`.
    Failed,
}

/// Answer to `resolve_uv`. Geometry is zeroed unless `Ready`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGlyph {
    pub key: GlyphKey,
    pub availability: Availability,
    pub page: PageId,
    pub uv: UvRect,
    pub rect: PixelRect,
    pub metrics: GlyphMetrics,
    pub error: Option<GlyphError>,
}

impl ResolvedGlyph {
    fn ready(slot: &AtlasSlot) -> Self {
        Self {
            key: slot.key,
            availability: Availability::Ready,
            page: slot.page,
            uv: slot.uv,
            rect: slot.rect,
            metrics: slot.metrics,
            error: None,
        }
    }

    fn placeholder(key: GlyphKey, availability: Availability, error: Option<GlyphError>) -> Self {
        Self {
            key,
            availability,
            page: 0,
            uv: UvRect::default(),
            rect: PixelRect::default(),
            metrics: GlyphMetrics::default(),
            error,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.availability == Availability::Ready
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtlasStats {
    pub frame: u64,
    pub live_slots: usize,
    pub pending: usize,
    pub pages: u32,
    /// Allocated fraction of each open page.
    pub page_occupancy: Vec<f32>,
    pub cache: CacheStats,
    pub scheduler: SchedulerStats,
}

struct AtlasState {
    cache: GlyphCache,
    scheduler: GenerationScheduler,
}

pub struct AtlasManager {
    config: AtlasConfig,
    clock: FrameClock,
    state: Mutex<AtlasState>,
    completions: Mutex<CompletionReceiver>,
}

impl AtlasManager {
    pub fn new(config: AtlasConfig, generator: Arc<dyn GlyphGenerator>) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = FrameClock::new();
        let (scheduler, completions) = GenerationScheduler::new(&config, generator)?;
        let cache = GlyphCache::new(config.clone(), clock.clone());
        log::info!(
            "Glyph atlas: {0}x{0} pages (max {1}), {2} workers",
            config.page_size,
            config.max_pages,
            scheduler.worker_threads()
        );
        Ok(Self {
            config,
            clock,
            state: Mutex::new(AtlasState { cache, scheduler }),
            completions: Mutex::new(completions),
        })
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.clock.current()
    }

    /// Publish finished generations, then advance the frame tick. Completions
    /// are applied while the frame just drawn still pins its slots, so their
    /// inserts never evict a glyph that frame used. Returns the new frame number.
    pub fn begin_frame(&self) -> u64 {
        self.apply_completions();
        self.clock.advance()
    }

    /// Apply every completion that has arrived so far without waiting.
    pub fn apply_completions(&self) -> usize {
        let completions = match self.completions.try_lock() {
            Ok(rx) => rx.drain(),
            // `finish_pending` is waiting on the channel and applies what it gets.
            Err(TryLockError::WouldBlock) => return 0,
            Err(TryLockError::Poisoned(e)) => e.into_inner().drain(),
        };
        let count = completions.len();
        if count > 0 {
            let frame = self.clock.current();
            let mut state = self.lock_state();
            let AtlasState { cache, scheduler } = &mut *state;
            for completion in completions {
                scheduler.apply(completion, cache, frame);
            }
        }
        count
    }

    /// Page and UVs for `key`, touching and pinning it when cached,
    /// scheduling it otherwise. Never blocks on generation.
    pub fn resolve_uv(&self, key: GlyphKey) -> ResolvedGlyph {
        match self.request_glyph(key) {
            GlyphRequest::Ready(slot) => ResolvedGlyph::ready(&slot),
            GlyphRequest::Pending(_) => ResolvedGlyph::placeholder(key, Availability::Pending, None),
            GlyphRequest::Failed(error) => {
                ResolvedGlyph::placeholder(key, Availability::Failed, Some(error))
            }
        }
    }

    /// Like `resolve_uv`, but hands out the pending handle so a caller can
    /// wait for the outcome.
    pub fn request_glyph(&self, key: GlyphKey) -> GlyphRequest {
        let frame = self.clock.current();
        let mut state = self.lock_state();
        let AtlasState { cache, scheduler } = &mut *state;
        scheduler.request(key, cache, frame)
    }

    /// Texel changes since the last drain, in order. Each is reported once.
    pub fn drain_dirty_regions(&self) -> Vec<AtlasUpdate> {
        self.lock_state().cache.drain_updates()
    }

    /// Queue a batch of glyphs; returns handles for the ones not yet cached.
    pub fn warmup(&self, keys: impl IntoIterator<Item = GlyphKey>) -> Vec<PendingHandle> {
        let frame = self.clock.current();
        let mut state = self.lock_state();
        let AtlasState { cache, scheduler } = &mut *state;
        keys.into_iter()
            .filter_map(|key| match scheduler.request(key, cache, frame) {
                GlyphRequest::Pending(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    /// Block until every in-flight generation has been applied, or `timeout`
    /// passes. Not for the render path. Returns true when nothing is pending.
    pub fn finish_pending(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.apply_completions();
            if self.lock_state().scheduler.pending_count() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let completions = self.lock_completions().wait(deadline - now);
            if completions.is_empty() {
                continue;
            }
            let frame = self.clock.current();
            let mut state = self.lock_state();
            let AtlasState { cache, scheduler } = &mut *state;
            for completion in completions {
                scheduler.apply(completion, cache, frame);
            }
        }
    }

    pub fn evict_if_needed(&self, required_area: u64) -> Vec<GlyphKey> {
        let mut state = self.lock_state();
        let freed = state.cache.evict_if_needed(required_area);
        if !freed.is_empty() {
            state.scheduler.forget_atlas_full();
        }
        freed
    }

    /// Drop every slot of `font` and regenerate anything in flight for it.
    pub fn invalidate_font(&self, font: FontId) -> Vec<GlyphKey> {
        let mut state = self.lock_state();
        let evicted = state.cache.evict_font(font);
        let stale = state.scheduler.invalidate_font(font);
        state.scheduler.forget_atlas_full();
        log::debug!(
            "Invalidated font {font}: {} slots evicted, {stale} generations restarted",
            evicted.len()
        );
        evicted
    }

    pub fn reset_page(&self, page: PageId) -> Vec<GlyphKey> {
        let mut state = self.lock_state();
        let dropped = state.cache.clear_page(page);
        state.scheduler.forget_atlas_full();
        dropped
    }

    pub fn clear(&self) -> Vec<GlyphKey> {
        let mut state = self.lock_state();
        let dropped = state.cache.clear();
        state.scheduler.forget_atlas_full();
        dropped
    }

    /// Copy of a page's texels, for a full re-upload.
    pub fn page_pixels(&self, page: PageId) -> Option<Vec<u8>> {
        self.lock_state().cache.page_pixels(page).map(<[u8]>::to_vec)
    }

    pub fn page_count(&self) -> u32 {
        self.lock_state().cache.page_count()
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    pub fn stats(&self) -> AtlasStats {
        let state = self.lock_state();
        let pages = state.cache.page_count();
        AtlasStats {
            frame: self.clock.current(),
            live_slots: state.cache.len(),
            pending: state.scheduler.pending_count(),
            pages,
            page_occupancy: (0..pages).map(|p| state.cache.occupancy(p)).collect(),
            cache: state.cache.stats(),
            scheduler: state.scheduler.stats(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, AtlasState> {
        self.state.lock().expect("atlas state mutex poisoned")
    }

    fn lock_completions(&self) -> MutexGuard<'_, CompletionReceiver> {
        self.completions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
