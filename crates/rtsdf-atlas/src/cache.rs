// Glyph cache: owns every atlas slot, the page pixel buffers and the LRU order.
//
// Slots live in an index-stable vector; the key map and the LRU map refer to
// them by id. Every mutation that changes texels appends to the update log,
// which the manager hands to the renderer in order.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use rtsdf_core::{
    FontId, GlyphBitmap, GlyphKey, GlyphMetrics, PageId, PixelRect, UvRect, BYTES_PER_TEXEL,
};

use crate::config::{AtlasConfig, BudgetExhaustion};
use crate::error::InsertError;
use crate::packer::{AtlasPacker, PackError};
use crate::page::AtlasPage;

pub type SlotId = u32;

// ──────────────────────────────────────────────
// Frame clock
// ──────────────────────────────────────────────

/// Global frame counter shared by the resolving path and the workers.
#[derive(Debug, Clone, Default)]
pub struct FrameClock(Arc<AtomicU64>);

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance by one frame and return the new frame number.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

// ──────────────────────────────────────────────
// Slots and updates
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AtlasSlot {
    pub id: SlotId,
    pub key: GlyphKey,
    pub page: PageId,
    /// Glyph texels; zero-sized for glyphs that draw nothing.
    pub rect: PixelRect,
    pub uv: UvRect,
    pub metrics: GlyphMetrics,
    pub last_access: u64,
    /// Frame of the last lookup or touch. Inserts do not pin.
    pub last_frame: Option<u64>,
    pub version: u64,
}

impl AtlasSlot {
    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }
}

struct SlotEntry {
    slot: AtlasSlot,
    /// Packer rectangle: the glyph rect plus padding.
    alloc: PixelRect,
}

/// One change to page texels, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum AtlasUpdate {
    /// New texels for `rect` (the slot's allocation, padding included).
    Commit {
        page: PageId,
        rect: PixelRect,
        key: GlyphKey,
        pixels: Vec<u8>,
    },
    /// `rect` no longer belongs to `key` and may be reused by a later commit.
    Evicted {
        page: PageId,
        rect: PixelRect,
        key: GlyphKey,
    },
    /// Every texel of the page is zero and unowned.
    PageCleared { page: PageId },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub pinned_skips: u64,
    pub failed_inserts: u64,
}

// ──────────────────────────────────────────────
// Cache
// ──────────────────────────────────────────────

pub struct GlyphCache {
    config: AtlasConfig,
    clock: FrameClock,
    packer: AtlasPacker,
    pages: Vec<AtlasPage>,
    index: HashMap<GlyphKey, SlotId>,
    slots: Vec<Option<SlotEntry>>,
    free_ids: Vec<SlotId>,
    /// Access tick -> slot, oldest first. Empty slots are never in here.
    lru: BTreeMap<u64, SlotId>,
    tick: u64,
    updates: Vec<AtlasUpdate>,
    stats: CacheStats,
}

impl GlyphCache {
    pub fn new(config: AtlasConfig, clock: FrameClock) -> Self {
        let packer = AtlasPacker::new(config.page_size, config.max_pages, config.seal_threshold);
        Self {
            config,
            clock,
            packer,
            pages: Vec::new(),
            index: HashMap::new(),
            slots: Vec::new(),
            free_ids: Vec::new(),
            lru: BTreeMap::new(),
            tick: 0,
            updates: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &GlyphKey) -> bool {
        self.index.contains_key(key)
    }

    /// Hit: refresh recency and pin the slot for the current frame.
    pub fn lookup(&mut self, key: &GlyphKey) -> Option<AtlasSlot> {
        match self.index.get(key).copied() {
            Some(id) => {
                self.stats.hits += 1;
                self.touch_slot(id);
                self.slot(id).cloned()
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Read a slot without touching it.
    pub fn peek(&self, key: &GlyphKey) -> Option<&AtlasSlot> {
        self.index.get(key).and_then(|&id| self.slot(id))
    }

    pub fn touch(&mut self, key: &GlyphKey) -> bool {
        match self.index.get(key).copied() {
            Some(id) => {
                self.touch_slot(id);
                true
            }
            None => false,
        }
    }

    /// Place a bitmap, evicting least-recently-used slots if the pages are full.
    /// Inserting a key that already has a slot returns that slot unchanged.
    pub fn insert(
        &mut self,
        key: GlyphKey,
        bitmap: GlyphBitmap,
        version: u64,
    ) -> Result<AtlasSlot, InsertError> {
        if let Some(slot) = self.peek(&key) {
            return Ok(slot.clone());
        }
        let result = self.place(key, bitmap, version);
        match &result {
            Ok(_) => self.stats.insertions += 1,
            Err(err) => {
                self.stats.failed_inserts += 1;
                log::warn!("Insert of {key:?} failed: {err}");
            }
        }
        result
    }

    fn place(
        &mut self,
        key: GlyphKey,
        bitmap: GlyphBitmap,
        version: u64,
    ) -> Result<AtlasSlot, InsertError> {
        let expected = bitmap.expected_len();
        if bitmap.pixels.len() != expected {
            return Err(InsertError::InvalidBitmap {
                expected,
                actual: bitmap.pixels.len(),
            });
        }
        let page_size = self.config.page_size;
        if bitmap.width > page_size || bitmap.height > page_size {
            return Err(InsertError::TooLarge {
                width: bitmap.width,
                height: bitmap.height,
                page_size,
            });
        }

        if bitmap.is_empty() {
            let slot = self.new_slot(key, 0, PixelRect::default(), bitmap.metrics, version);
            self.store(slot.clone(), PixelRect::default());
            return Ok(slot);
        }

        let padding = self.config.padding;
        let alloc_w = (bitmap.width + padding).min(page_size);
        let alloc_h = (bitmap.height + padding).min(page_size);
        let (page, alloc) = self.make_room(alloc_w, alloc_h)?;

        let rect = PixelRect::new(alloc.x, alloc.y, bitmap.width, bitmap.height);
        let pixels = pad_pixels(&bitmap, alloc_w, alloc_h);
        self.pages[page as usize].write_region(alloc, &pixels);
        self.updates.push(AtlasUpdate::Commit {
            page,
            rect: alloc,
            key,
            pixels,
        });

        let mut slot = self.new_slot(key, page, rect, bitmap.metrics, version);
        self.tick += 1;
        slot.last_access = self.tick;
        self.lru.insert(self.tick, slot.id);
        self.store(slot.clone(), alloc);
        log::trace!("Inserted {key:?} at page {page} {rect:?}");
        Ok(slot)
    }

    /// Allocate, opening pages and then evicting within the budget.
    fn make_room(&mut self, width: u32, height: u32) -> Result<(PageId, PixelRect), InsertError> {
        if let Some(placed) = self.try_allocate(width, height)? {
            return Ok(placed);
        }

        let mut attempts = 0;
        let mut after: Option<u64> = None;
        while attempts < self.config.eviction_budget {
            let Some((tick, id)) = self.next_lru(after) else {
                break;
            };
            attempts += 1;
            if self.is_pinned(id) {
                self.stats.pinned_skips += 1;
                after = Some(tick);
                continue;
            }
            self.evict_slot(id);
            if let Some(placed) = self.try_allocate(width, height)? {
                return Ok(placed);
            }
        }

        if self.config.budget_exhaustion == BudgetExhaustion::ForceEvictPinned {
            while let Some((_, id)) = self.next_lru(None) {
                log::warn!("Eviction budget exhausted: force-evicting pinned slot {id}");
                self.evict_slot(id);
                if let Some(placed) = self.try_allocate(width, height)? {
                    return Ok(placed);
                }
            }
        }
        Err(InsertError::AtlasFull)
    }

    fn try_allocate(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Option<(PageId, PixelRect)>, InsertError> {
        loop {
            match self.packer.allocate(width, height) {
                Ok(placed) => return Ok(Some(placed)),
                Err(PackError::TooLarge) => {
                    return Err(InsertError::TooLarge {
                        width,
                        height,
                        page_size: self.config.page_size,
                    })
                }
                Err(PackError::Full) => match self.packer.open_page() {
                    Some(_) => self.pages.push(AtlasPage::new(self.config.page_size)),
                    None => return Ok(None),
                },
            }
        }
    }

    /// Evict least-recently-used unpinned slots until `required_area` texels
    /// are free across the page budget, or the eviction budget runs out.
    pub fn evict_if_needed(&mut self, required_area: u64) -> Vec<GlyphKey> {
        let mut freed = Vec::new();
        let mut attempts = 0;
        let mut after: Option<u64> = None;
        while self.free_area() < required_area && attempts < self.config.eviction_budget {
            let Some((tick, id)) = self.next_lru(after) else {
                break;
            };
            attempts += 1;
            if self.is_pinned(id) {
                self.stats.pinned_skips += 1;
                after = Some(tick);
                continue;
            }
            if let Some(key) = self.evict_slot(id) {
                freed.push(key);
            }
        }
        freed
    }

    /// Texels not claimed by any slot, counting pages not yet opened.
    pub fn free_area(&self) -> u64 {
        let page_area = self.config.page_size as u64 * self.config.page_size as u64;
        (page_area * self.config.max_pages as u64).saturating_sub(self.packer.used_area())
    }

    /// Remove every slot of `font`, empty glyphs included.
    pub fn evict_font(&mut self, font: FontId) -> Vec<GlyphKey> {
        let ids: Vec<SlotId> = self
            .index
            .iter()
            .filter(|(key, _)| key.font == font)
            .map(|(_, &id)| id)
            .collect();
        ids.into_iter().filter_map(|id| self.evict_slot(id)).collect()
    }

    /// Drop every slot on `page` and zero its texels.
    pub fn clear_page(&mut self, page: PageId) -> Vec<GlyphKey> {
        if page as usize >= self.pages.len() {
            return Vec::new();
        }
        let ids: Vec<SlotId> = self
            .slots
            .iter()
            .flatten()
            .filter(|e| e.slot.page == page && !e.slot.is_empty())
            .map(|e| e.slot.id)
            .collect();
        let keys: Vec<GlyphKey> = ids
            .into_iter()
            .filter_map(|id| self.remove_slot(id, false))
            .collect();
        self.packer.reset(page);
        self.pages[page as usize].clear();
        self.updates.push(AtlasUpdate::PageCleared { page });
        log::debug!("Cleared atlas page {page}: {} slots dropped", keys.len());
        keys
    }

    /// Drop every slot and zero every page.
    pub fn clear(&mut self) -> Vec<GlyphKey> {
        let mut keys = Vec::new();
        for page in 0..self.pages.len() as PageId {
            keys.extend(self.clear_page(page));
        }
        // Empty glyphs own no texels.
        let empty: Vec<SlotId> = self.slots.iter().flatten().map(|e| e.slot.id).collect();
        keys.extend(empty.into_iter().filter_map(|id| self.remove_slot(id, false)));
        keys
    }

    pub fn drain_updates(&mut self) -> Vec<AtlasUpdate> {
        std::mem::take(&mut self.updates)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    pub fn page_pixels(&self, page: PageId) -> Option<&[u8]> {
        self.pages.get(page as usize).map(AtlasPage::pixels)
    }

    pub fn occupancy(&self, page: PageId) -> f32 {
        self.packer.occupancy(page)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Slots in eviction order, oldest first.
    pub fn lru_keys(&self) -> Vec<GlyphKey> {
        self.lru
            .values()
            .filter_map(|&id| self.slot(id).map(|s| s.key))
            .collect()
    }

    // ── internals ──

    fn slot(&self, id: SlotId) -> Option<&AtlasSlot> {
        self.slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .map(|e| &e.slot)
    }

    fn is_pinned(&self, id: SlotId) -> bool {
        let frame = self.clock.current();
        self.slot(id).is_some_and(|s| s.last_frame == Some(frame))
    }

    fn next_lru(&self, after: Option<u64>) -> Option<(u64, SlotId)> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.lru
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(&tick, &id)| (tick, id))
    }

    fn touch_slot(&mut self, id: SlotId) {
        self.tick += 1;
        let tick = self.tick;
        let frame = self.clock.current();
        let Some(entry) = self.slots.get_mut(id as usize).and_then(Option::as_mut) else {
            return;
        };
        entry.slot.last_frame = Some(frame);
        if entry.slot.is_empty() {
            return;
        }
        self.lru.remove(&entry.slot.last_access);
        entry.slot.last_access = tick;
        self.lru.insert(tick, id);
    }

    fn new_slot(
        &mut self,
        key: GlyphKey,
        page: PageId,
        rect: PixelRect,
        metrics: GlyphMetrics,
        version: u64,
    ) -> AtlasSlot {
        let id = self.free_ids.pop().unwrap_or(self.slots.len() as SlotId);
        AtlasSlot {
            id,
            key,
            page,
            rect,
            uv: UvRect::from_rect(rect, self.config.page_size),
            metrics,
            last_access: 0,
            last_frame: None,
            version,
        }
    }

    fn store(&mut self, slot: AtlasSlot, alloc: PixelRect) {
        let id = slot.id as usize;
        self.index.insert(slot.key, slot.id);
        if id == self.slots.len() {
            self.slots.push(Some(SlotEntry { slot, alloc }));
        } else {
            self.slots[id] = Some(SlotEntry { slot, alloc });
        }
    }

    fn evict_slot(&mut self, id: SlotId) -> Option<GlyphKey> {
        let key = self.remove_slot(id, true)?;
        self.stats.evictions += 1;
        log::debug!("Evicted {key:?}");
        Some(key)
    }

    /// Forget a slot. With `release`, its rectangle goes back to the packer;
    /// an `Evicted` update always precedes any commit that reuses it.
    fn remove_slot(&mut self, id: SlotId, release: bool) -> Option<GlyphKey> {
        let entry = self.slots.get_mut(id as usize)?.take()?;
        let slot = entry.slot;
        self.index.remove(&slot.key);
        self.free_ids.push(id);
        if slot.is_empty() {
            return Some(slot.key);
        }
        self.lru.remove(&slot.last_access);
        if release {
            self.packer.free(slot.page, entry.alloc);
        }
        self.updates.push(AtlasUpdate::Evicted {
            page: slot.page,
            rect: entry.alloc,
            key: slot.key,
        });
        Some(slot.key)
    }
}

/// Copy a bitmap into a zeroed buffer of the allocation size.
fn pad_pixels(bitmap: &GlyphBitmap, alloc_w: u32, alloc_h: u32) -> Vec<u8> {
    if alloc_w == bitmap.width && alloc_h == bitmap.height {
        return bitmap.pixels.clone();
    }
    let src_row = bitmap.width as usize * BYTES_PER_TEXEL;
    let dst_row = alloc_w as usize * BYTES_PER_TEXEL;
    let mut out = vec![0u8; dst_row * alloc_h as usize];
    for (row, src) in bitmap.pixels.chunks_exact(src_row).enumerate() {
        out[row * dst_row..row * dst_row + src_row].copy_from_slice(src);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtsdf_core::ChannelMode;

    fn key(glyph: u16) -> GlyphKey {
        GlyphKey::new(0, glyph, 32, ChannelMode::Msdf)
    }

    fn bitmap(width: u32, height: u32, fill: u8) -> GlyphBitmap {
        GlyphBitmap {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize * BYTES_PER_TEXEL],
            metrics: GlyphMetrics::default(),
        }
    }

    /// One 64x64 page holding exactly four 32x32 glyphs.
    fn small_cache(clock: &FrameClock) -> GlyphCache {
        let config = AtlasConfig {
            page_size: 64,
            max_pages: 1,
            padding: 0,
            eviction_budget: 8,
            ..AtlasConfig::default()
        };
        GlyphCache::new(config, clock.clone())
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        assert!(cache.lookup(&key(1)).is_none());
        let slot = cache.insert(key(1), bitmap(32, 32, 7), 1).unwrap();
        let hit = cache.lookup(&key(1)).unwrap();
        assert_eq!(hit.rect, slot.rect);
        assert_eq!(hit.page, 0);
        assert_eq!(hit.last_frame, Some(0));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.insertions), (1, 1, 1));
    }

    #[test]
    fn test_duplicate_insert_returns_existing_slot() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        let first = cache.insert(key(1), bitmap(32, 32, 1), 1).unwrap();
        let second = cache.insert(key(1), bitmap(16, 16, 2), 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.drain_updates().len(), 1);
    }

    #[test]
    fn test_oversized_bitmap_is_rejected() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        let err = cache.insert(key(1), bitmap(65, 8, 0), 1).unwrap_err();
        assert_eq!(
            err,
            InsertError::TooLarge {
                width: 65,
                height: 8,
                page_size: 64
            }
        );
        assert!(cache.drain_updates().is_empty());
        assert_eq!(cache.stats().failed_inserts, 1);
    }

    #[test]
    fn test_malformed_bitmap_is_rejected() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        let mut bad = bitmap(8, 8, 0);
        bad.pixels.pop();
        assert!(matches!(
            cache.insert(key(1), bad, 1),
            Err(InsertError::InvalidBitmap { expected: 256, actual: 255 })
        ));
    }

    #[test]
    fn test_lru_victim_is_oldest_untouched() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        for g in 1..=4 {
            cache.insert(key(g), bitmap(32, 32, g as u8), 1).unwrap();
        }
        clock.advance();
        cache.touch(&key(1));
        clock.advance();

        cache.insert(key(5), bitmap(32, 32, 5), 1).unwrap();
        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.lru_keys(), vec![key(3), key(4), key(1), key(5)]);
    }

    #[test]
    fn test_pinned_slots_survive_and_count_against_budget() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        for g in 1..=4 {
            cache.insert(key(g), bitmap(32, 32, 0), 1).unwrap();
        }
        clock.advance();
        // Pin the two oldest.
        cache.lookup(&key(1));
        cache.lookup(&key(2));
        cache.insert(key(5), bitmap(32, 32, 0), 1).unwrap();
        assert!(cache.contains(&key(1)) && cache.contains(&key(2)));
        assert!(!cache.contains(&key(3)));
        assert_eq!(cache.stats().pinned_skips, 0);

        // Everything pinned: the budget runs out on skips alone.
        for g in [1, 2, 4, 5] {
            cache.lookup(&key(g));
        }
        let err = cache.insert(key(6), bitmap(32, 32, 0), 1).unwrap_err();
        assert_eq!(err, InsertError::AtlasFull);
        assert_eq!(cache.stats().pinned_skips, 4);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_force_evict_pinned_policy() {
        let clock = FrameClock::new();
        let config = AtlasConfig {
            page_size: 64,
            max_pages: 1,
            padding: 0,
            eviction_budget: 2,
            budget_exhaustion: BudgetExhaustion::ForceEvictPinned,
            ..AtlasConfig::default()
        };
        let mut cache = GlyphCache::new(config, clock.clone());
        for g in 1..=4 {
            cache.insert(key(g), bitmap(32, 32, 0), 1).unwrap();
            cache.lookup(&key(g));
        }
        cache.insert(key(5), bitmap(32, 32, 0), 1).unwrap();
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(5)));
    }

    #[test]
    fn test_too_large_for_page_budget_then_new_page() {
        let clock = FrameClock::new();
        let config = AtlasConfig {
            page_size: 64,
            max_pages: 2,
            padding: 0,
            ..AtlasConfig::default()
        };
        let mut cache = GlyphCache::new(config, clock.clone());
        cache.insert(key(1), bitmap(64, 40, 0), 1).unwrap();
        let slot = cache.insert(key(2), bitmap(64, 40, 0), 1).unwrap();
        assert_eq!(slot.page, 1);
        assert_eq!(cache.page_count(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_eviction_precedes_reusing_commit() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        for g in 1..=4 {
            cache.insert(key(g), bitmap(32, 32, 0), 1).unwrap();
        }
        cache.drain_updates();
        clock.advance();
        cache.insert(key(5), bitmap(32, 32, 0), 1).unwrap();
        let updates = cache.drain_updates();
        assert_eq!(updates.len(), 2);
        let AtlasUpdate::Evicted { rect: freed, key: k, .. } = &updates[0] else {
            panic!("expected eviction first, got {updates:?}");
        };
        assert_eq!(*k, key(1));
        let AtlasUpdate::Commit { rect, .. } = &updates[1] else {
            panic!("expected commit second");
        };
        assert_eq!(rect, freed);
    }

    #[test]
    fn test_padding_is_committed_as_zeros() {
        let clock = FrameClock::new();
        let config = AtlasConfig {
            page_size: 64,
            padding: 2,
            ..AtlasConfig::default()
        };
        let mut cache = GlyphCache::new(config, clock);
        let slot = cache.insert(key(1), bitmap(2, 2, 9), 1).unwrap();
        assert_eq!(slot.rect, PixelRect::new(0, 0, 2, 2));
        let updates = cache.drain_updates();
        let AtlasUpdate::Commit { rect, pixels, .. } = &updates[0] else {
            panic!("expected commit");
        };
        assert_eq!(*rect, PixelRect::new(0, 0, 4, 4));
        assert_eq!(pixels.len(), 64);
        assert_eq!(&pixels[..8], &[9; 8]);
        assert_eq!(&pixels[8..16], &[0; 8]);

        let next = cache.insert(key(2), bitmap(2, 2, 1), 1).unwrap();
        assert_eq!(next.rect.x, 4);
    }

    #[test]
    fn test_empty_glyph_takes_no_space() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        let slot = cache
            .insert(key(1), GlyphBitmap::empty(GlyphMetrics::default()), 1)
            .unwrap();
        assert!(slot.is_empty());
        assert_eq!(slot.uv, UvRect::default());
        assert!(cache.drain_updates().is_empty());
        assert!(cache.lru_keys().is_empty());
        assert!(cache.lookup(&key(1)).is_some());
        assert_eq!(cache.page_count(), 0);
    }

    #[test]
    fn test_evict_if_needed_frees_area() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        for g in 1..=4 {
            cache.insert(key(g), bitmap(32, 32, 0), 1).unwrap();
        }
        clock.advance();
        cache.touch(&key(1));
        let freed = cache.evict_if_needed(2 * 32 * 32);
        assert_eq!(freed, vec![key(2), key(3)]);
        assert_eq!(cache.free_area(), 2 * 32 * 32);
        assert!(cache.evict_if_needed(1024).is_empty());
    }

    #[test]
    fn test_clear_page_and_font() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        cache.insert(key(1), bitmap(32, 32, 3), 1).unwrap();
        cache.insert(GlyphKey::new(1, 1, 32, ChannelMode::Msdf), bitmap(32, 32, 3), 1).unwrap();
        cache
            .insert(key(2), GlyphBitmap::empty(GlyphMetrics::default()), 1)
            .unwrap();
        cache.drain_updates();

        assert_eq!(cache.evict_font(1).len(), 1);
        assert_eq!(cache.len(), 2);

        let dropped = cache.clear_page(0);
        assert_eq!(dropped, vec![key(1)]);
        assert!(cache.page_pixels(0).unwrap().iter().all(|&b| b == 0));
        let updates = cache.drain_updates();
        assert!(matches!(updates.last(), Some(AtlasUpdate::PageCleared { page: 0 })));
        // The empty glyph lives on until a full clear.
        assert!(cache.contains(&key(2)));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_slot_ids_are_reused() {
        let clock = FrameClock::new();
        let mut cache = small_cache(&clock);
        let a = cache.insert(key(1), bitmap(8, 8, 0), 1).unwrap();
        cache.evict_font(0);
        let b = cache.insert(key(2), bitmap(8, 8, 0), 1).unwrap();
        assert_eq!(a.id, b.id);
    }
}
