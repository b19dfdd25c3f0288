// Atlas packer: shelf allocation over a bounded set of fixed-size pages.
// The packer hands out rectangles only; glyph identity lives in the cache.

use rtsdf_core::{PageId, PixelRect};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PackError {
    /// No open page and no new shelf can take the request.
    #[error("no page can accommodate the request")]
    Full,
    /// The request is larger than a whole page.
    #[error("request exceeds the page size")]
    TooLarge,
}

// ──────────────────────────────────────────────
// Shelf allocator (one page)
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    x: u32,
    width: u32,
}

/// Horizontal band of fixed height, filled left to right.
#[derive(Debug, Clone)]
struct Shelf {
    y: u32,
    height: u32,
    cursor: u32,
    /// Reclaimed columns left of the cursor, sorted by x, never adjacent.
    free: Vec<Span>,
    live: u32,
}

impl Shelf {
    fn free_span_for(&self, width: u32) -> Option<usize> {
        self.free.iter().position(|span| span.width >= width)
    }

    fn fits(&self, width: u32, height: u32, page_size: u32) -> bool {
        self.height >= height
            && (self.cursor + width <= page_size || self.free_span_for(width).is_some())
    }

    fn take(&mut self, width: u32, page_size: u32) -> u32 {
        self.live += 1;
        if let Some(i) = self.free_span_for(width) {
            let span = &mut self.free[i];
            let x = span.x;
            span.x += width;
            span.width -= width;
            if span.width == 0 {
                self.free.remove(i);
            }
            return x;
        }
        debug_assert!(self.cursor + width <= page_size);
        let x = self.cursor;
        self.cursor += width;
        x
    }

    /// Return `[x, x + width)` to the shelf. False if the columns are not live.
    fn give_back(&mut self, x: u32, width: u32) -> bool {
        if self.live == 0 || x + width > self.cursor {
            return false;
        }
        let at = self.free.partition_point(|span| span.x < x);
        let overlaps_prev = at > 0 && {
            let prev = self.free[at - 1];
            prev.x + prev.width > x
        };
        let overlaps_next = self.free.get(at).is_some_and(|next| x + width > next.x);
        if overlaps_prev || overlaps_next {
            return false;
        }

        self.free.insert(at, Span { x, width });
        // Merge with the following span, then with the preceding one.
        if at + 1 < self.free.len() && self.free[at].x + self.free[at].width == self.free[at + 1].x {
            self.free[at].width += self.free[at + 1].width;
            self.free.remove(at + 1);
        }
        let mut at = at;
        if at > 0 && self.free[at - 1].x + self.free[at - 1].width == self.free[at].x {
            self.free[at - 1].width += self.free[at].width;
            self.free.remove(at);
            at -= 1;
        }
        // A span touching the cursor just moves the cursor back.
        if self.free[at].x + self.free[at].width == self.cursor {
            self.cursor = self.free[at].x;
            self.free.remove(at);
        }

        self.live -= 1;
        if self.live == 0 {
            self.cursor = 0;
            self.free.clear();
        }
        true
    }
}

/// Shelf packing state of a single page.
#[derive(Debug, Clone)]
pub(crate) struct ShelfAllocator {
    page_size: u32,
    shelves: Vec<Shelf>,
    /// First row below the last shelf.
    next_y: u32,
    used_area: u64,
}

impl ShelfAllocator {
    pub(crate) fn new(page_size: u32) -> Self {
        Self {
            page_size,
            shelves: Vec::new(),
            next_y: 0,
            used_area: 0,
        }
    }

    pub(crate) fn allocate(&mut self, width: u32, height: u32) -> Option<PixelRect> {
        if width > self.page_size || height > self.page_size {
            return None;
        }
        let (width, height) = (width.max(1), height.max(1));

        // Shortest fitting shelf; the first one wins on equal heights.
        let mut best: Option<usize> = None;
        for (i, shelf) in self.shelves.iter().enumerate() {
            if shelf.fits(width, height, self.page_size)
                && best.map_or(true, |b| shelf.height < self.shelves[b].height)
            {
                best = Some(i);
            }
        }

        let index = match best {
            Some(i) => i,
            None => {
                if self.next_y + height > self.page_size {
                    return None;
                }
                self.shelves.push(Shelf {
                    y: self.next_y,
                    height,
                    cursor: 0,
                    free: Vec::new(),
                    live: 0,
                });
                self.next_y += height;
                self.shelves.len() - 1
            }
        };

        let shelf = &mut self.shelves[index];
        let x = shelf.take(width, self.page_size);
        self.used_area += width as u64 * height as u64;
        Some(PixelRect::new(x, shelf.y, width, height))
    }

    /// Mark `rect` reclaimable. Live rectangles never move.
    pub(crate) fn free(&mut self, rect: PixelRect) -> bool {
        let Some(index) = self
            .shelves
            .iter()
            .position(|s| s.y == rect.y && rect.height <= s.height)
        else {
            return false;
        };
        if !self.shelves[index].give_back(rect.x, rect.width) {
            return false;
        }
        self.used_area -= rect.area();

        // Empty shelves at the bottom give their rows back to the page.
        while self.shelves.last().is_some_and(|s| s.live == 0) {
            if let Some(shelf) = self.shelves.pop() {
                self.next_y = shelf.y;
            }
        }
        true
    }

    pub(crate) fn occupancy(&self) -> f32 {
        let page_area = self.page_size as u64 * self.page_size as u64;
        (self.used_area as f64 / page_area as f64) as f32
    }

    pub(crate) fn used_area(&self) -> u64 {
        self.used_area
    }
}

// ──────────────────────────────────────────────
// Multi-page packer
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Active,
    /// Serves existing slots only, until space is freed on it.
    Sealed,
}

struct PackerPage {
    shelves: ShelfAllocator,
    state: PageState,
}

pub struct AtlasPacker {
    page_size: u32,
    max_pages: u32,
    seal_threshold: f32,
    pages: Vec<PackerPage>,
}

impl AtlasPacker {
    pub fn new(page_size: u32, max_pages: u32, seal_threshold: f32) -> Self {
        Self {
            page_size,
            max_pages,
            seal_threshold,
            pages: Vec::new(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn can_open_page(&self) -> bool {
        self.page_count() < self.max_pages
    }

    /// Allocate on an existing active page, in page order.
    /// Pages that cannot take the request and are nearly full get sealed.
    pub fn allocate(&mut self, width: u32, height: u32) -> Result<(PageId, PixelRect), PackError> {
        if width > self.page_size || height > self.page_size {
            return Err(PackError::TooLarge);
        }
        for (id, page) in self.pages.iter_mut().enumerate() {
            if page.state == PageState::Sealed {
                continue;
            }
            if let Some(rect) = page.shelves.allocate(width, height) {
                return Ok((id as PageId, rect));
            }
            if page.shelves.occupancy() >= self.seal_threshold {
                page.state = PageState::Sealed;
                log::debug!(
                    "Sealed atlas page {id} at {:.1}% occupancy",
                    page.shelves.occupancy() * 100.0
                );
            }
        }
        Err(PackError::Full)
    }

    /// Open a fresh page, if the page budget allows.
    pub fn open_page(&mut self) -> Option<PageId> {
        if !self.can_open_page() {
            return None;
        }
        let id = self.pages.len() as PageId;
        self.pages.push(PackerPage {
            shelves: ShelfAllocator::new(self.page_size),
            state: PageState::Active,
        });
        log::debug!("Opened atlas page {id} ({0}x{0})", self.page_size);
        Some(id)
    }

    pub fn free(&mut self, page: PageId, rect: PixelRect) {
        let Some(entry) = self.pages.get_mut(page as usize) else {
            log::error!("Free on unknown atlas page {page}");
            return;
        };
        if !entry.shelves.free(rect) {
            log::error!("Free of unallocated rect {rect:?} on page {page}");
            return;
        }
        entry.state = PageState::Active;
    }

    /// Drop every allocation on `page`; the only compaction the packer does.
    pub fn reset(&mut self, page: PageId) {
        if let Some(entry) = self.pages.get_mut(page as usize) {
            entry.shelves = ShelfAllocator::new(self.page_size);
            entry.state = PageState::Active;
        }
    }

    pub fn page_state(&self, page: PageId) -> Option<PageState> {
        self.pages.get(page as usize).map(|p| p.state)
    }

    pub fn occupancy(&self, page: PageId) -> f32 {
        self.pages
            .get(page as usize)
            .map_or(0.0, |p| p.shelves.occupancy())
    }

    pub fn used_area(&self) -> u64 {
        self.pages.iter().map(|p| p.shelves.used_area()).sum()
    }
}
