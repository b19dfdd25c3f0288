// Runtime glyph atlas for distance-field text.
// Packs generated bitmaps into fixed-size RGBA8 pages, caches them with LRU
// eviction, and generates missing glyphs on a worker pool so the render path
// never waits.

mod cache;
mod config;
mod error;
#[cfg(feature = "wgpu")]
mod gpu;
mod manager;
mod packer;
mod page;
mod pool;
mod scheduler;

pub use cache::{AtlasSlot, AtlasUpdate, CacheStats, FrameClock, GlyphCache, SlotId};
pub use config::{AtlasConfig, BudgetExhaustion};
pub use error::{ConfigError, GlyphError, InsertError};
#[cfg(feature = "wgpu")]
pub use gpu::{AtlasTextures, PageTexture};
pub use manager::{AtlasManager, AtlasStats, Availability, ResolvedGlyph};
pub use packer::{AtlasPacker, PackError, PageState};
pub use page::AtlasPage;
pub use scheduler::{
    Completion, CompletionReceiver, GenerationScheduler, GlyphOutcome, GlyphRequest,
    PendingHandle, SchedulerStats,
};
