use rtsdf_core::{FontId, GenerateError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("page size {0} is outside 1..=16384")]
    PageSize(u32),

    #[error("max_pages must be at least 1")]
    MaxPages,

    #[error("padding {padding} does not fit a {page_size} page")]
    Padding { padding: u32, page_size: u32 },

    #[error("seal threshold {0} is outside 0..=1")]
    SealThreshold(f32),

    #[error("worker_threads must be at least 1")]
    WorkerThreads,

    #[error("generation_attempts must be at least 1")]
    GenerationAttempts,

    #[error("failed to start worker thread: {0}")]
    WorkerSpawn(String),
}

/// Why `GlyphCache::insert` could not place a bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error("{width}x{height} bitmap exceeds the {page_size}x{page_size} page")]
    TooLarge {
        width: u32,
        height: u32,
        page_size: u32,
    },

    #[error("atlas full: no page or eviction can make room")]
    AtlasFull,

    #[error("bitmap has {actual} bytes, expected {expected}")]
    InvalidBitmap { expected: usize, actual: usize },
}

/// Failure observed by `resolve_uv` callers and pending-handle waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlyphError {
    #[error("outline not found: font {font}, glyph {glyph}")]
    OutlineNotFound { font: FontId, glyph: u16 },

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("atlas full")]
    AtlasFull,

    #[error("glyph of {width}x{height} does not fit an atlas page")]
    TooLarge { width: u32, height: u32 },
}

impl GlyphError {
    /// Permanent failures are never retried for the key.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, GlyphError::AtlasFull)
    }
}

impl From<GenerateError> for GlyphError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::OutlineNotFound { font, glyph } => {
                GlyphError::OutlineNotFound { font, glyph }
            }
            GenerateError::GenerationFailed(reason) => GlyphError::GenerationFailed(reason),
        }
    }
}

impl From<InsertError> for GlyphError {
    fn from(err: InsertError) -> Self {
        match err {
            InsertError::TooLarge { width, height, .. } => GlyphError::TooLarge { width, height },
            InsertError::AtlasFull => GlyphError::AtlasFull,
            InsertError::InvalidBitmap { expected, actual } => GlyphError::GenerationFailed(
                format!("bitmap has {actual} bytes, expected {expected}"),
            ),
        }
    }
}
