// Core types shared by the rtsdf crates.
// The atlas, the generation adapter and the renderer only talk to each other
// through the value types and collaborator traits defined here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ──────────────────────────────────────────────
// Identity
// ──────────────────────────────────────────────

pub type FontId = u32;
pub type PageId = u32;

/// Smallest and largest pixels-per-em bucket a glyph key may carry.
pub const MIN_SIZE_BUCKET: u16 = 8;
pub const MAX_SIZE_BUCKET: u16 = 256;

/// Every atlas page and every generated bitmap is RGBA8.
pub const BYTES_PER_TEXEL: usize = 4;

/// Distance-field encoding stored for a glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelMode {
    /// True single-channel signed distance.
    Sdf,
    /// Single-channel pseudo distance (edges extended along their tangents).
    PseudoSdf,
    /// Multi-channel distance in RGB.
    Msdf,
    /// Multi-channel distance in RGB with the true distance in alpha.
    Mtsdf,
}

impl ChannelMode {
    /// Number of distance channels the backend produces for this mode.
    pub const fn channels(self) -> usize {
        match self {
            ChannelMode::Sdf | ChannelMode::PseudoSdf => 1,
            ChannelMode::Msdf => 3,
            ChannelMode::Mtsdf => 4,
        }
    }

    pub const fn is_single_channel(self) -> bool {
        matches!(self, ChannelMode::Sdf | ChannelMode::PseudoSdf)
    }
}

impl Default for ChannelMode {
    fn default() -> Self {
        ChannelMode::Msdf
    }
}

/// Cache key for one distance-field bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlyphKey {
    pub font: FontId,
    pub glyph: u16,
    /// Pixels per em the field was generated at.
    pub size_bucket: u16,
    pub mode: ChannelMode,
}

impl GlyphKey {
    pub const fn new(font: FontId, glyph: u16, size_bucket: u16, mode: ChannelMode) -> Self {
        Self {
            font,
            glyph,
            size_bucket,
            mode,
        }
    }

    /// Build a key for a requested pixel size, rounding it up to its bucket.
    pub fn for_px_size(font: FontId, glyph: u16, px_size: f32, mode: ChannelMode) -> Self {
        Self::new(font, glyph, size_bucket_for(px_size), mode)
    }
}

/// Round a pixel size up to the next power-of-two bucket.
/// MSDF bitmaps scale up cleanly, so one bucket serves every size below it.
pub fn size_bucket_for(px_size: f32) -> u16 {
    if !px_size.is_finite() || px_size <= MIN_SIZE_BUCKET as f32 {
        return MIN_SIZE_BUCKET;
    }
    let px = px_size.ceil().min(MAX_SIZE_BUCKET as f32) as u16;
    px.next_power_of_two().min(MAX_SIZE_BUCKET)
}

// ──────────────────────────────────────────────
// Geometry
// ──────────────────────────────────────────────

/// Integer rectangle in atlas texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Normalized texture coordinates of a region, in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UvRect {
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
}

impl UvRect {
    pub fn from_rect(rect: PixelRect, page_size: u32) -> Self {
        if rect.is_empty() || page_size == 0 {
            return Self::default();
        }
        let size = page_size as f32;
        Self {
            uv_min: [rect.x as f32 / size, rect.y as f32 / size],
            uv_max: [rect.right() as f32 / size, rect.bottom() as f32 / size],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// ──────────────────────────────────────────────
// Outlines
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line(Point, Point),
    Quad(Point, Point, Point),
    Cubic(Point, Point, Point, Point),
}

impl Segment {
    pub fn start(&self) -> Point {
        match *self {
            Segment::Line(p0, _) | Segment::Quad(p0, _, _) | Segment::Cubic(p0, _, _, _) => p0,
        }
    }

    pub fn end(&self) -> Point {
        match *self {
            Segment::Line(_, p1) | Segment::Quad(_, _, p1) | Segment::Cubic(_, _, _, p1) => p1,
        }
    }

    /// Apply `f` to every control point.
    pub fn map(&self, f: impl Fn(Point) -> Point) -> Segment {
        match *self {
            Segment::Line(a, b) => Segment::Line(f(a), f(b)),
            Segment::Quad(a, b, c) => Segment::Quad(f(a), f(b), f(c)),
            Segment::Cubic(a, b, c, d) => Segment::Cubic(f(a), f(b), f(c), f(d)),
        }
    }
}

/// One closed contour of a glyph outline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    pub segments: Vec<Segment>,
}

/// Axis-aligned bounds in font units (y up).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutlineBounds {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl OutlineBounds {
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }
}

/// Vector contours of a single glyph, as loaded from a font.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outline {
    pub contours: Vec<Contour>,
    pub bounds: OutlineBounds,
    pub units_per_em: u16,
}

impl Outline {
    /// A glyph that exists but draws nothing (space, zero-width joiners, ...).
    pub fn is_empty(&self) -> bool {
        self.contours.iter().all(|c| c.segments.is_empty())
    }
}

// ──────────────────────────────────────────────
// Bitmaps
// ──────────────────────────────────────────────

/// Placement of a field relative to the glyph origin, in em units.
/// Multiply by the rendered font size to get pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphMetrics {
    pub em_left: f32,
    pub em_top: f32,
    pub em_width: f32,
    pub em_height: f32,
    /// Distance span encoded in the field, in field pixels.
    pub pixel_range: f32,
}

/// Quantized distance field ready to be packed, RGBA8 row-major top-down.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub metrics: GlyphMetrics,
}

impl GlyphBitmap {
    pub fn empty(metrics: GlyphMetrics) -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            metrics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_TEXEL
    }
}

/// Raw per-pixel distances produced by a backend, `channels` floats per pixel.
/// 0.5 lies on the outline; larger values are inside.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistanceField {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub values: Vec<f32>,
}

/// Fixed parameters of one backend invocation, in bitmap pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldParams {
    pub width: u32,
    pub height: u32,
    pub pixel_range: f32,
    pub mode: ChannelMode,
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("outline not found: font {font}, glyph {glyph}")]
    OutlineNotFound { font: FontId, glyph: u16 },

    #[error("distance-field generation failed: {0}")]
    GenerationFailed(String),
}

impl GenerateError {
    /// A missing outline never appears later; a failed generation may be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, GenerateError::OutlineNotFound { .. })
    }
}

// ──────────────────────────────────────────────
// Collaborators
// ──────────────────────────────────────────────

/// Font-outline collaborator: loads the vector contours of a glyph.
pub trait OutlineSource: Send + Sync {
    /// `None` when the font or the glyph does not exist.
    fn load_outline(&self, font: FontId, glyph: u16) -> Option<Outline>;
}

/// Distance-field collaborator: turns contours (already in bitmap pixel
/// space, y down) into per-pixel distances.
pub trait DistanceFieldBackend: Send + Sync {
    fn compute(&self, outline: &Outline, params: &FieldParams)
        -> Result<DistanceField, GenerateError>;
}

/// What the scheduler runs on its workers: one glyph key in, one bitmap out.
/// Implementations hold no cache; the same key may be generated again after
/// eviction.
pub trait GlyphGenerator: Send + Sync {
    fn generate(&self, key: &GlyphKey) -> Result<GlyphBitmap, GenerateError>;
}
