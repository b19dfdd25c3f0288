// Distance-field generation for the rtsdf atlas.
// Loads glyph outlines with ttf-parser and turns them into quantized RGBA8
// distance fields; the atlas runs `DistanceFieldAdapter::generate` on its
// worker pool.

mod adapter;
mod config;
mod field;
mod font;

pub use adapter::DistanceFieldAdapter;
pub use config::FieldConfig;
pub use field::SegmentFieldBackend;
pub use font::{FontError, FontLibrary};

/// The adapter wired to the bundled collaborators.
pub type FontFieldAdapter = DistanceFieldAdapter<FontLibrary, SegmentFieldBackend>;

/// Build the default adapter over a font library.
pub fn font_field_adapter(fonts: FontLibrary, config: FieldConfig) -> FontFieldAdapter {
    let backend = SegmentFieldBackend::new(&config);
    DistanceFieldAdapter::new(fonts, backend, config)
}
