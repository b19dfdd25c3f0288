// Font outline source backed by ttf-parser.
// Fonts are registered once as owned byte blobs; every outline request
// re-parses the face header, which ttf-parser does without allocating.

use std::sync::{Arc, RwLock};

use rtsdf_core::{Contour, FontId, Outline, OutlineBounds, OutlineSource, Point, Segment};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FontError {
    #[error("failed to parse font face {index}: {reason}")]
    Parse { index: u32, reason: String },
}

struct FontEntry {
    data: Arc<[u8]>,
    face_index: u32,
    units_per_em: u16,
    glyph_count: u16,
}

/// Registry of loaded font faces, addressed by `FontId`.
/// Fonts can be added from any thread while workers read outlines.
#[derive(Default)]
pub struct FontLibrary {
    fonts: RwLock<Vec<FontEntry>>,
}

impl FontLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a face from a TTF/OTF/TTC blob.
    pub fn add_font(&self, data: Vec<u8>, face_index: u32) -> Result<FontId, FontError> {
        let (units_per_em, glyph_count) = {
            let face = ttf_parser::Face::parse(&data, face_index).map_err(|e| FontError::Parse {
                index: face_index,
                reason: e.to_string(),
            })?;
            (face.units_per_em(), face.number_of_glyphs())
        };

        let mut fonts = self.fonts.write().expect("font library lock poisoned");
        let id = fonts.len() as FontId;
        fonts.push(FontEntry {
            data: Arc::from(data),
            face_index,
            units_per_em,
            glyph_count,
        });
        log::debug!("Registered font {id}: {glyph_count} glyphs, {units_per_em} units/em");
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.fonts.read().expect("font library lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map a character to its glyph index in `font`.
    pub fn glyph_index(&self, font: FontId, ch: char) -> Option<u16> {
        let (data, face_index) = self.entry_data(font)?;
        let face = ttf_parser::Face::parse(&data, face_index).ok()?;
        face.glyph_index(ch).map(|g| g.0)
    }

    fn entry_data(&self, font: FontId) -> Option<(Arc<[u8]>, u32)> {
        let fonts = self.fonts.read().expect("font library lock poisoned");
        let entry = fonts.get(font as usize)?;
        Some((Arc::clone(&entry.data), entry.face_index))
    }
}

impl OutlineSource for FontLibrary {
    fn load_outline(&self, font: FontId, glyph: u16) -> Option<Outline> {
        let (data, face_index, units_per_em, glyph_count) = {
            let fonts = self.fonts.read().expect("font library lock poisoned");
            let entry = fonts.get(font as usize)?;
            (
                Arc::clone(&entry.data),
                entry.face_index,
                entry.units_per_em,
                entry.glyph_count,
            )
        };
        if glyph >= glyph_count {
            return None;
        }

        let face = ttf_parser::Face::parse(&data, face_index).ok()?;
        let mut builder = ContourBuilder::default();
        let bounds = face.outline_glyph(ttf_parser::GlyphId(glyph), &mut builder);
        builder.close_open();

        let Some(bounds) = bounds else {
            // The glyph exists but has no contours.
            return Some(Outline {
                contours: Vec::new(),
                bounds: OutlineBounds::default(),
                units_per_em,
            });
        };

        Some(Outline {
            contours: builder.contours,
            bounds: OutlineBounds {
                x_min: bounds.x_min as f32,
                y_min: bounds.y_min as f32,
                x_max: bounds.x_max as f32,
                y_max: bounds.y_max as f32,
            },
            units_per_em,
        })
    }
}

/// Collects ttf-parser path callbacks into closed contours.
#[derive(Default)]
struct ContourBuilder {
    contours: Vec<Contour>,
    current: Vec<Segment>,
    start: Point,
    pen: Point,
}

impl ContourBuilder {
    fn close_open(&mut self) {
        if self.current.is_empty() {
            return;
        }
        if self.pen != self.start {
            self.current.push(Segment::Line(self.pen, self.start));
        }
        self.contours.push(Contour {
            segments: std::mem::take(&mut self.current),
        });
        self.pen = self.start;
    }
}

impl ttf_parser::OutlineBuilder for ContourBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.close_open();
        self.start = Point::new(x, y);
        self.pen = self.start;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = Point::new(x, y);
        if p != self.pen {
            self.current.push(Segment::Line(self.pen, p));
        }
        self.pen = p;
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let p = Point::new(x, y);
        self.current.push(Segment::Quad(self.pen, Point::new(x1, y1), p));
        self.pen = p;
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let p = Point::new(x, y);
        self.current
            .push(Segment::Cubic(self.pen, Point::new(x1, y1), Point::new(x2, y2), p));
        self.pen = p;
    }

    fn close(&mut self) {
        self.close_open();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttf_parser::OutlineBuilder;

    #[test]
    fn test_invalid_font_data_is_rejected() {
        let library = FontLibrary::new();
        let err = library.add_font(vec![0u8; 16], 0).unwrap_err();
        assert!(matches!(err, FontError::Parse { index: 0, .. }));
        assert!(library.is_empty());
    }

    #[test]
    fn test_unknown_font_has_no_outline() {
        let library = FontLibrary::new();
        assert!(library.load_outline(3, 1).is_none());
        assert!(library.glyph_index(3, 'a').is_none());
    }

    #[test]
    fn test_builder_closes_contours() {
        let mut builder = ContourBuilder::default();
        builder.move_to(0.0, 0.0);
        builder.line_to(10.0, 0.0);
        builder.quad_to(10.0, 10.0, 0.0, 10.0);
        // No explicit close: the next move_to must close the contour.
        builder.move_to(20.0, 20.0);
        builder.line_to(30.0, 20.0);
        builder.line_to(30.0, 30.0);
        builder.close();

        assert_eq!(builder.contours.len(), 2);
        let first = &builder.contours[0].segments;
        assert_eq!(first.len(), 3);
        assert_eq!(first[2], Segment::Line(Point::new(0.0, 10.0), Point::new(0.0, 0.0)));
        let second = &builder.contours[1].segments;
        assert_eq!(second.last().map(|s| s.end()), Some(Point::new(20.0, 20.0)));
    }
}
