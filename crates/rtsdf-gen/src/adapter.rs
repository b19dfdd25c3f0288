// Distance-Field Adapter: outline source + backend = one quantized bitmap.
// Holds no cache; the atlas decides when a key is generated again.

use rtsdf_core::{
    DistanceFieldBackend, FieldParams, GenerateError, GlyphBitmap, GlyphGenerator, GlyphKey,
    GlyphMetrics, Outline, OutlineSource, Point, BYTES_PER_TEXEL,
};

use crate::config::FieldConfig;

pub struct DistanceFieldAdapter<S, B> {
    source: S,
    backend: B,
    config: FieldConfig,
}

impl<S: OutlineSource, B: DistanceFieldBackend> DistanceFieldAdapter<S, B> {
    pub fn new(source: S, backend: B, config: FieldConfig) -> Self {
        Self {
            source,
            backend,
            config,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Bitmap size and em placement for an outline at `px_per_em`.
    fn layout(&self, outline: &Outline, px_per_em: f32, scale: f32) -> (u32, u32, GlyphMetrics) {
        let margin = self.config.margin();
        let bounds = &outline.bounds;
        let width = texels(bounds.width() * scale + 2.0 * margin);
        let height = texels(bounds.height() * scale + 2.0 * margin);
        let metrics = GlyphMetrics {
            em_left: (bounds.x_min * scale - margin) / px_per_em,
            em_top: (bounds.y_max * scale + margin) / px_per_em,
            em_width: width as f32 / px_per_em,
            em_height: height as f32 / px_per_em,
            pixel_range: self.config.pixel_range,
        };
        (width, height, metrics)
    }

    fn quantize(&self, value: f32) -> u8 {
        let value = if self.config.invert_distance {
            1.0 - value
        } else {
            value
        };
        (value * 255.0 + 0.5).clamp(0.0, 255.0) as u8
    }
}

/// Round an extent up to whole texels, ignoring float noise just above an integer.
fn texels(extent: f32) -> u32 {
    (extent - 1e-3).ceil().max(1.0) as u32
}

impl<S: OutlineSource, B: DistanceFieldBackend> GlyphGenerator for DistanceFieldAdapter<S, B> {
    fn generate(&self, key: &GlyphKey) -> Result<GlyphBitmap, GenerateError> {
        let outline = self
            .source
            .load_outline(key.font, key.glyph)
            .ok_or(GenerateError::OutlineNotFound {
                font: key.font,
                glyph: key.glyph,
            })?;
        if outline.units_per_em == 0 {
            return Err(GenerateError::GenerationFailed(format!(
                "font {} reports zero units per em",
                key.font
            )));
        }

        let px_per_em = key.size_bucket as f32;
        let scale = px_per_em / outline.units_per_em as f32;
        if outline.is_empty() {
            return Ok(GlyphBitmap::empty(GlyphMetrics {
                pixel_range: self.config.pixel_range,
                ..GlyphMetrics::default()
            }));
        }

        let (width, height, metrics) = self.layout(&outline, px_per_em, scale);
        let margin = self.config.margin();
        let (x_min, y_max) = (outline.bounds.x_min, outline.bounds.y_max);
        // Font units (y up) to bitmap pixels (y down).
        let to_pixels = |p: Point| {
            Point::new(
                (p.x - x_min) * scale + margin,
                (y_max - p.y) * scale + margin,
            )
        };
        let placed = Outline {
            contours: outline
                .contours
                .iter()
                .map(|contour| rtsdf_core::Contour {
                    segments: contour.segments.iter().map(|s| s.map(to_pixels)).collect(),
                })
                .collect(),
            bounds: outline.bounds,
            units_per_em: outline.units_per_em,
        };

        let params = FieldParams {
            width,
            height,
            pixel_range: self.config.pixel_range,
            mode: key.mode,
        };
        let field = self.backend.compute(&placed, &params)?;

        let texel_count = width as usize * height as usize;
        if field.channels != key.mode.channels() || field.values.len() != texel_count * field.channels {
            return Err(GenerateError::GenerationFailed(format!(
                "backend returned {} values in {} channels for a {width}x{height} {:?} field",
                field.values.len(),
                field.channels,
                key.mode
            )));
        }

        let mut pixels = Vec::with_capacity(texel_count * BYTES_PER_TEXEL);
        for texel in field.values.chunks_exact(field.channels) {
            match *texel {
                [v] => {
                    let b = self.quantize(v);
                    pixels.extend_from_slice(&[b, b, b, 255]);
                }
                [r, g, b] => {
                    pixels.extend_from_slice(&[self.quantize(r), self.quantize(g), self.quantize(b), 255]);
                }
                [r, g, b, a] => pixels.extend_from_slice(&[
                    self.quantize(r),
                    self.quantize(g),
                    self.quantize(b),
                    self.quantize(a),
                ]),
                _ => unreachable!("channel count checked above"),
            }
        }

        log::trace!("Generated {key:?}: {width}x{height}");
        Ok(GlyphBitmap {
            width,
            height,
            pixels,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SegmentFieldBackend;
    use rtsdf_core::{ChannelMode, Contour, DistanceField, FontId, OutlineBounds, Segment};

    /// Glyph 1 is a 500x700 unit box, glyph 2 is blank, everything else is missing.
    struct BoxSource;

    impl OutlineSource for BoxSource {
        fn load_outline(&self, font: FontId, glyph: u16) -> Option<Outline> {
            if font != 0 {
                return None;
            }
            match glyph {
                1 => {
                    let p = |x: f32, y: f32| Point::new(x, y);
                    Some(Outline {
                        contours: vec![Contour {
                            segments: vec![
                                Segment::Line(p(100.0, 0.0), p(600.0, 0.0)),
                                Segment::Line(p(600.0, 0.0), p(600.0, 700.0)),
                                Segment::Line(p(600.0, 700.0), p(100.0, 700.0)),
                                Segment::Line(p(100.0, 700.0), p(100.0, 0.0)),
                            ],
                        }],
                        bounds: OutlineBounds {
                            x_min: 100.0,
                            y_min: 0.0,
                            x_max: 600.0,
                            y_max: 700.0,
                        },
                        units_per_em: 1000,
                    })
                }
                2 => Some(Outline {
                    units_per_em: 1000,
                    ..Outline::default()
                }),
                _ => None,
            }
        }
    }

    struct BrokenBackend;

    impl DistanceFieldBackend for BrokenBackend {
        fn compute(&self, _: &Outline, params: &FieldParams) -> Result<DistanceField, GenerateError> {
            Ok(DistanceField {
                width: params.width,
                height: params.height,
                channels: 1,
                values: vec![0.5; 3],
            })
        }
    }

    fn adapter() -> DistanceFieldAdapter<BoxSource, SegmentFieldBackend> {
        DistanceFieldAdapter::new(BoxSource, SegmentFieldBackend::default(), FieldConfig::default())
    }

    #[test]
    fn test_bitmap_size_includes_margin() {
        let bitmap = adapter()
            .generate(&GlyphKey::new(0, 1, 32, ChannelMode::Msdf))
            .unwrap();
        // 500x700 units at 32px/em = 16x22.4 px, plus 2px margin per side.
        assert_eq!((bitmap.width, bitmap.height), (20, 27));
        assert_eq!(bitmap.pixels.len(), bitmap.expected_len());
        assert!((bitmap.metrics.em_left - (3.2 - 2.0) / 32.0).abs() < 1e-5);
        assert!((bitmap.metrics.em_top - (22.4 + 2.0) / 32.0).abs() < 1e-5);
        assert_eq!(bitmap.metrics.pixel_range, 4.0);
    }

    #[test]
    fn test_single_channel_is_replicated() {
        let bitmap = adapter()
            .generate(&GlyphKey::new(0, 1, 16, ChannelMode::Sdf))
            .unwrap();
        let center = ((bitmap.height / 2) * bitmap.width + bitmap.width / 2) as usize * 4;
        let texel = &bitmap.pixels[center..center + 4];
        assert_eq!(texel[0], texel[1]);
        assert_eq!(texel[1], texel[2]);
        assert_eq!(texel[3], 255);
        // Inside the box: above the 0.5 edge value.
        assert!(texel[0] > 128);
        // Corner texel is outside.
        assert!(bitmap.pixels[0] < 128);
    }

    #[test]
    fn test_invert_distance() {
        let config = FieldConfig {
            invert_distance: true,
            ..FieldConfig::default()
        };
        let adapter = DistanceFieldAdapter::new(BoxSource, SegmentFieldBackend::default(), config);
        let bitmap = adapter.generate(&GlyphKey::new(0, 1, 16, ChannelMode::Sdf)).unwrap();
        assert!(bitmap.pixels[0] > 128);
    }

    #[test]
    fn test_missing_outline_is_reported() {
        let err = adapter()
            .generate(&GlyphKey::new(0, 9, 32, ChannelMode::Msdf))
            .unwrap_err();
        assert_eq!(err, GenerateError::OutlineNotFound { font: 0, glyph: 9 });
        let err = adapter()
            .generate(&GlyphKey::new(4, 1, 32, ChannelMode::Msdf))
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn test_blank_glyph_is_empty_bitmap() {
        let bitmap = adapter()
            .generate(&GlyphKey::new(0, 2, 32, ChannelMode::Mtsdf))
            .unwrap();
        assert!(bitmap.is_empty());
        assert!(bitmap.pixels.is_empty());
    }

    #[test]
    fn test_malformed_backend_output_fails() {
        let adapter = DistanceFieldAdapter::new(BoxSource, BrokenBackend, FieldConfig::default());
        let err = adapter
            .generate(&GlyphKey::new(0, 1, 32, ChannelMode::Sdf))
            .unwrap_err();
        assert!(matches!(err, GenerateError::GenerationFailed(_)));
    }
}
