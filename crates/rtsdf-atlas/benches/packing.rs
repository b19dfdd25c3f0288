//! Benchmark: shelf packing and LRU churn on a single atlas page.
//!
//! `fill_page` packs mixed glyph sizes into empty pages; `churn` keeps a full
//! cache and inserts new glyphs so every insert evicts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rtsdf_atlas::{AtlasConfig, AtlasPacker, FrameClock, GlyphCache};
use rtsdf_core::{ChannelMode, GlyphBitmap, GlyphKey, GlyphMetrics, BYTES_PER_TEXEL};

// ── Helpers ──

/// Deterministic glyph sizes between 8 and 47 texels.
fn glyph_sizes(n: usize) -> Vec<(u32, u32)> {
    let mut seed: u32 = 0x9e37_79b9;
    (0..n)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (8 + seed % 40, 8 + (seed >> 8) % 40)
        })
        .collect()
}

fn bitmap(width: u32, height: u32) -> GlyphBitmap {
    GlyphBitmap {
        width,
        height,
        pixels: vec![128; width as usize * height as usize * BYTES_PER_TEXEL],
        metrics: GlyphMetrics::default(),
    }
}

// ── Benchmarks ──

fn bench_fill_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_page");
    for &page_size in &[512u32, 1024, 2048] {
        let sizes = glyph_sizes(4096);
        group.bench_with_input(BenchmarkId::new("shelf", page_size), &page_size, |b, &size| {
            b.iter(|| {
                let mut packer = AtlasPacker::new(size, 1, 0.95);
                packer.open_page();
                let mut placed = 0;
                for &(w, h) in &sizes {
                    if packer.allocate(w, h).is_ok() {
                        placed += 1;
                    }
                }
                black_box(placed)
            });
        });
    }
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let config = AtlasConfig {
        page_size: 512,
        max_pages: 1,
        ..AtlasConfig::default()
    };
    let sizes = glyph_sizes(1024);

    c.bench_function("lru_churn", |b| {
        let clock = FrameClock::new();
        let mut cache = GlyphCache::new(config.clone(), clock.clone());
        let mut next: u16 = 0;
        b.iter(|| {
            let (w, h) = sizes[next as usize % sizes.len()];
            let key = GlyphKey::new(0, next, 32, ChannelMode::Msdf);
            next = next.wrapping_add(1);
            if next % 64 == 0 {
                clock.advance();
            }
            let _ = black_box(cache.insert(key, bitmap(w, h), 1));
            cache.drain_updates();
        });
    });
}

criterion_group!(benches, bench_fill_page, bench_churn);
criterion_main!(benches);
