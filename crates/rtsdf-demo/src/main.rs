// rtsdf-demo: resolve every character of a string through the atlas.
//
// usage: rtsdf-demo <font.ttf> [text] [--size PX] [--mode sdf|psdf|msdf|mtsdf] [--config atlas.json]

use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use rtsdf_atlas::{AtlasConfig, AtlasManager, AtlasUpdate, Availability};
use rtsdf_core::{ChannelMode, GlyphGenerator, GlyphKey};
use rtsdf_gen::{font_field_adapter, FieldConfig, FontLibrary};

const MAX_FRAMES: u32 = 600;

struct Options {
    font_path: String,
    text: String,
    px_size: f32,
    mode: ChannelMode,
    config_path: Option<String>,
}

fn parse_mode(name: &str) -> Option<ChannelMode> {
    match name {
        "sdf" => Some(ChannelMode::Sdf),
        "psdf" => Some(ChannelMode::PseudoSdf),
        "msdf" => Some(ChannelMode::Msdf),
        "mtsdf" => Some(ChannelMode::Mtsdf),
        _ => None,
    }
}

fn parse_args() -> Result<Options, String> {
    let mut positional = Vec::new();
    let mut px_size = 32.0;
    let mut mode = ChannelMode::Msdf;
    let mut config_path = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--size" => {
                let value = args.next().ok_or("--size needs a value")?;
                px_size = value.parse().map_err(|_| format!("bad size: {value}"))?;
            }
            "--mode" => {
                let value = args.next().ok_or("--mode needs a value")?;
                mode = parse_mode(&value).ok_or_else(|| format!("unknown mode: {value}"))?;
            }
            "--config" => config_path = Some(args.next().ok_or("--config needs a path")?),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let font_path = positional
        .next()
        .ok_or("usage: rtsdf-demo <font.ttf> [text] [--size PX] [--mode MODE] [--config FILE]")?;
    let text = positional
        .next()
        .unwrap_or_else(|| "The quick brown fox jumps over the lazy dog".to_string());
    Ok(Options {
        font_path,
        text,
        px_size,
        mode,
        config_path,
    })
}

fn load_config(path: Option<&str>) -> Result<AtlasConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(AtlasConfig::default()),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let options = parse_args()?;
    let config = load_config(options.config_path.as_deref())?;

    let fonts = FontLibrary::new();
    let font = fonts.add_font(std::fs::read(&options.font_path)?, 0)?;
    let adapter = Arc::new(font_field_adapter(fonts, FieldConfig::default()));

    let mut keys = BTreeSet::new();
    for ch in options.text.chars() {
        match adapter.source().glyph_index(font, ch) {
            Some(glyph) => {
                keys.insert(GlyphKey::for_px_size(font, glyph, options.px_size, options.mode));
            }
            None => log::warn!("No glyph for {ch:?}"),
        }
    }
    log::info!("{} distinct glyphs to resolve", keys.len());

    let generator: Arc<dyn GlyphGenerator> = adapter.clone();
    let atlas = AtlasManager::new(config, generator)?;

    let mut uploaded_bytes = 0usize;
    let mut frames = 0;
    loop {
        frames += 1;
        atlas.begin_frame();
        let mut pending = 0;
        let mut failed = 0;
        for key in &keys {
            let resolved = atlas.resolve_uv(*key);
            match resolved.availability {
                Availability::Ready => {}
                Availability::Pending => pending += 1,
                Availability::Failed => {
                    failed += 1;
                    if let Some(err) = &resolved.error {
                        log::debug!("Glyph {} failed: {err}", key.glyph);
                    }
                }
            }
        }
        for update in atlas.drain_dirty_regions() {
            if let AtlasUpdate::Commit { pixels, .. } = update {
                uploaded_bytes += pixels.len();
            }
        }

        if pending == 0 {
            log::info!(
                "Resolved {} glyphs in {frames} frames ({failed} failed, {uploaded_bytes} bytes uploaded)",
                keys.len()
            );
            break;
        }
        if frames >= MAX_FRAMES {
            log::warn!("Gave up with {pending} glyphs still pending");
            break;
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    println!("{}", serde_json::to_string_pretty(&atlas.stats())?);
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("{e}");
        eprintln!("rtsdf-demo: {e}");
        std::process::exit(1);
    }
}
