//! Padbank Render - bounce a MIDI file through the drum sampler
//!
//! A headless host for the padbank engine. It:
//! 1. Loads the kit's samples through the engine's own message protocol
//! 2. Feeds the song's notes to the engine block by block
//! 3. Writes the stereo output as a 32-bit float WAV
//!
//! ## Usage
//!
//! ```text
//! padbank-render <kit.yaml> <song.mid> <out.wav> [--rate 48000] [--block 256]
//! ```
//!
//! Engine settings come from `~/.config/padbank/engine.yaml` when present.

mod host;
mod kit;
mod song;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use padbank_core::config::{default_config_path, load_config, EngineConfig};

use host::OfflineHost;
use kit::KitConfig;

const USAGE: &str = "usage: padbank-render <kit.yaml> <song.mid> <out.wav> [--rate 48000] [--block 256]";

/// Seconds rendered after the last event so releases ring out
const TAIL_SECONDS: u64 = 2;

#[derive(Debug, PartialEq)]
struct Args {
    kit: PathBuf,
    song: PathBuf,
    out: PathBuf,
    rate: u32,
    block: usize,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut positional = Vec::new();
    let mut rate = 48000u32;
    let mut block = 256usize;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rate" => {
                let value = args.next().context("--rate needs a value")?;
                rate = value.parse().with_context(|| format!("Invalid rate {:?}", value))?;
            }
            "--block" => {
                let value = args.next().context("--block needs a value")?;
                block = value.parse().with_context(|| format!("Invalid block size {:?}", value))?;
            }
            "-h" | "--help" => bail!("{}", USAGE),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let [kit, song, out]: [PathBuf; 3] = positional
        .try_into()
        .map_err(|_| anyhow::anyhow!("{}", USAGE))?;
    if rate == 0 || block == 0 {
        bail!("Rate and block size must be positive");
    }
    Ok(Args {
        kit,
        song,
        out,
        rate,
        block,
    })
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    log::info!("padbank-render starting ({} Hz, {} frame blocks)", args.rate, args.block);

    let config: EngineConfig = load_config(&default_config_path());
    let kit = KitConfig::load(&args.kit)?;
    let song_bytes = std::fs::read(&args.song)
        .with_context(|| format!("Failed to read song {:?}", args.song))?;
    let events = song::load_song(&song_bytes, args.rate)?;

    let mut host = OfflineHost::new(args.rate, args.block, config)?;
    host.load_kit(&kit)?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: args.rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.out, spec)
        .with_context(|| format!("Failed to create {:?}", args.out))?;

    let mut peak = 0.0f32;
    let frames = host.render_song(&events, TAIL_SECONDS * args.rate as u64, |left, right| {
        for (&l, &r) in left.iter().zip(right) {
            peak = peak.max(l.abs()).max(r.abs());
            writer.write_sample(l)?;
            writer.write_sample(r)?;
        }
        Ok(())
    })?;
    writer.finalize().context("Failed to finalize WAV file")?;

    let mirror = host.mirror();
    let played: u64 = mirror.loaded_pads().map(|pad| mirror.pad(pad).plays).sum();
    log::info!(
        "Rendered {} frames ({:.2}s) to {:?}, peak {:.3}, {} pad hits",
        frames,
        frames as f64 / args.rate as f64,
        args.out,
        peak,
        played
    );
    for failure in mirror.failures() {
        log::warn!(
            "Pad {} never loaded: {}",
            failure.pad,
            failure.error.map(|e| e.name()).unwrap_or("unknown error")
        );
    }

    let counters = host.finish();
    if counters.dropped_notifications > 0 || counters.dropped_jobs > 0 {
        log::warn!(
            "Engine dropped {} notifications and {} jobs",
            counters.dropped_notifications,
            counters.dropped_jobs
        );
    }
    Ok(())
}
