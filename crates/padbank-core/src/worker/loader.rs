//! Sample file decoding (worker thread only)
//!
//! Everything here blocks and allocates freely. Files are decoded with
//! symphonia to interleaved f32, then folded to stereo: mono is duplicated to
//! both channels, anything beyond two channels is dropped.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::SampleData;
use crate::error::LoadError;
use crate::types::{StereoBuffer, StereoSample};

/// Decode `path` and build its waveform overview
pub fn load_sample(path: &Path, waveform_points: usize) -> Result<SampleData, LoadError> {
    let start = std::time::Instant::now();
    let (buffer, sample_rate) = decode_file(path)?;
    let peaks = compute_peaks(&buffer, waveform_points);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    log::info!(
        "Loaded '{}': {} frames @ {} Hz in {:?}",
        name,
        buffer.len(),
        sample_rate,
        start.elapsed()
    );

    Ok(SampleData {
        name,
        buffer,
        sample_rate,
        peaks,
    })
}

/// Decode an audio file to stereo frames, returning them with the file's rate
pub fn decode_file(path: &Path) -> Result<(StereoBuffer, u32), LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let unsupported = |reason: String| LoadError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason,
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| unsupported(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported("no audio track".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| unsupported("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(e.to_string()))?;

    let capacity = track.codec_params.n_frames.unwrap_or(0) as usize;
    let mut frames = StereoBuffer::with_capacity(capacity);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                if frames.is_empty() {
                    return Err(LoadError::Decode {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                log::warn!("Error reading packet from {:?}: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt packet in {:?}: {}", path, e);
                continue;
            }
            Err(e) => {
                return Err(LoadError::Decode {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            push_frames(&mut frames, buf.samples(), channels);
        }
    }

    if frames.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    Ok((frames, sample_rate))
}

fn push_frames(out: &mut StereoBuffer, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for &s in interleaved {
                out.push(StereoSample::mono(s));
            }
        }
        n => {
            for frame in interleaved.chunks_exact(n) {
                out.push(StereoSample::new(frame[0], frame[1]));
            }
        }
    }
}

/// Peak amplitude per column, `points` columns across the whole sample
pub fn compute_peaks(buffer: &StereoBuffer, points: usize) -> Vec<f32> {
    let len = buffer.len();
    if len == 0 || points == 0 {
        return Vec::new();
    }

    (0..points)
        .map(|col| {
            let start = col * len / points;
            let end = ((col + 1) * len / points).max(start + 1).min(len);
            buffer.as_slice()[start.min(len - 1)..end]
                .iter()
                .fold(0.0f32, |acc, s| acc.max(s.peak()))
        })
        .collect()
}
