// Track decoding using Symphonia
// Probes a local file, then yields interleaved f32 chunks for its default track

use cue_core::{AudioError, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use std::fs::File;
use std::path::Path;

/// Format of the decoded track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// None for sources without a frame count
    pub duration_ms: Option<u64>,
}

impl TrackFormat {
    pub fn ms_to_frames(&self, ms: u64) -> u64 {
        ms * self.sample_rate as u64 / 1000
    }
}

pub struct TrackDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: TrackFormat,
    scratch: Option<SampleBuffer<f32>>,
}

impl TrackDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| AudioError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint_for(path),
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::Decoding(format!("probe {}: {}", path.display(), e)))?;
        let reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| AudioError::Decoding("no default track".to_string()))?;
        let params = &track.codec_params;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| AudioError::Decoding("sample rate not specified".to_string()))?;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let duration_ms = params.n_frames.map(|frames| match params.time_base {
            Some(base) => {
                let time = base.calc_time(frames);
                time.seconds * 1000 + (time.frac * 1000.0).round() as u64
            }
            None => frames * 1000 / sample_rate as u64,
        });

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decoding(format!("no decoder: {}", e)))?;

        let format = TrackFormat {
            sample_rate,
            channels,
            duration_ms,
        };
        let track_id = track.id;
        log::info!(
            "[decoder] {}: {} Hz, {} channel(s), {:?} ms",
            path.display(),
            format.sample_rate,
            format.channels,
            format.duration_ms
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            format,
            scratch: None,
        })
    }

    pub fn format(&self) -> TrackFormat {
        self.format
    }

    /// Decode the next packet of the track. `Ok(None)` at end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(e) => return Err(AudioError::Decoding(format!("read packet: {}", e))),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet; skip it and keep going
                    log::debug!("[decoder] skipping packet: {}", e);
                    continue;
                }
                Err(e) => return Err(AudioError::Decoding(format!("decode: {}", e))),
            };

            let frames = decoded.capacity() as u64;
            let spec = *decoded.spec();
            let needed = decoded.capacity() * spec.channels.count();
            if self.scratch.as_ref().is_some_and(|buf| buf.capacity() < needed) {
                self.scratch = None;
            }
            let scratch = self
                .scratch
                .get_or_insert_with(|| SampleBuffer::<f32>::new(frames, spec));
            scratch.copy_interleaved_ref(decoded);
            return Ok(Some(scratch.samples().to_vec()));
        }
    }

    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        let time = Time::new(position_ms / 1000, (position_ms % 1000) as f64 / 1000.0);
        self.reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| AudioError::Decoding(format!("seek to {} ms: {}", position_ms, e)))?;
        self.decoder.reset();
        Ok(())
    }
}

/// Probe hint from the file extension
pub fn hint_for(path: &Path) -> Hint {
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }
    hint
}
