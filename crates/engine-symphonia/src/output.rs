// cpal output stream fed from the decode ring

use crate::decoder::TrackFormat;
use crate::engine::PlaybackState;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use cue_core::{AudioError, Result};
use cue_ringbuffer::SharedRing;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Open output stream. Lives on the thread that created it.
pub struct OutputStream {
    _stream: Stream,
}

impl OutputStream {
    /// Open the default device at the track's rate and channel count and start
    /// pulling. The callback renders silence while the engine is paused.
    pub fn open(format: TrackFormat, ring: SharedRing, state: Arc<PlaybackState>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("No output device available".to_string()))?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = format.channels.max(1) as u64;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !state.playing.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    let written = ring.pop(data);
                    let volume = state.volume();
                    if volume < 1.0 {
                        for sample in &mut data[..written] {
                            *sample *= volume;
                        }
                    }
                    // Underrun: never replay stale samples
                    data[written..].fill(0.0);

                    state
                        .played_frames
                        .fetch_add(written as u64 / channels, Ordering::Relaxed);
                },
                |err| {
                    log::error!("[output] stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::Device(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::Device(format!("Failed to start stream: {}", e)))?;

        log::debug!(
            "[output] stream open: {} Hz, {} channel(s)",
            format.sample_rate,
            format.channels
        );
        Ok(Self { _stream: stream })
    }
}
