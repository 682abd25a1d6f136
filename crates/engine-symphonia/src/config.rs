// Desktop engine configuration

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Seconds of decoded audio buffered ahead of the output
    pub buffer_seconds: f32,
    /// Decode thread sleep while the ring is full or playback is idle
    pub idle_poll_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 2.0,
            idle_poll_ms: 10,
        }
    }
}

impl EngineConfig {
    pub fn with_buffer_seconds(mut self, seconds: f32) -> Self {
        self.buffer_seconds = seconds.max(0.1);
        self
    }

    pub fn with_idle_poll_ms(mut self, poll_ms: u64) -> Self {
        self.idle_poll_ms = poll_ms.max(1);
        self
    }

    pub(crate) fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Ring capacity in samples for a stream of this shape
    pub(crate) fn ring_capacity(&self, sample_rate: u32, channels: u16) -> usize {
        (sample_rate as f32 * channels as f32 * self.buffer_seconds) as usize
    }
}
