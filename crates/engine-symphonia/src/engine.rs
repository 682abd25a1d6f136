// Desktop media engine: Symphonia decode thread feeding a cpal output stream

use crate::config::EngineConfig;
use crate::decoder::{TrackDecoder, TrackFormat};
use crate::output::OutputStream;
use cue_core::error::{ERROR_IO, ERROR_MALFORMED, ERROR_UNSUPPORTED};
use cue_core::{
    AudioError, EngineContext, EngineEventSender, EngineFactory, EngineId, MediaEngine,
    MediaSource, Result, StreamUsage,
};
use cue_ringbuffer::SharedRing;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// State shared between the engine handle, its decode thread and the output callback.
/// One instance per prepare cycle; a reset hands the next cycle a fresh one.
pub(crate) struct PlaybackState {
    pub(crate) playing: AtomicBool,
    looping: AtomicBool,
    shutdown: AtomicBool,
    prepared: AtomicBool,
    completed: AtomicBool,
    volume_bits: AtomicU32,
    pub(crate) played_frames: AtomicU64,
    sample_rate: AtomicU32,
    duration_ms: Mutex<Option<u64>>,
    seek_request: Mutex<Option<u64>>,
}

impl PlaybackState {
    fn new(volume: f32, looping: bool) -> Self {
        Self {
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(looping),
            shutdown: AtomicBool::new(false),
            prepared: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            volume_bits: AtomicU32::new(volume.to_bits()),
            played_frames: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            duration_ms: Mutex::new(None),
            seek_request: Mutex::new(None),
        }
    }

    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    fn set_format(&self, format: TrackFormat) {
        self.sample_rate.store(format.sample_rate, Ordering::SeqCst);
        *self.duration_ms.lock() = format.duration_ms;
    }

    fn request_seek(&self, position_ms: u64) {
        *self.seek_request.lock() = Some(position_ms);
    }

    fn take_seek(&self) -> Option<u64> {
        self.seek_request.lock().take()
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn position_ms(&self) -> u64 {
        // A queued seek is where playback is about to be
        if let Some(position_ms) = *self.seek_request.lock() {
            return position_ms;
        }
        let rate = self.sample_rate.load(Ordering::SeqCst) as u64;
        if rate == 0 {
            return 0;
        }
        let position_ms = self.played_frames.load(Ordering::Relaxed) * 1000 / rate;
        match *self.duration_ms.lock() {
            Some(duration) if duration > 0 => {
                if self.looping.load(Ordering::Relaxed) {
                    position_ms % duration
                } else {
                    position_ms.min(duration)
                }
            }
            _ => position_ms,
        }
    }
}

/// Engine instance for local files on desktop hosts
pub struct DesktopEngine {
    player_id: String,
    config: EngineConfig,
    events: EngineEventSender,
    source: Option<PathBuf>,
    state: Arc<PlaybackState>,
    worker: Option<thread::JoinHandle<()>>,
    released: bool,
}

impl DesktopEngine {
    pub fn new(context: EngineContext, config: EngineConfig) -> Self {
        Self {
            player_id: context.player_id,
            config,
            events: context.events,
            source: None,
            state: Arc::new(PlaybackState::new(1.0, false)),
            worker: None,
            released: false,
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.released {
            return Err(AudioError::Engine(format!("{} already released", self.id())));
        }
        Ok(())
    }

    fn ensure_prepared(&self, operation: &str) -> Result<()> {
        self.ensure_alive()?;
        if !self.state.prepared.load(Ordering::SeqCst) {
            return Err(AudioError::Engine(format!(
                "{} called before {} was prepared",
                operation,
                self.id()
            )));
        }
        Ok(())
    }

    /// Signal the decode thread and detach it, keeping volume and loop flag
    fn stop_worker(&mut self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        self.state.playing.store(false, Ordering::SeqCst);
        if self.worker.take().is_some() {
            log::debug!("[{}] detached decode thread", self.id());
        }
        let volume = self.state.volume();
        let looping = self.state.looping.load(Ordering::Relaxed);
        self.state = Arc::new(PlaybackState::new(volume, looping));
    }
}

impl MediaEngine for DesktopEngine {
    fn id(&self) -> EngineId {
        self.events.engine_id()
    }

    fn set_stream_usage(&mut self, usage: StreamUsage) -> Result<()> {
        self.ensure_alive()?;
        // Desktop hosts route every stream to the default output
        log::debug!("[{}] stream usage {:?} ignored", self.id(), usage);
        Ok(())
    }

    fn set_wake_lock(&mut self, enabled: bool) -> Result<()> {
        self.ensure_alive()?;
        // The output stream keeps running while paused; nothing to hold
        log::debug!(
            "[{}] wake lock {} ignored",
            self.id(),
            if enabled { "on" } else { "off" }
        );
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.ensure_alive()?;
        self.state
            .volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.ensure_alive()?;
        self.state.looping.store(looping, Ordering::Relaxed);
        Ok(())
    }

    fn set_data_source(&mut self, source: &MediaSource) -> Result<()> {
        self.ensure_alive()?;
        if self.source.is_some() {
            return Err(AudioError::Engine(format!(
                "{} already has a source, reset first",
                self.id()
            )));
        }
        if !source.is_local {
            return Err(AudioError::SourceUnavailable(format!(
                "remote sources are not supported: {}",
                source.reference
            )));
        }

        let reference = source.reference.as_str();
        let path = PathBuf::from(reference.strip_prefix("file://").unwrap_or(reference));
        let metadata = std::fs::metadata(&path)
            .map_err(|e| AudioError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(AudioError::SourceUnavailable(format!(
                "{} is not a file",
                path.display()
            )));
        }

        log::debug!("[{}] bound {}", self.id(), path.display());
        self.source = Some(path);
        Ok(())
    }

    fn prepare_async(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let path = self
            .source
            .clone()
            .ok_or_else(|| AudioError::Engine(format!("{} has no source", self.id())))?;
        if self.worker.is_some() {
            return Err(AudioError::Engine(format!("{} is already preparing", self.id())));
        }

        let worker = DecodeWorker {
            path,
            config: self.config.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            engine_id: self.id(),
        };
        let handle = thread::Builder::new()
            .name(format!("cue-{}-{}", self.player_id, self.id().as_u64()))
            .spawn(move || worker.run())
            .map_err(|e| AudioError::Engine(format!("Failed to spawn decode thread: {}", e)))?;
        self.worker = Some(handle);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.ensure_prepared("start")?;
        if self.state.completed.load(Ordering::SeqCst) {
            // Restart from the top after completion
            self.state.request_seek(0);
        }
        self.state.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.ensure_prepared("pause")?;
        self.state.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.ensure_prepared("stop")?;
        self.state.playing.store(false, Ordering::SeqCst);
        self.state.request_seek(0);
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.ensure_prepared("seek")?;
        let position_ms = match *self.state.duration_ms.lock() {
            Some(duration) => position_ms.min(duration),
            None => position_ms,
        };
        self.state.request_seek(position_ms);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.stop_worker();
        self.source = None;
        Ok(())
    }

    fn set_event_sender(&mut self, events: EngineEventSender) {
        log::debug!("[{}] now reporting as {}", self.id(), events.engine_id());
        self.events = events;
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop_worker();
        self.source = None;
        self.released = true;
        log::debug!("[{}] released", self.id());
    }

    fn duration_ms(&self) -> Option<u64> {
        *self.state.duration_ms.lock()
    }

    fn position_ms(&self) -> u64 {
        self.state.position_ms()
    }

    fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }
}

impl Drop for DesktopEngine {
    fn drop(&mut self) {
        self.release();
    }
}

/// Body of the prepare/decode thread of one prepare cycle
struct DecodeWorker {
    path: PathBuf,
    config: EngineConfig,
    state: Arc<PlaybackState>,
    events: EngineEventSender,
    engine_id: EngineId,
}

impl DecodeWorker {
    fn run(self) {
        let mut decoder = match TrackDecoder::open(&self.path) {
            Ok(decoder) => decoder,
            Err(err) => {
                log::warn!("[{}] prepare failed: {}", self.engine_id, err);
                self.report_error(ERROR_UNSUPPORTED);
                return;
            }
        };
        let format = decoder.format();
        self.state.set_format(format);

        let ring = SharedRing::new(self.config.ring_capacity(format.sample_rate, format.channels));
        // The stream is not Send; it lives and dies on this thread
        let _output = match OutputStream::open(format, ring.clone(), self.state.clone()) {
            Ok(output) => output,
            Err(err) => {
                log::warn!("[{}] prepare failed: {}", self.engine_id, err);
                self.report_error(ERROR_IO);
                return;
            }
        };

        if self.state.is_shut_down() {
            return;
        }
        self.state.prepared.store(true, Ordering::SeqCst);
        self.events.prepared();

        if let Err(err) = self.decode_loop(&mut decoder, format, &ring) {
            log::error!("[{}] playback failed: {}", self.engine_id, err);
            self.state.playing.store(false, Ordering::SeqCst);
            self.report_error(ERROR_MALFORMED);
        }
        log::debug!("[{}] decode thread exiting", self.engine_id);
    }

    fn decode_loop(
        &self,
        decoder: &mut TrackDecoder,
        format: TrackFormat,
        ring: &SharedRing,
    ) -> Result<()> {
        let idle = self.config.idle_poll();
        let mut pending: Vec<f32> = Vec::new();
        let mut offset = 0;
        let mut exhausted = false;

        while !self.state.is_shut_down() {
            if let Some(position_ms) = self.state.take_seek() {
                ring.clear();
                pending.clear();
                offset = 0;
                decoder.seek(position_ms)?;
                exhausted = false;
                self.state.completed.store(false, Ordering::SeqCst);
                self.state
                    .played_frames
                    .store(format.ms_to_frames(position_ms), Ordering::Relaxed);
                continue;
            }

            if offset < pending.len() {
                offset += ring.push(&pending[offset..]);
                if offset < pending.len() {
                    thread::sleep(idle);
                }
                continue;
            }

            if exhausted {
                if ring.is_empty()
                    && self.state.playing.load(Ordering::SeqCst)
                    && !self.state.completed.load(Ordering::SeqCst)
                {
                    self.state.playing.store(false, Ordering::SeqCst);
                    self.state.completed.store(true, Ordering::SeqCst);
                    log::info!("[{}] playback completed", self.engine_id);
                    self.events.completed();
                }
                thread::sleep(idle);
                continue;
            }

            match decoder.next_chunk()? {
                Some(chunk) => {
                    pending = chunk;
                    offset = 0;
                }
                None if self.state.looping.load(Ordering::Relaxed) => {
                    log::debug!("[{}] end of stream, looping", self.engine_id);
                    decoder.seek(0)?;
                }
                None => {
                    log::debug!("[{}] end of stream", self.engine_id);
                    exhausted = true;
                }
            }
        }
        Ok(())
    }

    fn report_error(&self, code: i32) {
        // Nobody is listening to a cycle that was reset or released
        if !self.state.is_shut_down() {
            self.events.error(code, 0);
        }
    }
}

/// Creates `DesktopEngine` instances
#[derive(Debug, Clone, Default)]
pub struct SymphoniaEngineFactory {
    config: EngineConfig,
}

impl SymphoniaEngineFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for SymphoniaEngineFactory {
    fn create(&self, context: EngineContext) -> Result<Box<dyn MediaEngine>> {
        Ok(Box::new(DesktopEngine::new(context, self.config.clone())))
    }
}
