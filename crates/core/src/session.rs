// Playback session: reconciles client intent with the engine's asynchronous
// single-shot preparation lifecycle.
//
// Commands never fail because of the current phase; a command that does not
// apply is a no-op, and a seek that cannot apply yet is deferred.

use crate::callback::CallbackEvent;
use crate::engine::{
    EngineContext, EngineEvent, EngineEventSender, EngineFactory, EngineId, EngineNotice,
    MediaEngine, StreamUsage,
};
use crate::error::{describe_error, AudioError, Result};
use crate::focus::{AudioFocus, FocusChange};
use crate::state::{Lifecycle, MediaSource, ReleaseMode, SessionStatus, StickySettings};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Engine ownership by phase. The instance only exists outside `Released`.
enum EngineSlot {
    Released,
    Loading(Box<dyn MediaEngine>),
    Prepared(Box<dyn MediaEngine>),
}

impl EngineSlot {
    fn lifecycle(&self) -> Lifecycle {
        match self {
            EngineSlot::Released => Lifecycle::Released,
            EngineSlot::Loading(_) => Lifecycle::Loading,
            EngineSlot::Prepared(_) => Lifecycle::Prepared,
        }
    }

    fn engine_mut(&mut self) -> Option<&mut Box<dyn MediaEngine>> {
        match self {
            EngineSlot::Released => None,
            EngineSlot::Loading(engine) | EngineSlot::Prepared(engine) => Some(engine),
        }
    }

    fn engine(&self) -> Option<&dyn MediaEngine> {
        match self {
            EngineSlot::Released => None,
            EngineSlot::Loading(engine) | EngineSlot::Prepared(engine) => Some(engine.as_ref()),
        }
    }
}

/// Collaborators a session needs to create engines and reach the host
#[derive(Clone)]
pub struct SessionContext {
    pub factory: Arc<dyn EngineFactory>,
    pub engine_events: Sender<EngineNotice>,
    /// Present only when focus handling is enabled
    pub focus: Option<Arc<dyn AudioFocus>>,
    pub duck_factor: f32,
}

/// One playback identity and its full state
pub struct Session {
    player_id: String,
    source: Option<MediaSource>,
    settings: StickySettings,
    playing: bool,
    pending_seek_ms: Option<u64>,
    ducked: bool,
    /// Set once an engine error triggered a reload; cleared by `Prepared`
    reloaded_after_error: bool,
    slot: EngineSlot,
    context: SessionContext,
    outbox: Vec<CallbackEvent>,
}

impl Session {
    pub fn new(player_id: impl Into<String>, context: SessionContext) -> Self {
        let player_id = player_id.into();
        log::debug!("[{}] session created", player_id);
        Self {
            player_id,
            source: None,
            settings: StickySettings::default(),
            playing: false,
            pending_seek_ms: None,
            ducked: false,
            reloaded_after_error: false,
            slot: EngineSlot::Released,
            context,
            outbox: Vec::new(),
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.slot.lifecycle()
    }

    pub fn engine_id(&self) -> Option<EngineId> {
        self.slot.engine().map(|engine| engine.id())
    }

    pub fn source(&self) -> Option<&MediaSource> {
        self.source.as_ref()
    }

    pub fn settings(&self) -> StickySettings {
        self.settings
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            player_id: self.player_id.clone(),
            lifecycle: self.lifecycle(),
            playing: self.playing,
            source: self.source.clone(),
            settings: self.settings,
            pending_seek_ms: self.pending_seek_ms,
        }
    }

    /// Notifications produced since the last call, in emission order
    pub fn drain_events(&mut self) -> Vec<CallbackEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Bind a new source, or clear it with `None`.
    /// Equal sources (including both absent) leave everything untouched.
    pub fn set_source(&mut self, source: Option<MediaSource>) -> Result<()> {
        if self.source == source {
            log::debug!("[{}] set_source: unchanged, ignoring", self.player_id);
            return Ok(());
        }
        log::info!(
            "[{}] set_source: {}",
            self.player_id,
            source.as_ref().map_or_else(|| "none".to_string(), |s| s.to_string())
        );
        self.source = source;
        self.reloaded_after_error = false;
        self.load()
    }

    pub fn play(&mut self) -> Result<()> {
        if self.playing && self.lifecycle() != Lifecycle::Released {
            log::debug!("[{}] play: already playing", self.player_id);
            return Ok(());
        }
        match self.lifecycle() {
            Lifecycle::Released => {
                if self.source.is_none() {
                    log::debug!("[{}] play: no source bound, nothing to load", self.player_id);
                    return Ok(());
                }
                self.playing = true;
                if let Err(err) = self.load() {
                    self.playing = false;
                    return Err(err);
                }
                Ok(())
            }
            Lifecycle::Loading => {
                // Auto-start happens when the engine reports Prepared
                self.playing = true;
                Ok(())
            }
            Lifecycle::Prepared => {
                self.playing = true;
                self.start_engine()
            }
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if !self.playing {
            return Ok(());
        }
        self.playing = false;
        if let EngineSlot::Prepared(engine) = &mut self.slot {
            engine.pause()?;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.lifecycle() != Lifecycle::Prepared {
            log::debug!("[{}] stop: nothing prepared, ignoring", self.player_id);
            return Ok(());
        }
        if self.settings.release_mode == ReleaseMode::Release {
            self.release();
            return Ok(());
        }
        let was_playing = std::mem::replace(&mut self.playing, false);
        if let EngineSlot::Prepared(engine) = &mut self.slot {
            if was_playing {
                engine.pause()?;
            }
            engine.seek_to(0)?;
        }
        Ok(())
    }

    /// Seek now if prepared, otherwise remember the target for the next Prepared
    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        match &mut self.slot {
            EngineSlot::Prepared(engine) => engine.seek_to(position_ms),
            _ => {
                log::debug!("[{}] seek to {} ms deferred", self.player_id, position_ms);
                self.pending_seek_ms = Some(position_ms);
                Ok(())
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        if volume.is_nan() {
            return Err(AudioError::InvalidArgument("volume is NaN".to_string()));
        }
        let volume = volume.clamp(0.0, 1.0);
        if self.settings.volume == volume {
            return Ok(());
        }
        self.settings.volume = volume;
        let effective = self.effective_volume();
        if let Some(engine) = self.slot.engine_mut() {
            engine.set_volume(effective)?;
        }
        Ok(())
    }

    pub fn set_release_mode(&mut self, mode: ReleaseMode) -> Result<()> {
        if self.settings.release_mode == mode {
            return Ok(());
        }
        log::debug!("[{}] release mode -> {}", self.player_id, mode);
        self.settings.release_mode = mode;
        if let Some(engine) = self.slot.engine_mut() {
            engine.set_looping(mode.is_looping())?;
        }
        Ok(())
    }

    pub fn config_attributes(&mut self, respect_silence: bool, keep_awake: bool) -> Result<()> {
        if self.settings.respect_silence != respect_silence {
            self.settings.respect_silence = respect_silence;
            if let Some(engine) = self.slot.engine_mut() {
                engine.set_stream_usage(StreamUsage::for_respect_silence(respect_silence))?;
            }
        }
        if self.settings.keep_awake != keep_awake {
            self.settings.keep_awake = keep_awake;
            if keep_awake {
                if let Some(engine) = self.slot.engine_mut() {
                    engine.set_wake_lock(true)?;
                }
            }
        }
        Ok(())
    }

    /// Duration of the loaded source; unknown until prepared
    pub fn duration_ms(&self) -> Option<u64> {
        match &self.slot {
            EngineSlot::Prepared(engine) => engine.duration_ms(),
            _ => None,
        }
    }

    /// Current position; unknown until prepared
    pub fn position_ms(&self) -> Option<u64> {
        match &self.slot {
            EngineSlot::Prepared(engine) => Some(engine.position_ms()),
            _ => None,
        }
    }

    pub fn is_actually_playing(&self) -> bool {
        self.playing && self.lifecycle() == Lifecycle::Prepared
    }

    /// Tear down any engine instance. Source and sticky settings are kept.
    pub fn release(&mut self) {
        let slot = std::mem::replace(&mut self.slot, EngineSlot::Released);
        let started = matches!(slot, EngineSlot::Prepared(_)) && self.playing;
        self.playing = false;

        let mut engine = match slot {
            EngineSlot::Released => return,
            EngineSlot::Loading(engine) | EngineSlot::Prepared(engine) => engine,
        };
        log::info!("[{}] releasing {}", self.player_id, engine.id());
        if started {
            if let Err(err) = engine.stop() {
                log::warn!("[{}] stop before release failed: {}", self.player_id, err);
            }
        }
        if let Err(err) = engine.reset() {
            log::warn!("[{}] reset before release failed: {}", self.player_id, err);
        }
        engine.release();
    }

    // ------------------------------------------------------------------
    // Host signals
    // ------------------------------------------------------------------

    /// Apply one engine callback. Callbacks from any instance other than the
    /// current one are stale and dropped without touching state.
    pub fn on_engine_event(&mut self, engine_id: EngineId, event: EngineEvent) {
        if self.engine_id() != Some(engine_id) {
            log::debug!(
                "[{}] discarding stale {:?} from {}",
                self.player_id,
                event,
                engine_id
            );
            return;
        }
        match event {
            EngineEvent::Prepared => self.on_prepared(),
            EngineEvent::Completed => self.on_completed(),
            EngineEvent::Error { code, extra } => self.on_error(code, extra),
        }
    }

    pub fn on_focus_change(&mut self, change: FocusChange) {
        log::debug!("[{}] focus change: {:?}", self.player_id, change);
        let result = match change {
            FocusChange::Lost | FocusChange::LostTransient => self.pause(),
            FocusChange::LostTransientCanDuck => {
                self.ducked = true;
                self.apply_effective_volume()
            }
            FocusChange::Gained => {
                self.ducked = false;
                let resumed = if self.playing { Ok(()) } else { self.play() };
                resumed.and_then(|_| self.apply_effective_volume())
            }
        };
        if let Err(err) = result {
            log::warn!("[{}] focus change {:?} failed: {}", self.player_id, change, err);
        }
    }

    /// Position report for a session that is audibly playing
    pub fn position_event(&self) -> Option<CallbackEvent> {
        if !self.is_actually_playing() {
            return None;
        }
        let engine = self.slot.engine()?;
        Some(CallbackEvent::Position {
            player_id: self.player_id.clone(),
            position_ms: engine.position_ms(),
            duration_ms: engine.duration_ms().unwrap_or(0),
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn on_prepared(&mut self) {
        let engine = match std::mem::replace(&mut self.slot, EngineSlot::Released) {
            EngineSlot::Loading(engine) => engine,
            other => {
                // Duplicate Prepared for an instance that is already ready
                self.slot = other;
                log::debug!("[{}] ignoring repeated prepared", self.player_id);
                return;
            }
        };
        log::info!("[{}] {} prepared", self.player_id, engine.id());
        self.slot = EngineSlot::Prepared(engine);
        self.reloaded_after_error = false;

        if let Some(position_ms) = self.pending_seek_ms.take() {
            if let EngineSlot::Prepared(engine) = &mut self.slot {
                if let Err(err) = engine.seek_to(position_ms) {
                    log::warn!("[{}] deferred seek failed: {}", self.player_id, err);
                }
            }
        }
        if self.playing {
            if let Err(err) = self.start_engine() {
                log::error!("[{}] auto-start failed: {}", self.player_id, err);
            }
        }
        let duration_ms = self.duration_ms().unwrap_or(0);
        self.emit(CallbackEvent::Duration {
            player_id: self.player_id.clone(),
            duration_ms,
        });
    }

    fn on_completed(&mut self) {
        log::info!("[{}] playback completed", self.player_id);
        if self.settings.release_mode != ReleaseMode::Loop {
            if let Err(err) = self.stop() {
                log::warn!("[{}] stop after completion failed: {}", self.player_id, err);
            }
        }
        self.emit(CallbackEvent::Completion {
            player_id: self.player_id.clone(),
        });
    }

    fn on_error(&mut self, code: i32, extra: i32) {
        log::error!(
            "[{}] engine error {} ({}), extra {}",
            self.player_id,
            code,
            describe_error(code),
            extra
        );
        self.release();
        // One reload per failure; a source that keeps failing stays released
        // until the client plays or binds again
        if self.reloaded_after_error {
            log::warn!(
                "[{}] engine failed again before preparing, staying released",
                self.player_id
            );
        } else {
            self.reloaded_after_error = true;
            if let Err(err) = self.load() {
                log::warn!("[{}] reload after engine error failed: {}", self.player_id, err);
            }
        }
        self.emit(CallbackEvent::Error {
            player_id: self.player_id.clone(),
            code,
            message: AudioError::EngineError { code, extra }.to_string(),
        });
    }

    /// Bring the engine to `Loading` for the current source.
    ///
    /// Released: a fresh instance is created. Loading: the in-flight
    /// instance is discarded for a fresh one so its pending Prepared turns
    /// stale. Prepared: the instance is reset in place under a new id and
    /// playback intent is dropped.
    fn load(&mut self) -> Result<()> {
        let Some(source) = self.source.clone() else {
            self.release();
            return Ok(());
        };

        let engine = match std::mem::replace(&mut self.slot, EngineSlot::Released) {
            EngineSlot::Released => self.create_engine()?,
            EngineSlot::Loading(mut engine) => {
                log::debug!("[{}] abandoning in-flight {}", self.player_id, engine.id());
                // Best effort: the instance is discarded either way
                let _ = engine.reset();
                engine.release();
                self.create_engine()?
            }
            EngineSlot::Prepared(mut engine) => {
                self.playing = false;
                if let Err(err) = engine.reset() {
                    engine.release();
                    return Err(err);
                }
                // Reports still queued from the previous cycle turn stale
                engine.set_event_sender(self.event_sender(EngineId::next()));
                engine
            }
        };

        let engine = self.bind(engine, &source)?;
        log::info!("[{}] {} loading {}", self.player_id, engine.id(), source);
        self.slot = EngineSlot::Loading(engine);
        Ok(())
    }

    /// Create an instance and reapply every sticky setting to it
    fn create_engine(&self) -> Result<Box<dyn MediaEngine>> {
        let engine_id = EngineId::next();
        let context = EngineContext {
            player_id: self.player_id.clone(),
            engine_id,
            events: self.event_sender(engine_id),
        };
        let mut engine = self.context.factory.create(context)?;
        let configured = engine
            .set_stream_usage(StreamUsage::for_respect_silence(self.settings.respect_silence))
            .and_then(|_| {
                if self.settings.keep_awake {
                    engine.set_wake_lock(true)
                } else {
                    Ok(())
                }
            })
            .and_then(|_| engine.set_volume(self.effective_volume()))
            .and_then(|_| engine.set_looping(self.settings.release_mode.is_looping()));
        if let Err(err) = configured {
            engine.release();
            return Err(err);
        }
        log::debug!("[{}] created {}", self.player_id, engine.id());
        Ok(engine)
    }

    /// Bind the source, reapply volume and loop flag, request preparation.
    /// On failure the instance is released and the session stays `Released`.
    fn bind(
        &self,
        mut engine: Box<dyn MediaEngine>,
        source: &MediaSource,
    ) -> Result<Box<dyn MediaEngine>> {
        let bound = engine
            .set_data_source(source)
            .and_then(|_| engine.set_volume(self.effective_volume()))
            .and_then(|_| engine.set_looping(self.settings.release_mode.is_looping()))
            .and_then(|_| engine.prepare_async());
        match bound {
            Ok(()) => Ok(engine),
            Err(err) => {
                log::warn!("[{}] unable to bind {}: {}", self.player_id, source, err);
                engine.release();
                Err(err)
            }
        }
    }

    fn start_engine(&mut self) -> Result<()> {
        let EngineSlot::Prepared(engine) = &mut self.slot else {
            return Ok(());
        };
        engine.start()?;
        if let Some(focus) = &self.context.focus {
            focus.request_focus(&self.player_id);
        }
        self.emit(CallbackEvent::Playing {
            player_id: self.player_id.clone(),
        });
        Ok(())
    }

    fn event_sender(&self, engine_id: EngineId) -> EngineEventSender {
        EngineEventSender::new(&self.player_id, engine_id, self.context.engine_events.clone())
    }

    fn effective_volume(&self) -> f32 {
        if self.ducked {
            self.settings.volume * self.context.duck_factor
        } else {
            self.settings.volume
        }
    }

    fn apply_effective_volume(&mut self) -> Result<()> {
        let effective = self.effective_volume();
        match self.slot.engine_mut() {
            Some(engine) => engine.set_volume(effective),
            None => Ok(()),
        }
    }

    fn emit(&mut self, event: CallbackEvent) {
        self.outbox.push(event);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
