// Player registry: the client-facing command surface.
//
// Sessions are keyed by caller-supplied ids and created on first reference.
// Each session sits behind its own lock, which serialises client commands
// and engine callbacks for it. Engines report through a channel drained by
// `dispatch_pending` (or the dispatcher thread), so no engine ever re-enters
// a session while a command holds its lock. Client notifications are
// dispatched after the session lock is dropped, under a per-session delivery
// guard, so each player's notifications reach listeners in emission order
// even when a command thread and the dispatcher overlap. The guard is
// reentrant: a listener may call back into the registry for the same player.

use crate::callback::{CallbackEvent, CallbackManager, PlayerCallback};
use crate::config::ControllerConfig;
use crate::engine::{engine_channel, EngineEventReceiver, EngineFactory, EngineNotice};
use crate::error::Result;
use crate::focus::{AudioFocus, FocusChange};
use crate::session::{Session, SessionContext};
use crate::state::{MediaSource, ReleaseMode, SessionStatus};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A session plus the guard that orders delivery of its notifications.
/// Lock order: `delivery`, then `session`.
struct SessionCell {
    session: Mutex<Session>,
    delivery: ReentrantMutex<()>,
}

impl SessionCell {
    fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            delivery: ReentrantMutex::new(()),
        }
    }
}

pub struct PlayerRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionCell>>>,
    context: SessionContext,
    callbacks: CallbackManager,
    config: ControllerConfig,
    engine_events: EngineEventReceiver,
    closed: AtomicBool,
}

impl PlayerRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>, config: ControllerConfig) -> Self {
        let (tx, rx) = engine_channel();
        log::info!(
            "PlayerRegistry::new (focus handling {})",
            if config.focus_handling { "on" } else { "off" }
        );
        Self {
            sessions: Mutex::new(HashMap::new()),
            context: SessionContext {
                factory,
                engine_events: tx,
                focus: None,
                duck_factor: config.duck_factor,
            },
            callbacks: CallbackManager::new(),
            config,
            engine_events: rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Attach the host's focus arbiter. Ignored unless focus handling is enabled.
    pub fn with_audio_focus(mut self, focus: Arc<dyn AudioFocus>) -> Self {
        if self.config.focus_handling {
            self.context.focus = Some(focus);
        } else {
            log::warn!("audio focus arbiter supplied but focus handling is disabled");
        }
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn add_callback(&self, callback: Arc<dyn PlayerCallback>) {
        self.callbacks
            .add_callback(callback, self.config.position_interval_ms);
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.clear_callbacks();
    }

    pub fn player_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub fn set_source(&self, player_id: &str, reference: &str, is_local: bool) -> Result<()> {
        let source = MediaSource::new(reference, is_local);
        self.with_session(player_id, |s| s.set_source(Some(source)))
    }

    pub fn clear_source(&self, player_id: &str) -> Result<()> {
        self.with_session(player_id, |s| s.set_source(None))
    }

    pub fn play(&self, player_id: &str) -> Result<()> {
        self.with_session(player_id, |s| s.play())
    }

    pub fn pause(&self, player_id: &str) -> Result<()> {
        self.with_session(player_id, |s| s.pause())
    }

    pub fn stop(&self, player_id: &str) -> Result<()> {
        self.with_session(player_id, |s| s.stop())
    }

    pub fn release(&self, player_id: &str) -> Result<()> {
        self.with_session(player_id, |s| {
            s.release();
            Ok(())
        })
    }

    pub fn seek(&self, player_id: &str, position_ms: u64) -> Result<()> {
        self.with_session(player_id, |s| s.seek(position_ms))
    }

    pub fn set_volume(&self, player_id: &str, volume: f32) -> Result<()> {
        self.with_session(player_id, |s| s.set_volume(volume))
    }

    pub fn set_release_mode(&self, player_id: &str, mode: ReleaseMode) -> Result<()> {
        self.with_session(player_id, |s| s.set_release_mode(mode))
    }

    pub fn config_attributes(
        &self,
        player_id: &str,
        respect_silence: bool,
        keep_awake: bool,
    ) -> Result<()> {
        self.with_session(player_id, |s| {
            s.config_attributes(respect_silence, keep_awake)
        })
    }

    /// Duration in milliseconds, 0 while unknown
    pub fn get_duration(&self, player_id: &str) -> u64 {
        self.query(player_id, |s| s.duration_ms().unwrap_or(0))
    }

    /// Position in milliseconds, 0 while unknown
    pub fn get_current_position(&self, player_id: &str) -> u64 {
        self.query(player_id, |s| s.position_ms().unwrap_or(0))
    }

    pub fn is_playing(&self, player_id: &str) -> bool {
        self.query(player_id, Session::is_actually_playing)
    }

    pub fn status(&self, player_id: &str) -> Option<SessionStatus> {
        let cell = self.sessions.lock().get(player_id).cloned()?;
        let status = cell.session.lock().status();
        Some(status)
    }

    /// Forward a host focus change. No effect unless focus handling is enabled.
    pub fn focus_changed(&self, player_id: &str, change: FocusChange) {
        if !self.config.focus_handling {
            log::debug!("[{}] focus change {:?} ignored", player_id, change);
            return;
        }
        let Some(cell) = self.sessions.lock().get(player_id).cloned() else {
            return;
        };
        let _delivery = cell.delivery.lock();
        let events = {
            let mut session = cell.session.lock();
            session.on_focus_change(change);
            session.drain_events()
        };
        self.dispatch(events);
    }

    /// Release a session's resources and forget it
    pub fn dispose(&self, player_id: &str) {
        let removed = self.sessions.lock().remove(player_id);
        if let Some(cell) = removed {
            log::info!("[{}] disposing session", player_id);
            cell.session.lock().release();
            self.callbacks.forget_player(player_id);
        }
    }

    /// Dispose every session and stop the dispatcher thread
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let sessions: Vec<_> = self.sessions.lock().drain().collect();
        log::info!("shutting down {} session(s)", sessions.len());
        for (player_id, cell) in sessions {
            cell.session.lock().release();
            self.callbacks.forget_player(&player_id);
        }
    }

    // ------------------------------------------------------------------
    // Engine events and periodic work
    // ------------------------------------------------------------------

    /// Apply every queued engine event. Returns how many were processed.
    pub fn dispatch_pending(&self) -> usize {
        let mut processed = 0;
        while let Ok(notice) = self.engine_events.try_recv() {
            self.apply_notice(notice);
            processed += 1;
        }
        processed
    }

    /// Emit a `Position` notification for every audibly playing session
    pub fn emit_positions(&self) {
        let cells: Vec<_> = self.sessions.lock().values().cloned().collect();
        for cell in cells {
            let _delivery = cell.delivery.lock();
            let event = cell.session.lock().position_event();
            self.dispatch(event.into_iter().collect());
        }
    }

    /// Background thread applying engine events as they arrive and emitting
    /// position updates between them. Exits on `shutdown` or once the
    /// registry is dropped.
    pub fn spawn_dispatcher(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let events = self.engine_events.clone();
        let tick = Duration::from_millis(self.config.position_interval_ms.max(1));

        thread::spawn(move || {
            log::info!("engine event dispatcher started");
            loop {
                let received = events.recv_timeout(tick);
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if registry.closed.load(Ordering::SeqCst) {
                    break;
                }
                match received {
                    Ok(notice) => {
                        registry.apply_notice(notice);
                        registry.dispatch_pending();
                    }
                    Err(RecvTimeoutError::Timeout) => registry.emit_positions(),
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::info!("engine event dispatcher exited");
        })
    }

    fn apply_notice(&self, notice: EngineNotice) {
        let Some(cell) = self.sessions.lock().get(&notice.player_id).cloned() else {
            log::debug!(
                "[{}] {:?} for disposed session dropped",
                notice.player_id,
                notice.event
            );
            return;
        };
        let _delivery = cell.delivery.lock();
        let events = {
            let mut session = cell.session.lock();
            session.on_engine_event(notice.engine_id, notice.event);
            session.drain_events()
        };
        self.dispatch(events);
    }

    fn cell(&self, player_id: &str) -> Arc<SessionCell> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(player_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionCell::new(Session::new(player_id, self.context.clone())))
            })
            .clone()
    }

    fn with_session<R>(&self, player_id: &str, f: impl FnOnce(&mut Session) -> Result<R>) -> Result<R> {
        let cell = self.cell(player_id);
        let _delivery = cell.delivery.lock();
        let (result, events) = {
            let mut session = cell.session.lock();
            let result = f(&mut session);
            (result, session.drain_events())
        };
        self.dispatch(events);
        if let Err(err) = &result {
            log::error!("[{}] command failed: {}", player_id, err);
        }
        result
    }

    fn query<R>(&self, player_id: &str, f: impl FnOnce(&Session) -> R) -> R {
        let cell = self.cell(player_id);
        let session = cell.session.lock();
        f(&session)
    }

    fn dispatch(&self, events: Vec<CallbackEvent>) {
        for event in events {
            self.callbacks.dispatch_event(event);
        }
    }
}

impl Drop for PlayerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
