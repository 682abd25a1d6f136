// Media engine adapter contract
// Platform engines implement MediaEngine and report back through EngineEventSender

use crate::error::Result;
use crate::state::MediaSource;
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one engine instance.
/// A fresh id is minted for every load cycle, so callbacks from a released
/// instance can never be mistaken for the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    pub fn next() -> Self {
        EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Callback kinds an engine raises toward the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Asynchronous preparation finished; the instance is ready
    Prepared,
    /// Playback reached the end of the source
    Completed,
    /// Preparation or playback failed
    Error { code: i32, extra: i32 },
}

/// An engine event together with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineNotice {
    pub player_id: String,
    pub engine_id: EngineId,
    pub event: EngineEvent,
}

/// Receiving end of the engine event queue
pub type EngineEventReceiver = Receiver<EngineNotice>;

/// Sending half handed to an engine instance at creation.
/// Cheap to clone into the engine's worker threads.
#[derive(Clone)]
pub struct EngineEventSender {
    player_id: Arc<str>,
    engine_id: EngineId,
    tx: Sender<EngineNotice>,
}

impl EngineEventSender {
    pub fn new(player_id: &str, engine_id: EngineId, tx: Sender<EngineNotice>) -> Self {
        Self {
            player_id: Arc::from(player_id),
            engine_id,
            tx,
        }
    }

    pub fn engine_id(&self) -> EngineId {
        self.engine_id
    }

    pub fn prepared(&self) {
        self.send(EngineEvent::Prepared);
    }

    pub fn completed(&self) {
        self.send(EngineEvent::Completed);
    }

    pub fn error(&self, code: i32, extra: i32) {
        self.send(EngineEvent::Error { code, extra });
    }

    fn send(&self, event: EngineEvent) {
        let notice = EngineNotice {
            player_id: self.player_id.to_string(),
            engine_id: self.engine_id,
            event,
        };
        if self.tx.send(notice).is_err() {
            // Controller is gone; nobody is left to care
            log::debug!("[{}] dropped {:?}, controller shut down", self.engine_id, event);
        }
    }
}

/// Create the queue engines report into
pub fn engine_channel() -> (Sender<EngineNotice>, EngineEventReceiver) {
    crossbeam_channel::unbounded()
}

/// Everything an engine instance needs at creation time
pub struct EngineContext {
    pub player_id: String,
    pub engine_id: EngineId,
    pub events: EngineEventSender,
}

/// Audio routing for the session's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamUsage {
    Media,
    NotificationRingtone,
}

impl StreamUsage {
    pub fn for_respect_silence(respect_silence: bool) -> Self {
        if respect_silence {
            StreamUsage::NotificationRingtone
        } else {
            StreamUsage::Media
        }
    }
}

/// One engine instance, exclusively owned by a session.
///
/// Operations mirror a platform media player: the controller only calls
/// start/pause/seek after `Prepared` was delivered, and never touches the
/// instance again after `release`. Reports carry the id of the sender the
/// instance currently holds.
pub trait MediaEngine: Send {
    fn id(&self) -> EngineId;

    fn set_stream_usage(&mut self, usage: StreamUsage) -> Result<()>;

    fn set_wake_lock(&mut self, enabled: bool) -> Result<()>;

    /// Set volume (0.0 - 1.0)
    fn set_volume(&mut self, volume: f32) -> Result<()>;

    fn set_looping(&mut self, looping: bool) -> Result<()>;

    /// Bind a source. Fails with `SourceUnavailable` when it cannot be reached.
    fn set_data_source(&mut self, source: &MediaSource) -> Result<()>;

    /// Start preparing. Exactly one of Prepared or Error is reported later.
    fn prepare_async(&mut self) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Seek to a position in milliseconds
    fn seek_to(&mut self, position_ms: u64) -> Result<()>;

    /// Return to the idle state, dropping the bound source
    fn reset(&mut self) -> Result<()>;

    /// Report through `events` from now on. Called after `reset` so the next
    /// prepare cycle carries a fresh id; `id()` must follow the sender.
    fn set_event_sender(&mut self, events: EngineEventSender);

    /// Free every resource. Irreversible.
    fn release(&mut self);

    /// Duration in milliseconds, if the source reports one
    fn duration_ms(&self) -> Option<u64>;

    fn position_ms(&self) -> u64;

    fn is_playing(&self) -> bool;
}

/// Creates engine instances for sessions
pub trait EngineFactory: Send + Sync {
    fn create(&self, context: EngineContext) -> Result<Box<dyn MediaEngine>>;
}
