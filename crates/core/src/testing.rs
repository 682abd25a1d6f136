// Scripted in-memory engine for controller tests
// Records every call so tests can assert on exact engine interactions

use crate::engine::{
    EngineContext, EngineEventSender, EngineFactory, EngineId, MediaEngine, StreamUsage,
};
use crate::error::{AudioError, Result, ERROR_UNSUPPORTED};
use crate::state::MediaSource;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One recorded engine interaction
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create,
    SetStreamUsage(StreamUsage),
    SetWakeLock(bool),
    SetVolume(f32),
    SetLooping(bool),
    SetDataSource(String),
    PrepareAsync,
    Start,
    Pause,
    Stop,
    SeekTo(u64),
    Reset,
    SetEventSender,
    Release,
}

#[derive(Default)]
struct Shared {
    calls: Vec<(EngineId, Call)>,
    unreachable: HashSet<String>,
    corrupt: HashSet<String>,
    senders: HashMap<EngineId, EngineEventSender>,
    /// Ids taken over by an instance after a reset, mapped to its creation id
    renewed: HashMap<EngineId, EngineId>,
    live: HashSet<EngineId>,
}

impl Shared {
    fn instance(&self, id: EngineId) -> EngineId {
        self.renewed.get(&id).copied().unwrap_or(id)
    }
}

/// Factory producing `ScriptedEngine`s that share one call log
pub struct ScriptedFactory {
    shared: Arc<Mutex<Shared>>,
    duration_ms: u64,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            duration_ms: 5_000,
        }
    }

    /// Binding this reference will fail with `SourceUnavailable`
    pub fn make_unreachable(&self, reference: &str) {
        self.shared.lock().unreachable.insert(reference.to_string());
    }

    /// Preparing this reference always reports `ERROR_UNSUPPORTED`, synchronously
    pub fn make_corrupt(&self, reference: &str) {
        self.shared.lock().corrupt.insert(reference.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.shared.lock().calls.len()
    }

    /// Calls made on the instance that holds or once held `id`
    pub fn calls_for(&self, id: EngineId) -> Vec<Call> {
        let shared = self.shared.lock();
        let instance = shared.instance(id);
        shared
            .calls
            .iter()
            .filter(|(engine, _)| *engine == instance)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn last_call(&self, id: EngineId) -> Option<Call> {
        self.calls_for(id).pop()
    }

    pub fn created(&self) -> Vec<EngineId> {
        self.shared
            .lock()
            .calls
            .iter()
            .filter(|(_, call)| *call == Call::Create)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Engines created and not yet released
    pub fn live_engines(&self) -> usize {
        self.shared.lock().live.len()
    }

    /// The event sender handed to an engine, to simulate its callbacks
    pub fn sender(&self, id: EngineId) -> EngineEventSender {
        self.shared
            .lock()
            .senders
            .get(&id)
            .cloned()
            .expect("engine was created by this factory")
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self, context: EngineContext) -> Result<Box<dyn MediaEngine>> {
        let mut shared = self.shared.lock();
        shared.calls.push((context.engine_id, Call::Create));
        shared.senders.insert(context.engine_id, context.events.clone());
        shared.live.insert(context.engine_id);
        Ok(Box::new(ScriptedEngine {
            instance: context.engine_id,
            events: context.events,
            source: None,
            shared: self.shared.clone(),
            duration_ms: self.duration_ms,
            position_ms: 0,
            playing: false,
        }))
    }
}

pub struct ScriptedEngine {
    /// Id at creation; the call log is keyed by it
    instance: EngineId,
    events: EngineEventSender,
    source: Option<String>,
    shared: Arc<Mutex<Shared>>,
    duration_ms: u64,
    position_ms: u64,
    playing: bool,
}

impl ScriptedEngine {
    fn record(&self, call: Call) {
        self.shared.lock().calls.push((self.instance, call));
    }
}

impl MediaEngine for ScriptedEngine {
    fn id(&self) -> EngineId {
        self.events.engine_id()
    }

    fn set_stream_usage(&mut self, usage: StreamUsage) -> Result<()> {
        self.record(Call::SetStreamUsage(usage));
        Ok(())
    }

    fn set_wake_lock(&mut self, enabled: bool) -> Result<()> {
        self.record(Call::SetWakeLock(enabled));
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.record(Call::SetVolume(volume));
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.record(Call::SetLooping(looping));
        Ok(())
    }

    fn set_data_source(&mut self, source: &MediaSource) -> Result<()> {
        self.record(Call::SetDataSource(source.reference.clone()));
        if self.shared.lock().unreachable.contains(&source.reference) {
            return Err(AudioError::SourceUnavailable(source.reference.clone()));
        }
        self.source = Some(source.reference.clone());
        Ok(())
    }

    fn prepare_async(&mut self) -> Result<()> {
        self.record(Call::PrepareAsync);
        let corrupt = match &self.source {
            Some(reference) => self.shared.lock().corrupt.contains(reference),
            None => false,
        };
        if corrupt {
            self.events.error(ERROR_UNSUPPORTED, 0);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.record(Call::Start);
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.record(Call::Pause);
        self.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record(Call::Stop);
        self.playing = false;
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<()> {
        self.record(Call::SeekTo(position_ms));
        self.position_ms = position_ms;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.record(Call::Reset);
        self.playing = false;
        self.position_ms = 0;
        self.source = None;
        Ok(())
    }

    fn set_event_sender(&mut self, events: EngineEventSender) {
        self.record(Call::SetEventSender);
        let mut shared = self.shared.lock();
        shared.renewed.insert(events.engine_id(), self.instance);
        shared.senders.insert(events.engine_id(), events.clone());
        drop(shared);
        self.events = events;
    }

    fn release(&mut self) {
        self.record(Call::Release);
        self.shared.lock().live.remove(&self.instance);
    }

    fn duration_ms(&self) -> Option<u64> {
        Some(self.duration_ms)
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}
