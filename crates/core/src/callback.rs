// Client notifications emitted by the session controller
// Position updates are throttled per player; lifecycle notifications never are

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Notification sent toward the client, tagged with the player id it concerns
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    /// The loaded source finished preparing and its duration is known
    Duration { player_id: String, duration_ms: u64 },

    /// The engine actually started producing audio
    Playing { player_id: String },

    /// Playback reached the end of the source
    Completion { player_id: String },

    /// The engine reported an error; recovery has already been attempted
    Error {
        player_id: String,
        code: i32,
        message: String,
    },

    /// Periodic position report for a playing session
    Position {
        player_id: String,
        position_ms: u64,
        duration_ms: u64,
    },
}

impl CallbackEvent {
    pub fn player_id(&self) -> &str {
        match self {
            CallbackEvent::Duration { player_id, .. }
            | CallbackEvent::Playing { player_id }
            | CallbackEvent::Completion { player_id }
            | CallbackEvent::Error { player_id, .. }
            | CallbackEvent::Position { player_id, .. } => player_id,
        }
    }
}

/// Client-side sink for controller notifications.
/// Implementations should return quickly; they run on the thread that
/// processed the command or engine event.
pub trait PlayerCallback: Send + Sync {
    fn on_event(&self, event: CallbackEvent);
}

/// Throttled callback wrapper
/// Drops position reports that arrive faster than the interval for the same player
pub struct ThrottledCallback {
    inner: Arc<dyn PlayerCallback>,
    last_position_update: Mutex<HashMap<String, Instant>>,
    position_update_interval: Duration,
}

impl ThrottledCallback {
    pub fn new(callback: Arc<dyn PlayerCallback>, update_interval_ms: u64) -> Self {
        Self {
            inner: callback,
            last_position_update: Mutex::new(HashMap::new()),
            position_update_interval: Duration::from_millis(update_interval_ms),
        }
    }

    pub fn dispatch(&self, event: CallbackEvent) {
        if let CallbackEvent::Position { player_id, .. } = &event {
            let mut last = self.last_position_update.lock();
            let now = Instant::now();
            if let Some(previous) = last.get(player_id) {
                if now.duration_since(*previous) < self.position_update_interval {
                    return;
                }
            }
            last.insert(player_id.clone(), now);
        }
        self.inner.on_event(event);
    }

    fn forget(&self, player_id: &str) {
        self.last_position_update.lock().remove(player_id);
    }
}

/// Fan-out of notifications to every registered client callback
pub struct CallbackManager {
    callbacks: Mutex<Vec<Arc<ThrottledCallback>>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_callback(&self, callback: Arc<dyn PlayerCallback>, throttle_ms: u64) {
        let throttled = Arc::new(ThrottledCallback::new(callback, throttle_ms));
        self.callbacks.lock().push(throttled);
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.lock().clear();
    }

    pub fn dispatch_event(&self, event: CallbackEvent) {
        // Snapshot so a callback may register further callbacks without deadlocking
        let callbacks: Vec<_> = self.callbacks.lock().iter().cloned().collect();
        for callback in callbacks {
            callback.dispatch(event.clone());
        }
    }

    /// Drop throttling state for a disposed player
    pub fn forget_player(&self, player_id: &str) {
        for callback in self.callbacks.lock().iter() {
            callback.forget(player_id);
        }
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Recording callback for tests
#[cfg(test)]
pub struct TestCallback {
    events: Mutex<Vec<CallbackEvent>>,
}

#[cfg(test)]
impl TestCallback {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn get_events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count_durations(&self) -> usize {
        self.get_events()
            .iter()
            .filter(|e| matches!(e, CallbackEvent::Duration { .. }))
            .count()
    }

    pub fn count_playing(&self) -> usize {
        self.get_events()
            .iter()
            .filter(|e| matches!(e, CallbackEvent::Playing { .. }))
            .count()
    }
}

#[cfg(test)]
impl PlayerCallback for TestCallback {
    fn on_event(&self, event: CallbackEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(player_id: &str, position_ms: u64) -> CallbackEvent {
        CallbackEvent::Position {
            player_id: player_id.to_string(),
            position_ms,
            duration_ms: 1000,
        }
    }

    #[test]
    fn test_throttled_position_updates() {
        let test_callback = Arc::new(TestCallback::new());
        let throttled = ThrottledCallback::new(test_callback.clone(), 60_000);

        for i in 0..10 {
            throttled.dispatch(position("a", i * 100));
        }

        // Only the first report gets through inside one interval
        assert_eq!(test_callback.get_events(), vec![position("a", 0)]);
    }

    #[test]
    fn test_throttle_is_per_player() {
        let test_callback = Arc::new(TestCallback::new());
        let throttled = ThrottledCallback::new(test_callback.clone(), 60_000);

        throttled.dispatch(position("a", 0));
        throttled.dispatch(position("b", 0));
        throttled.dispatch(position("a", 100));

        assert_eq!(test_callback.get_events().len(), 2);
    }

    #[test]
    fn test_non_throttled_events() {
        let test_callback = Arc::new(TestCallback::new());
        let throttled = ThrottledCallback::new(test_callback.clone(), 60_000);

        throttled.dispatch(CallbackEvent::Playing {
            player_id: "a".into(),
        });
        throttled.dispatch(CallbackEvent::Completion {
            player_id: "a".into(),
        });

        assert_eq!(test_callback.get_events().len(), 2);
    }

    #[test]
    fn test_manager_fans_out_and_forgets() {
        let first = Arc::new(TestCallback::new());
        let second = Arc::new(TestCallback::new());
        let manager = CallbackManager::new();
        manager.add_callback(first.clone(), 60_000);
        manager.add_callback(second.clone(), 60_000);

        manager.dispatch_event(position("a", 0));
        manager.forget_player("a");
        manager.dispatch_event(position("a", 10));

        assert_eq!(first.get_events().len(), 2);
        assert_eq!(second.get_events().len(), 2);

        manager.clear_callbacks();
        manager.dispatch_event(position("a", 20));
        assert_eq!(first.get_events().len(), 2);
    }
}
