// Core of the cue playback-session controller
// Sessions, engine adapter contract, client notifications and the player registry

pub mod callback;
pub mod config;
pub mod engine;
pub mod error;
pub mod focus;
pub mod registry;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use callback::{CallbackEvent, CallbackManager, PlayerCallback};
pub use config::ControllerConfig;
pub use engine::{
    EngineContext, EngineEvent, EngineEventSender, EngineFactory, EngineId, MediaEngine,
    StreamUsage,
};
pub use error::{AudioError, Result};
pub use focus::{AudioFocus, FocusChange};
pub use registry::PlayerRegistry;
pub use session::{Session, SessionContext};
pub use state::{Lifecycle, MediaSource, ReleaseMode, SessionStatus, StickySettings};
