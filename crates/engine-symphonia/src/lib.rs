// Desktop engine adapter for the cue playback controller
// Local files are decoded with Symphonia and rendered through cpal

pub mod config;
pub mod decoder;
pub mod engine;
mod output;

pub use config::EngineConfig;
pub use cue_core::{ControllerConfig, PlayerRegistry};
pub use engine::{DesktopEngine, SymphoniaEngineFactory};

use std::sync::{Arc, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialise env_logger once per process. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(false)
            .try_init();
    });
}

/// Registry wired to the desktop engine, with its event dispatcher running
pub fn create_registry(controller: ControllerConfig, engine: EngineConfig) -> Arc<PlayerRegistry> {
    init_logging();
    let factory = Arc::new(SymphoniaEngineFactory::new(engine));
    let registry = Arc::new(PlayerRegistry::new(factory, controller));
    // The dispatcher exits on its own once the registry is shut down or dropped
    let _ = registry.spawn_dispatcher();
    registry
}
