// Controller configuration

/// Default interval between position notifications for one player
pub const DEFAULT_POSITION_INTERVAL_MS: u64 = 200;

/// Tunables for the session controller and its registry
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// React to host focus changes and request focus on start
    pub focus_handling: bool,
    /// Minimum spacing of `Position` notifications per player
    pub position_interval_ms: u64,
    /// Fraction of the sticky volume used while ducked
    pub duck_factor: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            focus_handling: false,
            position_interval_ms: DEFAULT_POSITION_INTERVAL_MS,
            duck_factor: 0.5,
        }
    }
}

impl ControllerConfig {
    pub fn with_focus_handling(mut self, enabled: bool) -> Self {
        self.focus_handling = enabled;
        self
    }

    pub fn with_position_interval_ms(mut self, interval_ms: u64) -> Self {
        self.position_interval_ms = interval_ms;
        self
    }

    pub fn with_duck_factor(mut self, factor: f32) -> Self {
        self.duck_factor = factor.clamp(0.0, 1.0);
        self
    }
}
