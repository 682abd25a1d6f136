// Audio focus capability
// Hosts with exclusive focus arbitration notify sessions through FocusChange

/// Focus transitions reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    /// Another application took focus for good
    Lost,
    /// Focus is gone for a short while (a call, a navigation prompt)
    LostTransient,
    /// Focus is gone for a short while but quiet playback may continue
    LostTransientCanDuck,
    /// Focus came back
    Gained,
}

impl FocusChange {
    /// Map a platform focus code (AUDIOFOCUS_* constants) to a change
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(FocusChange::Lost),
            -2 => Some(FocusChange::LostTransient),
            -3 => Some(FocusChange::LostTransientCanDuck),
            1 => Some(FocusChange::Gained),
            _ => None,
        }
    }
}

/// Host focus arbiter. Asked for focus each time a session starts its engine.
pub trait AudioFocus: Send + Sync {
    fn request_focus(&self, player_id: &str);
}
