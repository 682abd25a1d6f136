// Session state: lifecycle phases, release policy and sticky settings

use crate::error::{AudioError, Result};
use std::fmt;
use std::str::FromStr;

/// Engine lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No engine instance exists
    Released,
    /// An engine instance exists and asynchronous preparation was requested
    Loading,
    /// The engine instance can start, pause and seek immediately
    Prepared,
}

/// What happens to the engine on stop and on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseMode {
    /// Tear the engine down on stop and completion
    #[default]
    Release,
    /// Replay indefinitely, never auto-release
    Loop,
    /// Pause and rewind, keeping the engine loaded
    Stop,
}

impl ReleaseMode {
    pub fn is_looping(self) -> bool {
        self == ReleaseMode::Loop
    }
}

impl fmt::Display for ReleaseMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ReleaseMode::Release => "RELEASE",
            ReleaseMode::Loop => "LOOP",
            ReleaseMode::Stop => "STOP",
        };
        f.write_str(name)
    }
}

impl FromStr for ReleaseMode {
    type Err = AudioError;

    /// Accepts `RELEASE`, `LOOP`, `STOP`, optionally written as `ReleaseMode.LOOP`
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        let name = name.strip_prefix("ReleaseMode.").unwrap_or(name);
        match name.to_ascii_uppercase().as_str() {
            "RELEASE" => Ok(ReleaseMode::Release),
            "LOOP" => Ok(ReleaseMode::Loop),
            "STOP" => Ok(ReleaseMode::Stop),
            _ => Err(AudioError::InvalidArgument(format!(
                "unknown release mode: {}",
                s
            ))),
        }
    }
}

/// Media reference bound to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    /// Local path or remote URL
    pub reference: String,
    /// Whether `reference` is a path on the local filesystem
    pub is_local: bool,
}

impl MediaSource {
    pub fn new(reference: impl Into<String>, is_local: bool) -> Self {
        Self {
            reference: reference.into(),
            is_local,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self::new(path, true)
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::new(url, false)
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_local {
            write!(f, "file {}", self.reference)
        } else {
            write!(f, "url {}", self.reference)
        }
    }
}

/// Settings that survive release and are reapplied to every new engine instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickySettings {
    /// Volume (0.0 - 1.0)
    pub volume: f32,
    /// Route through the notification/ringtone stream instead of media
    pub respect_silence: bool,
    /// Hold a wake lock while playing
    pub keep_awake: bool,
    pub release_mode: ReleaseMode,
}

impl Default for StickySettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            respect_silence: false,
            keep_awake: false,
            release_mode: ReleaseMode::Release,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub player_id: String,
    pub lifecycle: Lifecycle,
    /// Client intent, independent of `lifecycle`
    pub playing: bool,
    pub source: Option<MediaSource>,
    pub settings: StickySettings,
    pub pending_seek_ms: Option<u64>,
}
