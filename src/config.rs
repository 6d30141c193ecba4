use anyhow::Result;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::audio::ResamplerConfig;
use crate::error::BotError;
use crate::policy::PolicyConfig;
use crate::presence::TrackerConfig;
use crate::stream::StreamSettings;

/// Floor under the configured reconnect base; anything lower falls back
/// to the default.
const MIN_RECONNECT_BASE_MS: u64 = 1000;
const DEFAULT_RECONNECT_BASE_MS: u64 = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub meeting: MeetingConfig,
    pub stream: StreamConfig,
    #[serde(default)]
    pub automatic_leave: AutomaticLeaveConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeetingConfig {
    /// Meeting URL; sessions without one terminate immediately
    pub url: Option<String>,

    /// Platform tag (e.g. "google_meet"), selects the driver in the
    /// embedding binary
    pub platform: String,

    /// Name the bot joins under
    pub display_name: String,

    /// Platform-native meeting identifier, when known
    #[serde(default)]
    pub native_meeting_id: Option<String>,

    /// Connection identifier reported alongside the stream session id
    #[serde(default = "default_connection_id")]
    pub connection_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Transcription backend base URL
    pub api_url: String,

    /// Socket URL override; derived from `api_url` when absent
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Backend credential. Required; validated before the session starts
    #[serde(default)]
    pub api_key: String,

    /// Sample rate the backend expects (16kHz default)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Language hint; absent means auto-detect
    #[serde(default)]
    pub language: Option<String>,

    /// Task hint; absent means the backend default
    #[serde(default)]
    pub task: Option<String>,

    /// Base reconnect delay in milliseconds
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Optional keep-alive period; disabled when absent or zero
    #[serde(default)]
    pub keepalive_interval_ms: Option<u64>,

    /// Where to report the issued session id for crash recovery
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Peak amplitude (i16 scale) at or below which a frame is silence
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomaticLeaveConfig {
    /// How long to wait for admission from the waiting room
    #[serde(default = "default_waiting_room_timeout_ms")]
    pub waiting_room_timeout_ms: u64,

    /// Leave after being alone this long (nobody else ever joined)
    #[serde(default = "default_minute_ms")]
    pub no_one_joined_timeout_ms: u64,

    /// Leave after the participant count has been zero this long
    #[serde(default = "default_minute_ms")]
    pub everyone_left_timeout_ms: u64,

    /// Accepted for configuration compatibility; no policy rule consumes
    /// it (see DESIGN.md)
    #[serde(default)]
    pub inactivity_timeout_ms: Option<u64>,

    /// Hard cap on the whole session
    #[serde(default)]
    pub max_session_duration_ms: Option<u64>,

    /// Leave-policy evaluation period
    #[serde(default = "default_policy_tick_ms")]
    pub policy_tick_ms: u64,
}

impl Default for AutomaticLeaveConfig {
    fn default() -> Self {
        Self {
            waiting_room_timeout_ms: default_waiting_room_timeout_ms(),
            no_one_joined_timeout_ms: default_minute_ms(),
            everyone_left_timeout_ms: default_minute_ms(),
            inactivity_timeout_ms: None,
            max_session_duration_ms: None,
            policy_tick_ms: default_policy_tick_ms(),
        }
    }
}

/// Visual-flag vocabulary for the speaker tracker.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_speaking_flags")]
    pub speaking_flags: Vec<String>,
    #[serde(default = "default_silence_flags")]
    pub silence_flags: Vec<String>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            speaking_flags: default_speaking_flags(),
            silence_flags: default_silence_flags(),
        }
    }
}

fn default_connection_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_reconnect_base_ms() -> u64 {
    DEFAULT_RECONNECT_BASE_MS
}

fn default_silence_threshold() -> u16 {
    40
}

fn default_waiting_room_timeout_ms() -> u64 {
    300_000
}

fn default_minute_ms() -> u64 {
    60_000
}

fn default_policy_tick_ms() -> u64 {
    5000
}

fn default_speaking_flags() -> Vec<String> {
    vec!["speaking".to_string()]
}

fn default_silence_flags() -> Vec<String> {
    vec!["silent".to_string()]
}

impl BotConfig {
    /// Load configuration from a file (any format the `config` crate
    /// understands), e.g. `config/meeting-attendant.toml`.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Validate everything the session controller relies on. Must pass
    /// before a controller is started; a missing credential is fatal here
    /// rather than mid-meeting.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.stream.api_key.trim().is_empty() {
            return Err(BotError::Config(
                "stream.api_key is required but empty".to_string(),
            ));
        }
        if self.meeting.display_name.trim().is_empty() {
            return Err(BotError::Config(
                "meeting.display_name must not be empty".to_string(),
            ));
        }
        if self.meeting.platform.trim().is_empty() {
            return Err(BotError::Config(
                "meeting.platform must not be empty".to_string(),
            ));
        }
        if self.stream.sample_rate == 0 {
            return Err(BotError::Config(
                "stream.sample_rate must be positive".to_string(),
            ));
        }

        let leave = &self.automatic_leave;
        for (name, value) in [
            ("waiting_room_timeout_ms", leave.waiting_room_timeout_ms),
            ("no_one_joined_timeout_ms", leave.no_one_joined_timeout_ms),
            ("everyone_left_timeout_ms", leave.everyone_left_timeout_ms),
            ("policy_tick_ms", leave.policy_tick_ms),
        ] {
            if value == 0 {
                return Err(BotError::Config(format!(
                    "automatic_leave.{} must be positive",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Effective reconnect base, applying the floor.
    pub fn reconnect_base_ms(&self) -> u64 {
        if self.stream.reconnect_base_ms >= MIN_RECONNECT_BASE_MS {
            self.stream.reconnect_base_ms
        } else {
            DEFAULT_RECONNECT_BASE_MS
        }
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            api_url: self.stream.api_url.clone(),
            ws_url: self.stream.ws_url.clone(),
            api_key: self.stream.api_key.clone(),
            sample_rate: self.stream.sample_rate,
            language: self.stream.language.clone(),
            task: self.stream.task.clone(),
            reconnect_base_ms: self.reconnect_base_ms(),
            keepalive_interval_ms: self.stream.keepalive_interval_ms,
            callback_url: self.stream.callback_url.clone(),
            connection_id: self.meeting.connection_id.clone(),
        }
    }

    pub fn resampler_config(&self) -> ResamplerConfig {
        ResamplerConfig {
            target_sample_rate: self.stream.sample_rate,
            silence_threshold: self.stream.silence_threshold,
        }
    }

    pub fn policy_config(&self) -> PolicyConfig {
        PolicyConfig {
            tick: Duration::from_millis(self.automatic_leave.policy_tick_ms),
            everyone_left_timeout: Duration::from_millis(
                self.automatic_leave.everyone_left_timeout_ms,
            ),
            alone_timeout: Duration::from_millis(self.automatic_leave.no_one_joined_timeout_ms),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            speaking_flags: self.presence.speaking_flags.iter().cloned().collect::<HashSet<_>>(),
            silence_flags: self.presence.silence_flags.iter().cloned().collect::<HashSet<_>>(),
        }
    }
}
