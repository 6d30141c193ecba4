// Boundary to the UI automation layer.
//
// Everything platform-specific (navigating to the meeting, clicking join
// and leave controls, watching the participant roster, tapping the mixed
// audio) lives behind this trait. The session core only ever talks to a
// `MeetingDriver`; concrete implementations are supplied by the embedding
// binary.

use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::CapturedFrame;

/// Outcome of waiting for the meeting platform to let the bot in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResult {
    /// The platform granted entry within the waiting-room window
    Admitted,
    /// The platform explicitly rejected the request to join
    Rejected,
    /// No signal arrived before the window elapsed
    TimedOut,
}

/// Validity of the hosting meeting context, sampled by the leave policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// The meeting surface is present and the bot is still a member
    Alive,
    /// The join surface is gone, a removed/ended indicator was detected,
    /// or the primary leave control is hidden
    Invalid,
}

/// A change observed in the participant roster.
///
/// Participants are keyed by an opaque `handle` the driver guarantees to
/// be stable for the lifetime of the participant's tile. A platform
/// identifier is attached when one exists; the tracker generates and
/// caches a fallback id otherwise.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Appeared {
        handle: u64,
        platform_id: Option<String>,
        display_name: String,
        /// Visual-state flags active at first observation
        flags: HashSet<String>,
    },
    StateChanged {
        handle: u64,
        /// The full set of currently active visual-state flags
        flags: HashSet<String>,
    },
    Disappeared {
        handle: u64,
    },
}

/// UI automation driver for one meeting platform.
///
/// All methods take `&self`; implementations own their interior state.
/// Stream-returning methods hand back channel receivers so the core can
/// consume events without ever blocking driver callbacks, mirroring how
/// audio backends expose capture streams.
#[async_trait::async_trait]
pub trait MeetingDriver: Send + Sync {
    /// Navigate to the meeting and request to join under `display_name`.
    async fn join(&self, meeting_url: &str, display_name: &str) -> Result<()>;

    /// Wait up to `timeout` for the platform's admission signal.
    async fn await_admission(&self, timeout: Duration) -> Result<AdmissionResult>;

    /// Set up whatever in-page hooks recording needs. Retried by the
    /// session controller on failure.
    async fn prepare_recording(&self) -> Result<()>;

    /// Start observing the participant roster.
    async fn observe_presence(&self) -> Result<mpsc::Receiver<PresenceEvent>>;

    /// Start capturing the mixed meeting audio at the driver's native rate.
    async fn capture_audio(&self) -> Result<mpsc::Receiver<CapturedFrame>>;

    /// Check that the meeting context is still valid. Errors are treated
    /// as detection failures, not as an invalid context.
    async fn check_context(&self) -> Result<ContextStatus>;

    /// Best-effort attempt to leave the meeting through the platform UI.
    /// Returns whether a leave control was found and activated.
    async fn leave(&self) -> bool;

    /// Capture a diagnostic artifact (screenshot or similar) tagged with
    /// `label`. Used as the exhaustion hook of retried join steps.
    async fn capture_diagnostic(&self, label: &str);

    /// Driver name for logging.
    fn name(&self) -> &str;
}
