use thiserror::Error;

/// Error taxonomy for a meeting session.
///
/// Each variant maps to a distinct failure class so the caller can tell
/// apart what went wrong without string matching. Recoverable conditions
/// (single failed join sub-action, one dropped socket) are retried locally
/// and never surface here; these are the escalated, terminal forms.
#[derive(Debug, Error)]
pub enum BotError {
    /// The UI driver could not reach or join the meeting.
    #[error("failed to join meeting: {0}")]
    Join(String),

    /// No admission signal arrived within the waiting-room window.
    #[error("not admitted to the meeting within {timeout_ms}ms")]
    AdmissionTimeout { timeout_ms: u64 },

    /// Recording preparation kept failing after all retries.
    #[error("recording preparation failed after {attempts} attempts: {source}")]
    RecordingPrep {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The stream socket stayed down through the whole reconnect budget.
    #[error("stream connection lost after {retries} reconnect attempts")]
    StreamConnection { retries: u32 },

    /// Audio capture or resampling broke mid-session.
    #[error("audio pipeline failure: {0}")]
    AudioPipeline(String),

    /// Invalid or incomplete configuration. Fatal before recording starts.
    #[error("configuration error: {0}")]
    Config(String),
}
