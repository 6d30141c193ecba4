pub mod audio;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod policy;
pub mod presence;
pub mod retry;
pub mod stream;

pub use audio::{CapturedFrame, FrameProcessor, PcmFrame, ResamplerConfig};
pub use config::BotConfig;
pub use controller::{
    BotPhase, ControllerCommand, ControllerHandle, ExitReason, SessionController, SessionOutcome,
};
pub use driver::{AdmissionResult, ContextStatus, MeetingDriver, PresenceEvent};
pub use error::BotError;
pub use policy::{PolicyConfig, PolicyState, PolicyTrigger};
pub use presence::{ParticipantCount, SpeakerEvent, SpeakerEventKind, SpeakerTracker, TrackerConfig};
pub use retry::retry_with_wait;
pub use stream::{AudioAnchor, StreamClient, StreamCommand, StreamEvent, StreamSettings};
