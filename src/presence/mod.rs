pub mod tracker;

pub use tracker::{
    ParticipantCount, SpeakerEvent, SpeakerEventKind, SpeakerTracker, TrackerConfig,
};
