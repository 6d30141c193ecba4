// Participant and speaker tracking.
//
// Consumes the driver's presence-event stream, maintains the live
// participant set, and derives debounced speaking-state transitions.
// Speaking state only ever changes on an unambiguous signal; repeated or
// ambiguous observations emit nothing. Event timestamps are relative to
// the stream session's audio anchor; while the anchor is unset events are
// suppressed rather than emitted with an undefined timestamp.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::driver::PresenceEvent;
use crate::stream::AudioAnchor;

/// Flag vocabulary mapping raw visual indicators to logical speaking
/// state. Platform drivers supply their own class/marker names; the
/// defaults cover drivers that pre-normalize.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Any of these flags present means the participant is speaking
    pub speaking_flags: HashSet<String>,
    /// Any of these flags present (and no speaking flag) means silent
    pub silence_flags: HashSet<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            speaking_flags: ["speaking".to_string()].into_iter().collect(),
            silence_flags: ["silent".to_string()].into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpeakState {
    Silent,
    Speaking,
}

/// One tracked participant. Owned exclusively by the tracker; the rest of
/// the session only ever sees the aggregate count.
#[derive(Debug)]
struct ParticipantRecord {
    id: String,
    display_name: String,
    state: SpeakState,
    last_update: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerEventKind {
    Start,
    End,
}

/// A debounced speaking-state transition, stamped relative to the first
/// transmitted audio frame of the current stream session.
#[derive(Debug, Clone)]
pub struct SpeakerEvent {
    pub kind: SpeakerEventKind,
    pub participant_id: String,
    pub display_name: String,
    pub relative_ms: u64,
}

/// Shared read handle on the live participant count. The leave policy
/// reads this and nothing else from the tracker.
#[derive(Debug, Clone, Default)]
pub struct ParticipantCount(Arc<AtomicUsize>);

impl ParticipantCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, value: usize) {
        self.0.store(value, Ordering::SeqCst);
    }
}

pub struct SpeakerTracker {
    config: TrackerConfig,
    anchor: AudioAnchor,
    participants: HashMap<u64, ParticipantRecord>,
    count: ParticipantCount,
}

impl SpeakerTracker {
    pub fn new(config: TrackerConfig, anchor: AudioAnchor) -> Self {
        Self {
            config,
            anchor,
            participants: HashMap::new(),
            count: ParticipantCount::default(),
        }
    }

    /// Handle on the live participant count, safe to share across tasks.
    pub fn count_handle(&self) -> ParticipantCount {
        self.count.clone()
    }

    /// Apply one presence event and return the speaker events it caused.
    /// Pure with respect to time except for the anchor read, so the
    /// debounce rules are directly unit-testable.
    pub fn handle_event(&mut self, event: PresenceEvent) -> Vec<SpeakerEvent> {
        let emitted = match event {
            PresenceEvent::Appeared {
                handle,
                platform_id,
                display_name,
                flags,
            } => self.on_appeared(handle, platform_id, display_name, flags),
            PresenceEvent::StateChanged { handle, flags } => self.on_state_changed(handle, flags),
            PresenceEvent::Disappeared { handle } => self.on_disappeared(handle),
        };
        self.count.set(self.participants.len());
        emitted
    }

    /// Drive the tracker from the driver's presence stream, forwarding
    /// speaker events until either channel closes.
    pub async fn run(
        mut self,
        mut presence_rx: mpsc::Receiver<PresenceEvent>,
        events_tx: mpsc::Sender<SpeakerEvent>,
    ) {
        while let Some(event) = presence_rx.recv().await {
            for speaker_event in self.handle_event(event) {
                if events_tx.send(speaker_event).await.is_err() {
                    return;
                }
            }
        }
        debug!("Presence stream closed, speaker tracker stopping");
    }

    fn on_appeared(
        &mut self,
        handle: u64,
        platform_id: Option<String>,
        display_name: String,
        flags: HashSet<String>,
    ) -> Vec<SpeakerEvent> {
        // Fallback id is generated once per appearance and cached in the
        // record, like the driver-side generated ids it stands in for.
        let id = platform_id.unwrap_or_else(|| format!("anon-{}", uuid::Uuid::new_v4()));

        info!("Participant appeared: {} ({})", display_name, id);
        self.participants.insert(
            handle,
            ParticipantRecord {
                id,
                display_name,
                state: SpeakState::Silent,
                last_update: Instant::now(),
            },
        );

        // Evaluate the initial flags so a participant already speaking
        // when first observed produces a start event.
        self.on_state_changed(handle, flags)
    }

    fn on_state_changed(&mut self, handle: u64, flags: HashSet<String>) -> Vec<SpeakerEvent> {
        let observed = self.classify(&flags);

        let record = match self.participants.get_mut(&handle) {
            Some(r) => r,
            None => {
                debug!("State change for unknown participant handle {}", handle);
                return Vec::new();
            }
        };

        let new_state = match observed {
            Some(state) => state,
            // Ambiguous signal: neither speaking nor silent indicator.
            // Leave the logical state untouched and emit nothing.
            None => return Vec::new(),
        };

        let previous = record.state;
        record.state = new_state;
        record.last_update = Instant::now();

        match (previous, new_state) {
            (SpeakState::Silent, SpeakState::Speaking) => {
                info!("SPEAKER_START: {} ({})", record.display_name, record.id);
                self.emit(handle, SpeakerEventKind::Start)
            }
            (SpeakState::Speaking, SpeakState::Silent) => {
                info!("SPEAKER_END: {} ({})", record.display_name, record.id);
                self.emit(handle, SpeakerEventKind::End)
            }
            _ => Vec::new(),
        }
    }

    fn on_disappeared(&mut self, handle: u64) -> Vec<SpeakerEvent> {
        // A speaker removed mid-utterance still gets a closing event
        // before the record is dropped.
        let events = match self.participants.get(&handle) {
            Some(record) if record.state == SpeakState::Speaking => {
                info!(
                    "SPEAKER_END (removed while speaking): {} ({})",
                    record.display_name, record.id
                );
                self.emit(handle, SpeakerEventKind::End)
            }
            _ => Vec::new(),
        };

        if let Some(record) = self.participants.remove(&handle) {
            info!(
                "Participant removed: {} ({}), last update {}ms ago",
                record.display_name,
                record.id,
                record.last_update.elapsed().as_millis()
            );
        }

        events
    }

    fn classify(&self, flags: &HashSet<String>) -> Option<SpeakState> {
        if flags.iter().any(|f| self.config.speaking_flags.contains(f)) {
            Some(SpeakState::Speaking)
        } else if flags.iter().any(|f| self.config.silence_flags.contains(f)) {
            Some(SpeakState::Silent)
        } else {
            None
        }
    }

    fn emit(&self, handle: u64, kind: SpeakerEventKind) -> Vec<SpeakerEvent> {
        let record = match self.participants.get(&handle) {
            Some(r) => r,
            None => return Vec::new(),
        };

        // No anchor means no audio has been transmitted on the current
        // stream session; a timestamp would be meaningless.
        let relative_ms = match self.anchor.elapsed_ms() {
            Some(ms) => ms,
            None => {
                debug!(
                    "Suppressing {:?} for {}: audio anchor not set",
                    kind, record.id
                );
                return Vec::new();
            }
        };

        vec![SpeakerEvent {
            kind,
            participant_id: record.id.clone(),
            display_name: record.display_name.clone(),
            relative_ms,
        }]
    }
}
