// Tests for the participant/speaker tracker debounce rules.

use meeting_attendant::driver::PresenceEvent;
use meeting_attendant::presence::{SpeakerEventKind, SpeakerTracker, TrackerConfig};
use meeting_attendant::stream::AudioAnchor;
use std::collections::HashSet;

fn flags(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn anchored_tracker() -> SpeakerTracker {
    let anchor = AudioAnchor::default();
    anchor.set_once();
    SpeakerTracker::new(TrackerConfig::default(), anchor)
}

fn appear(handle: u64, platform_id: Option<&str>, name: &str) -> PresenceEvent {
    PresenceEvent::Appeared {
        handle,
        platform_id: platform_id.map(|s| s.to_string()),
        display_name: name.to_string(),
        flags: flags(&["silent"]),
    }
}

#[test]
fn test_speaking_transition_emits_single_start() {
    let mut tracker = anchored_tracker();
    assert!(tracker.handle_event(appear(1, Some("p1"), "Ada")).is_empty());

    let events = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["speaking"]),
    });
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SpeakerEventKind::Start);
    assert_eq!(events[0].participant_id, "p1");
    assert_eq!(events[0].display_name, "Ada");

    // Repeated identical observations change nothing
    for _ in 0..3 {
        let repeat = tracker.handle_event(PresenceEvent::StateChanged {
            handle: 1,
            flags: flags(&["speaking"]),
        });
        assert!(repeat.is_empty());
    }
}

#[test]
fn test_silent_transition_emits_single_end() {
    let mut tracker = anchored_tracker();
    tracker.handle_event(appear(1, Some("p1"), "Ada"));
    tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["speaking"]),
    });

    let events = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["silent"]),
    });
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SpeakerEventKind::End);

    // Already silent: a silent signal is a no-op
    let repeat = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["silent"]),
    });
    assert!(repeat.is_empty());
}

#[test]
fn test_ambiguous_signal_never_emits() {
    let mut tracker = anchored_tracker();
    tracker.handle_event(appear(1, Some("p1"), "Ada"));
    tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["speaking"]),
    });

    // Neither a speaking nor a silence indicator: state stays speaking
    let events = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["hand-raised"]),
    });
    assert!(events.is_empty());

    // Still speaking afterwards, so another speaking signal is a no-op
    let events = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["speaking"]),
    });
    assert!(events.is_empty());
}

#[test]
fn test_appearing_while_speaking_emits_start() {
    let mut tracker = anchored_tracker();
    let events = tracker.handle_event(PresenceEvent::Appeared {
        handle: 7,
        platform_id: Some("p7".to_string()),
        display_name: "Grace".to_string(),
        flags: flags(&["speaking"]),
    });

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SpeakerEventKind::Start);
}

#[test]
fn test_removal_while_speaking_synthesizes_end() {
    let mut tracker = anchored_tracker();
    let count = tracker.count_handle();
    tracker.handle_event(appear(1, Some("p1"), "Ada"));
    tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["speaking"]),
    });
    assert_eq!(count.get(), 1);

    let events = tracker.handle_event(PresenceEvent::Disappeared { handle: 1 });
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SpeakerEventKind::End);
    assert_eq!(count.get(), 0);
}

#[test]
fn test_removal_while_silent_emits_nothing() {
    let mut tracker = anchored_tracker();
    tracker.handle_event(appear(1, Some("p1"), "Ada"));

    let events = tracker.handle_event(PresenceEvent::Disappeared { handle: 1 });
    assert!(events.is_empty());
}

#[test]
fn test_unset_anchor_suppresses_but_still_tracks_state() {
    let anchor = AudioAnchor::default();
    let mut tracker = SpeakerTracker::new(TrackerConfig::default(), anchor.clone());
    tracker.handle_event(appear(1, Some("p1"), "Ada"));

    // No audio transmitted yet: transition happens silently
    let events = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["speaking"]),
    });
    assert!(events.is_empty());

    // Once anchored, the next transition is emitted with a timestamp
    anchor.set_once();
    let events = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 1,
        flags: flags(&["silent"]),
    });
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SpeakerEventKind::End);
}

#[test]
fn test_fallback_id_generated_and_stable() {
    let mut tracker = anchored_tracker();
    tracker.handle_event(PresenceEvent::Appeared {
        handle: 9,
        platform_id: None,
        display_name: "Unnamed".to_string(),
        flags: flags(&["silent"]),
    });

    let start = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 9,
        flags: flags(&["speaking"]),
    });
    let end = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 9,
        flags: flags(&["silent"]),
    });

    assert!(start[0].participant_id.starts_with("anon-"));
    assert_eq!(start[0].participant_id, end[0].participant_id);
}

#[test]
fn test_unknown_handle_state_change_is_ignored() {
    let mut tracker = anchored_tracker();
    let events = tracker.handle_event(PresenceEvent::StateChanged {
        handle: 404,
        flags: flags(&["speaking"]),
    });
    assert!(events.is_empty());
}

#[test]
fn test_count_tracks_the_live_set() {
    let mut tracker = anchored_tracker();
    let count = tracker.count_handle();

    tracker.handle_event(appear(1, Some("p1"), "Ada"));
    tracker.handle_event(appear(2, Some("p2"), "Grace"));
    assert_eq!(count.get(), 2);

    tracker.handle_event(PresenceEvent::Disappeared { handle: 1 });
    assert_eq!(count.get(), 1);
    tracker.handle_event(PresenceEvent::Disappeared { handle: 2 });
    assert_eq!(count.get(), 0);
}
