pub mod client;
pub mod protocol;

pub use client::{StreamClient, StreamCommand, StreamEvent, StreamSettings};

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Reconnect ceiling for the streaming socket. Exceeding it is a fatal
/// stream error.
pub const MAX_STREAM_RETRIES: u32 = 5;

/// Upper bound on the exponential reconnect delay.
pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Exponential reconnect delay for retry attempt `n` (1-based):
/// `min(30_000, base * 2^(n-1))`.
pub fn reconnect_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(16);
    base_ms
        .saturating_mul(1u64 << exponent)
        .min(MAX_RECONNECT_DELAY_MS)
}

/// The timestamp of the first audio frame transmitted on the current
/// stream session. All speaker-event timestamps are relative to it.
///
/// Set exactly once per socket session (the stream client resets it on
/// every socket open); while unset, speaker events are suppressed instead
/// of being emitted unanchored.
#[derive(Debug, Clone, Default)]
pub struct AudioAnchor(Arc<Mutex<Option<Instant>>>);

impl AudioAnchor {
    /// Set the anchor to now if it is unset. Returns whether this call
    /// set it.
    pub fn set_once(&self) -> bool {
        match self.0.lock() {
            Ok(mut slot) => {
                if slot.is_none() {
                    *slot = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    /// Clear the anchor. Called when a new socket session opens.
    pub fn reset(&self) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = None;
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Milliseconds since the anchor was set, or `None` while unset.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.0
            .lock()
            .ok()
            .and_then(|slot| slot.map(|t| t.elapsed().as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_growth() {
        let delays: Vec<u64> = (1..=6).map(|n| reconnect_delay_ms(2000, n)).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn test_reconnect_delay_caps_large_attempts() {
        assert_eq!(reconnect_delay_ms(2000, 40), MAX_RECONNECT_DELAY_MS);
    }

    #[test]
    fn test_anchor_set_once_is_sticky() {
        let anchor = AudioAnchor::default();
        assert!(!anchor.is_set());
        assert!(anchor.set_once());
        assert!(!anchor.set_once());
        assert!(anchor.elapsed_ms().is_some());

        anchor.reset();
        assert!(!anchor.is_set());
        assert!(anchor.set_once());
    }
}
