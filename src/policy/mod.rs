// Automatic-leave policy.
//
// A fixed-period evaluator over two inputs: the validity of the hosting
// meeting context and the live participant count. The timeout accounting
// lives in a pure state machine (`PolicyState`) so the tick arithmetic is
// testable without a clock; the async task wraps it with the real timer
// and the driver/count reads.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::driver::{ContextStatus, MeetingDriver};
use crate::presence::ParticipantCount;

/// Consecutive presence-read failures before a diagnostic is escalated.
/// Failures never trigger a leave by themselves.
pub const MAX_DETECTION_FAILURES: u32 = 10;

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Evaluation period
    pub tick: Duration,
    /// Leave after the meeting has had zero participants this long
    pub everyone_left_timeout: Duration,
    /// Leave after the bot has been the only participant this long
    pub alone_timeout: Duration,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            everyone_left_timeout: Duration::from_millis(60_000),
            alone_timeout: Duration::from_millis(60_000),
        }
    }
}

/// Why the policy decided to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyTrigger {
    ContextInvalid,
    NoParticipantsTimeout,
    AloneWithBotTimeout,
}

/// Pure accumulator for the participant-count timeouts.
#[derive(Debug, Default)]
pub struct PolicyState {
    no_participants_ms: u64,
    alone_with_bot_ms: u64,
    detection_failures: u32,
}

impl PolicyState {
    /// Account one tick's worth of the observed participant count.
    pub fn observe(&mut self, count: usize, config: &PolicyConfig) -> Option<PolicyTrigger> {
        let tick_ms = config.tick.as_millis() as u64;
        self.detection_failures = 0;

        if count == 0 {
            self.no_participants_ms += tick_ms;
            debug!(
                "No participants for {}ms / {}ms",
                self.no_participants_ms,
                config.everyone_left_timeout.as_millis()
            );
            if self.no_participants_ms >= config.everyone_left_timeout.as_millis() as u64 {
                return Some(PolicyTrigger::NoParticipantsTimeout);
            }
        } else if count <= 1 {
            self.alone_with_bot_ms += tick_ms;
            debug!(
                "Alone with bot for {}ms / {}ms",
                self.alone_with_bot_ms,
                config.alone_timeout.as_millis()
            );
            if self.alone_with_bot_ms >= config.alone_timeout.as_millis() as u64 {
                return Some(PolicyTrigger::AloneWithBotTimeout);
            }
        } else {
            if self.no_participants_ms > 0 || self.alone_with_bot_ms > 0 {
                debug!("Participants present again, resetting leave timers");
            }
            self.no_participants_ms = 0;
            self.alone_with_bot_ms = 0;
        }

        None
    }

    /// Account a failed presence read. Returns true when the consecutive
    /// failure count just reached the escalation threshold.
    pub fn observe_failure(&mut self) -> bool {
        self.detection_failures += 1;
        self.detection_failures == MAX_DETECTION_FAILURES
    }

    pub fn detection_failures(&self) -> u32 {
        self.detection_failures
    }
}

/// Periodic evaluator task. Sends at most one trigger, then stops; a
/// dropped receiver also stops it, so cancellation from the controller
/// side is a channel drop.
pub async fn run_evaluator(
    config: PolicyConfig,
    driver: Arc<dyn MeetingDriver>,
    count: ParticipantCount,
    trigger_tx: mpsc::Sender<PolicyTrigger>,
) {
    let mut state = PolicyState::default();
    let mut ticker = tokio::time::interval(config.tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; accounting starts one period in
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match driver.check_context().await {
            Ok(ContextStatus::Alive) => {}
            Ok(ContextStatus::Invalid) => {
                info!("Meeting context no longer valid, triggering leave");
                let _ = trigger_tx.send(PolicyTrigger::ContextInvalid).await;
                return;
            }
            Err(e) => {
                warn!(
                    "Presence detection failed: {} ({} consecutive)",
                    e,
                    state.detection_failures() + 1
                );
                if state.observe_failure() {
                    warn!(
                        "Presence detection failing consistently ({} checks); \
                         the meeting surface may have changed. Continuing on timeouts only.",
                        MAX_DETECTION_FAILURES
                    );
                }
                continue;
            }
        }

        if let Some(trigger) = state.observe(count.get(), &config) {
            info!("Leave policy triggered: {:?}", trigger);
            let _ = trigger_tx.send(trigger).await;
            return;
        }

        if trigger_tx.is_closed() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tick_ms: u64, everyone_left_ms: u64, alone_ms: u64) -> PolicyConfig {
        PolicyConfig {
            tick: Duration::from_millis(tick_ms),
            everyone_left_timeout: Duration::from_millis(everyone_left_ms),
            alone_timeout: Duration::from_millis(alone_ms),
        }
    }

    #[test]
    fn test_everyone_left_triggers_on_twelfth_tick() {
        let config = config(5000, 60_000, 60_000);
        let mut state = PolicyState::default();

        for tick in 1..=11 {
            assert_eq!(state.observe(0, &config), None, "tick {}", tick);
        }
        assert_eq!(
            state.observe(0, &config),
            Some(PolicyTrigger::NoParticipantsTimeout)
        );
    }

    #[test]
    fn test_alone_with_bot_timeout() {
        let config = config(5000, 60_000, 15_000);
        let mut state = PolicyState::default();

        assert_eq!(state.observe(1, &config), None);
        assert_eq!(state.observe(1, &config), None);
        assert_eq!(
            state.observe(1, &config),
            Some(PolicyTrigger::AloneWithBotTimeout)
        );
    }

    #[test]
    fn test_participants_reset_both_accumulators() {
        let config = config(5000, 10_000, 10_000);
        let mut state = PolicyState::default();

        assert_eq!(state.observe(0, &config), None);
        assert_eq!(state.observe(1, &config), None);
        // Someone joined: both timers restart from zero
        assert_eq!(state.observe(3, &config), None);
        assert_eq!(state.observe(0, &config), None);
        assert_eq!(
            state.observe(0, &config),
            Some(PolicyTrigger::NoParticipantsTimeout)
        );
    }

    #[test]
    fn test_detection_failures_escalate_once_at_threshold() {
        let mut state = PolicyState::default();
        for _ in 0..MAX_DETECTION_FAILURES - 1 {
            assert!(!state.observe_failure());
        }
        assert!(state.observe_failure());
        assert!(!state.observe_failure());
    }

    #[test]
    fn test_successful_read_resets_failure_count() {
        let config = config(5000, 60_000, 60_000);
        let mut state = PolicyState::default();

        state.observe_failure();
        state.observe_failure();
        assert_eq!(state.detection_failures(), 2);
        state.observe(2, &config);
        assert_eq!(state.detection_failures(), 0);
    }
}
