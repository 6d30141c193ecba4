// Tests for the bounded retry-with-wait primitive.

use meeting_attendant::retry::{no_hook, retry_with_wait};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_first_attempt_success_runs_action_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = calls.clone();

    let result = retry_with_wait(
        "immediate success",
        3,
        Duration::from_millis(50),
        move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        },
        no_hook(),
    )
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = calls.clone();
    let hook_calls = Arc::new(AtomicU32::new(0));
    let hook_in = hook_calls.clone();

    let result = retry_with_wait(
        "second try",
        3,
        Duration::from_millis(5),
        move || {
            let calls = calls_in.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("transient")
                }
                Ok("ok")
            }
        },
        Some(move || {
            let hook = hook_in.clone();
            async move {
                hook.fetch_add(1, Ordering::SeqCst);
            }
        }),
    )
    .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // Hook only fires on exhaustion, not on recovered failures
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exhaustion_runs_hook_once_and_waits_between_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in = calls.clone();
    let hook_calls = Arc::new(AtomicU32::new(0));
    let hook_in = hook_calls.clone();
    let wait = Duration::from_millis(30);

    let started = Instant::now();
    let result: anyhow::Result<()> = retry_with_wait(
        "always failing",
        3,
        wait,
        move || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("nope")
            }
        },
        Some(move || {
            let hook = hook_in.clone();
            async move {
                hook.fetch_add(1, Ordering::SeqCst);
            }
        }),
    )
    .await;
    let elapsed = started.elapsed();

    let error = result.unwrap_err();
    assert!(error.to_string().contains("always failing"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    // Two inter-attempt waits, none after the final attempt
    assert!(elapsed >= 2 * wait, "waited {:?}", elapsed);
}

#[tokio::test]
async fn test_error_chain_keeps_last_cause() {
    let result: anyhow::Result<()> = retry_with_wait(
        "doomed",
        2,
        Duration::from_millis(1),
        || async { anyhow::bail!("root cause") },
        no_hook(),
    )
    .await;

    let chain = format!("{:#}", result.unwrap_err());
    assert!(chain.contains("root cause"));
    assert!(chain.contains("2 attempts"));
}
