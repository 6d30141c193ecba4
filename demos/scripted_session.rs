// Runs a complete session against a scripted driver and an in-process
// transcription backend, so the whole join -> record -> leave lifecycle
// can be watched without a real meeting or a real backend:
//
//   cargo run --example scripted_session

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use meeting_attendant::audio::CapturedFrame;
use meeting_attendant::config::{
    AutomaticLeaveConfig, BotConfig, MeetingConfig, PresenceConfig, StreamConfig,
};
use meeting_attendant::controller::SessionController;
use meeting_attendant::driver::{AdmissionResult, ContextStatus, MeetingDriver, PresenceEvent};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::info;

struct DemoDriver {
    script: Mutex<Option<Vec<(u64, PresenceEvent)>>>,
}

#[async_trait::async_trait]
impl MeetingDriver for DemoDriver {
    async fn join(&self, meeting_url: &str, display_name: &str) -> Result<()> {
        info!("[demo driver] joining {} as {}", meeting_url, display_name);
        Ok(())
    }

    async fn await_admission(&self, _timeout: Duration) -> Result<AdmissionResult> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(AdmissionResult::Admitted)
    }

    async fn prepare_recording(&self) -> Result<()> {
        Ok(())
    }

    async fn observe_presence(&self) -> Result<mpsc::Receiver<PresenceEvent>> {
        let script = self.script.lock().unwrap().take().unwrap_or_default();
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for (delay_ms, event) in script {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            std::future::pending::<()>().await;
        });
        Ok(rx)
    }

    async fn capture_audio(&self) -> Result<mpsc::Receiver<CapturedFrame>> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut sent = 0u32;
            loop {
                // A second of tone, then silence the gate will drop
                let amplitude = if sent < 50 { 0.4 } else { 0.0 };
                let samples = (0..960)
                    .map(|i| amplitude * (i as f32 * 0.05).sin())
                    .collect();
                let frame = CapturedFrame {
                    samples,
                    sample_rate: 48_000,
                };
                sent += 1;
                if tx.send(frame).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        Ok(rx)
    }

    async fn check_context(&self) -> Result<ContextStatus> {
        Ok(ContextStatus::Alive)
    }

    async fn leave(&self) -> bool {
        info!("[demo driver] leave control clicked");
        true
    }

    async fn capture_diagnostic(&self, label: &str) {
        info!("[demo driver] diagnostic capture: {}", label);
    }

    fn name(&self) -> &str {
        "demo"
    }
}

async fn spawn_backend() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                let mut bytes_seen = 0usize;
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Binary(payload) => {
                            let from = bytes_seen;
                            bytes_seen += payload.len();
                            let ack = serde_json::json!({
                                "type": "audio_chunk",
                                "data": { "byte_range": [from, bytes_seen] }
                            });
                            if ws.send(Message::Text(ack.to_string().into())).await.is_err() {
                                return;
                            }
                        }
                        Message::Text(text) => {
                            if text.as_str().contains("stop_recording") {
                                let transcript = serde_json::json!({
                                    "type": "transcript",
                                    "data": {
                                        "is_final": true,
                                        "utterance": {
                                            "text": "thanks everyone, see you next week",
                                            "start": 0.2,
                                            "end": 2.8,
                                            "language": "en"
                                        }
                                    }
                                });
                                let _ = ws
                                    .send(Message::Text(transcript.to_string().into()))
                                    .await;
                            }
                        }
                        Message::Close(_) => return,
                        _ => {}
                    }
                }
            });
        }
    });

    Ok(format!("ws://{}", addr))
}

fn demo_flags(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let ws_url = spawn_backend().await?;

    let script = vec![
        (
            0,
            PresenceEvent::Appeared {
                handle: 1,
                platform_id: Some("spaces/abc/devices/1".to_string()),
                display_name: "Ada".to_string(),
                flags: demo_flags(&["silent"]),
            },
        ),
        (
            500,
            PresenceEvent::StateChanged {
                handle: 1,
                flags: demo_flags(&["speaking"]),
            },
        ),
        (
            1500,
            PresenceEvent::StateChanged {
                handle: 1,
                flags: demo_flags(&["silent"]),
            },
        ),
        (1000, PresenceEvent::Disappeared { handle: 1 }),
    ];

    let config = BotConfig {
        meeting: MeetingConfig {
            url: Some("https://meet.example.com/abc-defg-hij".to_string()),
            platform: "demo".to_string(),
            display_name: "Notetaker".to_string(),
            native_meeting_id: None,
            connection_id: "demo-connection".to_string(),
        },
        stream: StreamConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            ws_url: Some(ws_url),
            api_key: "demo-key".to_string(),
            sample_rate: 16_000,
            language: None,
            task: None,
            reconnect_base_ms: 2000,
            keepalive_interval_ms: Some(10_000),
            callback_url: None,
            silence_threshold: 40,
        },
        automatic_leave: AutomaticLeaveConfig {
            waiting_room_timeout_ms: 5000,
            no_one_joined_timeout_ms: 60_000,
            everyone_left_timeout_ms: 2000,
            inactivity_timeout_ms: None,
            max_session_duration_ms: Some(120_000),
            policy_tick_ms: 500,
        },
        presence: PresenceConfig::default(),
    };
    config.validate()?;

    let driver = std::sync::Arc::new(DemoDriver {
        script: Mutex::new(Some(script)),
    });
    let (controller, _handle) =
        SessionController::new(config, driver, Some("demo-session".to_string()));

    let outcome = controller.run().await;
    info!(
        "Demo finished: {} (exit code {})",
        outcome.reason.as_str(),
        outcome.exit_code
    );
    Ok(())
}
