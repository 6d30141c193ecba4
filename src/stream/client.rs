// Transcription stream client.
//
// Owns the whole backend-session lifecycle: session acquisition (or reuse
// of a previously issued id), socket connection, frame transmission,
// inbound message dispatch, exponential-backoff reconnection, live
// reconfiguration and graceful stop. Nothing else in the crate touches
// the socket.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::{
    stop_recording_message, ServerMessage, SessionCallback, SessionRequest, SessionResponse,
    Utterance,
};
use super::{reconnect_delay_ms, AudioAnchor, MAX_STREAM_RETRIES};
use crate::audio::PcmFrame;
use crate::error::BotError;

/// Grace period after the stop signal before the socket is closed, so the
/// backend can flush trailing transcripts.
const STOP_GRACE_MS: u64 = 1000;

/// Keep-alive frame length: ~20ms at 16kHz.
const KEEPALIVE_SAMPLES: usize = 320;

/// Connection settings for the transcription backend.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Base HTTP URL for session creation
    pub api_url: String,
    /// Socket URL override; derived from `api_url` when absent
    pub ws_url: Option<String>,
    pub api_key: String,
    pub sample_rate: u32,
    /// Language hint; absent means auto-detect
    pub language: Option<String>,
    /// Task hint (e.g. "transcribe")
    pub task: Option<String>,
    pub reconnect_base_ms: u64,
    /// Optional keep-alive period; disabled when absent
    pub keepalive_interval_ms: Option<u64>,
    /// Where to report the issued session id, for crash recovery
    pub callback_url: Option<String>,
    pub connection_id: String,
}

/// Commands delivered to the client while it is streaming.
#[derive(Debug, Clone)]
pub enum StreamCommand {
    /// Change language/task hints. Takes effect on the next socket open;
    /// an open socket is closed to get there.
    Reconfigure {
        language: Option<String>,
        task: Option<String>,
    },
    /// Graceful stop: send the end-of-audio signal, flush, close.
    Stop,
}

/// Events surfaced to the session controller.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected {
        session_id: String,
        connection_uid: String,
    },
    Transcript {
        is_final: bool,
        utterance: Utterance,
    },
    DetectedLanguage(String),
    /// The reconnect budget is exhausted; the client has stopped.
    Fatal(String),
    /// Graceful stop completed.
    Stopped,
}

enum SocketEnd {
    /// The socket dropped or errored; reconnect applies
    Dropped,
    /// A reconfigure closed the socket; reconnect applies
    Reconfigure,
    /// Stop was requested or the audio source ended; shut down
    StopRequested,
}

enum Dispatch {
    Continue,
    CloseSocket,
}

pub struct StreamClient {
    settings: StreamSettings,
    anchor: AudioAnchor,
    http: reqwest::Client,
    /// Externally issued session id, reused across reconnects for the
    /// whole meeting attempt
    session_id: Option<String>,
    retry_count: u32,
    language: Option<String>,
    task: Option<String>,
}

impl StreamClient {
    /// `resume_session_id` carries a previously issued backend session id
    /// (e.g. recovered after a crash); when present, no session-creation
    /// request is ever made for this meeting attempt.
    pub fn new(
        settings: StreamSettings,
        anchor: AudioAnchor,
        resume_session_id: Option<String>,
    ) -> Self {
        let language = settings.language.clone();
        let task = settings.task.clone();
        Self {
            settings,
            anchor,
            http: reqwest::Client::new(),
            session_id: resume_session_id,
            retry_count: 0,
            language,
            task,
        }
    }

    /// Acquire a backend session, reusing the stored id when one exists.
    /// Returns the socket URL to connect to.
    pub async fn acquire_session(&mut self) -> Result<String> {
        if let Some(id) = self.session_id.clone() {
            info!("Reusing stream session: {}", id);
            return Ok(self.socket_url_for(&id));
        }

        let languages = self.language.iter().cloned().collect();
        let request = SessionRequest::new(self.settings.sample_rate, languages);

        let response: SessionResponse = self
            .http
            .post(format!("{}/v2/live", self.settings.api_url))
            .header("x-api-key", self.settings.api_key.as_str())
            .json(&request)
            .send()
            .await
            .context("Session creation request failed")?
            .error_for_status()
            .context("Session creation rejected")?
            .json()
            .await
            .context("Invalid session creation response")?;

        info!("Stream session created: {}", response.id);
        self.session_id = Some(response.id.clone());
        self.report_session_id(&response.id);

        // Prefer the URL override so all connects go through one endpoint
        Ok(match &self.settings.ws_url {
            Some(_) => self.socket_url_for(&response.id),
            None => response.url,
        })
    }

    fn socket_url_for(&self, session_id: &str) -> String {
        let base = match &self.settings.ws_url {
            Some(url) => url.clone(),
            None => self
                .settings
                .api_url
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1),
        };
        format!("{}/v2/live?token={}", base, session_id)
    }

    /// Best-effort persistence of the session id to the external manager.
    fn report_session_id(&self, session_id: &str) {
        let Some(callback_url) = self.settings.callback_url.clone() else {
            return;
        };
        let payload = SessionCallback {
            connection_id: self.settings.connection_id.clone(),
            stream_session_id: session_id.to_string(),
        };
        let http = self.http.clone();
        tokio::spawn(async move {
            match http.post(callback_url.as_str()).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    info!("Stream session id reported to {}", callback_url);
                }
                Ok(response) => {
                    warn!(
                        "Session id callback returned {}: {}",
                        response.status(),
                        callback_url
                    );
                }
                Err(e) => warn!("Session id callback failed: {}", e),
            }
        });
    }

    /// Run the streaming loop until a graceful stop or a fatal error.
    ///
    /// Consumes PCM frames from `audio_rx` (already resampled and gated),
    /// commands from `command_rx`, and surfaces backend activity on
    /// `events_tx`.
    pub async fn run(
        mut self,
        mut audio_rx: mpsc::Receiver<PcmFrame>,
        mut command_rx: mpsc::Receiver<StreamCommand>,
        events_tx: mpsc::Sender<StreamEvent>,
    ) {
        loop {
            // Commands that arrived while disconnected: hint changes take
            // effect on the upcoming open, a stop ends the client without
            // reopening a socket.
            loop {
                match command_rx.try_recv() {
                    Ok(StreamCommand::Reconfigure { language, task }) => {
                        info!(
                            "Reconfigure while disconnected. New lang: {:?}, task: {:?}",
                            language, task
                        );
                        self.language = language;
                        self.task = task;
                    }
                    Ok(StreamCommand::Stop) => {
                        let _ = events_tx.send(StreamEvent::Stopped).await;
                        return;
                    }
                    Err(_) => break,
                }
            }

            let socket_url = match self.acquire_session().await {
                Ok(url) => url,
                Err(e) => {
                    warn!("Session acquisition failed: {:#}", e);
                    if self.register_failure(&events_tx).await {
                        return;
                    }
                    continue;
                }
            };

            let ws_stream = match connect_async(socket_url.as_str()).await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("Socket connect failed: {}", e);
                    if self.register_failure(&events_tx).await {
                        return;
                    }
                    continue;
                }
            };

            // Fresh socket session: counters reset, timestamps re-anchor
            // on the next transmitted frame.
            self.retry_count = 0;
            self.anchor.reset();
            let connection_uid = Uuid::new_v4().to_string();
            let session_id = self.session_id.clone().unwrap_or_default();
            info!(
                "Socket open (session {}, connection {}). Lang: {:?}, task: {:?}",
                session_id, connection_uid, self.language, self.task
            );
            let _ = events_tx
                .send(StreamEvent::Connected {
                    session_id,
                    connection_uid,
                })
                .await;

            let (mut ws_tx, mut ws_rx) = ws_stream.split();

            let keepalive_enabled = self.settings.keepalive_interval_ms.unwrap_or(0) > 0;
            let keepalive_period = self
                .settings
                .keepalive_interval_ms
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
                // Effectively disabled; the guard below never fires it
                .unwrap_or(Duration::from_secs(3600));
            let mut keepalive = tokio::time::interval(keepalive_period);
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            keepalive.tick().await;

            let end = loop {
                tokio::select! {
                    frame = audio_rx.recv() => {
                        match frame {
                            Some(frame) => {
                                if self.anchor.set_once() {
                                    info!("Audio anchor set at first transmitted frame");
                                }
                                let bytes = frame.to_le_bytes();
                                if ws_tx.send(Message::Binary(bytes.into())).await.is_err() {
                                    break SocketEnd::Dropped;
                                }
                            }
                            None => break SocketEnd::StopRequested,
                        }
                    }
                    command = command_rx.recv() => {
                        match command {
                            Some(StreamCommand::Reconfigure { language, task }) => {
                                info!(
                                    "Reconfigure received. New lang: {:?}, task: {:?}",
                                    language, task
                                );
                                self.language = language;
                                self.task = task;
                                break SocketEnd::Reconfigure;
                            }
                            Some(StreamCommand::Stop) | None => break SocketEnd::StopRequested,
                        }
                    }
                    message = ws_rx.next() => {
                        match message {
                            Some(Ok(Message::Text(text))) => {
                                match self.dispatch(text.as_str(), &events_tx).await {
                                    Dispatch::Continue => {}
                                    Dispatch::CloseSocket => break SocketEnd::Dropped,
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                warn!("Socket closed by server: {:?}", frame);
                                break SocketEnd::Dropped;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("Socket error: {}", e);
                                break SocketEnd::Dropped;
                            }
                            None => break SocketEnd::Dropped,
                        }
                    }
                    _ = keepalive.tick(), if keepalive_enabled => {
                        // Independent of the silence gate: keeps an idle
                        // backend session warm with a near-silent frame.
                        let frame = keepalive_frame();
                        debug!("Sending keep-alive frame ({} samples)", KEEPALIVE_SAMPLES);
                        if ws_tx.send(Message::Binary(frame.into())).await.is_err() {
                            break SocketEnd::Dropped;
                        }
                    }
                }
            };

            match end {
                SocketEnd::StopRequested => {
                    info!("Stopping stream: sending end-of-audio signal");
                    let _ = ws_tx
                        .send(Message::Text(stop_recording_message().into()))
                        .await;
                    tokio::time::sleep(Duration::from_millis(STOP_GRACE_MS)).await;
                    let _ = ws_tx.close().await;
                    let _ = events_tx.send(StreamEvent::Stopped).await;
                    return;
                }
                SocketEnd::Dropped | SocketEnd::Reconfigure => {
                    let _ = ws_tx.close().await;
                    if self.register_failure(&events_tx).await {
                        return;
                    }
                }
            }
        }
    }

    /// Record a failed connection attempt. Returns true when the retry
    /// budget is exhausted and the client must stop; otherwise sleeps the
    /// backoff delay and returns false.
    async fn register_failure(&mut self, events_tx: &mpsc::Sender<StreamEvent>) -> bool {
        self.retry_count += 1;
        if self.retry_count > MAX_STREAM_RETRIES {
            error!(
                "Maximum stream reconnect attempts ({}) reached, giving up",
                MAX_STREAM_RETRIES
            );
            let fatal = BotError::StreamConnection {
                retries: MAX_STREAM_RETRIES,
            };
            let _ = events_tx.send(StreamEvent::Fatal(fatal.to_string())).await;
            return true;
        }

        let delay = reconnect_delay_ms(self.settings.reconnect_base_ms, self.retry_count);
        warn!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay, self.retry_count, MAX_STREAM_RETRIES
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
        false
    }

    async fn dispatch(&self, text: &str, events_tx: &mpsc::Sender<StreamEvent>) -> Dispatch {
        let message = match ServerMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Unparseable server message: {} ({})", text, e);
                return Dispatch::Continue;
            }
        };

        match message {
            ServerMessage::Transcript {
                is_final,
                utterance,
            } => {
                info!(
                    "{} transcript: \"{}\" ({:.2}s-{:.2}s, lang: {})",
                    if is_final { "Final" } else { "Partial" },
                    utterance.text,
                    utterance.start,
                    utterance.end,
                    utterance.language.as_deref().unwrap_or("?"),
                );
                let _ = events_tx
                    .send(StreamEvent::Transcript {
                        is_final,
                        utterance,
                    })
                    .await;
            }
            ServerMessage::AudioChunkAck { byte_range } => {
                debug!(
                    "Audio chunk acknowledged: {}-{}",
                    byte_range.0, byte_range.1
                );
            }
            ServerMessage::Error { message } => {
                error!("Stream server error: {}", message);
            }
            ServerMessage::Busy { message } => {
                info!("Stream server busy: {}", message);
            }
            ServerMessage::DetectedLanguage { language } => {
                info!("Language detected: {}", language);
                let _ = events_tx
                    .send(StreamEvent::DetectedLanguage(language))
                    .await;
            }
            ServerMessage::Disconnect => {
                info!("Server requested disconnect");
                return Dispatch::CloseSocket;
            }
            ServerMessage::Other(value) => {
                debug!("Unhandled server message: {}", value);
            }
        }

        Dispatch::Continue
    }
}

/// Near-silent PCM waveform used for keep-alive. Alternating ±1 keeps the
/// payload non-degenerate without registering as speech.
fn keepalive_frame() -> Vec<u8> {
    let samples: Vec<i16> = (0..KEEPALIVE_SAMPLES)
        .map(|i| if i % 2 == 0 { 1 } else { -1 })
        .collect();
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
