// Wire types for the transcription backend.
//
// Session creation is a JSON POST answered with `{id, url}`; the socket
// then carries raw little-endian PCM16 frames outbound and JSON messages
// inbound. Inbound messages are not uniformly tagged (transcripts and
// acks carry `type`, advisory statuses carry `status`, a few carry only a
// single field), so dispatch inspects the value rather than relying on a
// single serde tag.

use serde::{Deserialize, Serialize};

/// Session-creation request body carrying the audio encoding and the
/// message classes the client wants on the socket.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    pub encoding: String,
    pub bit_depth: u16,
    pub sample_rate: u32,
    pub channels: u16,
    pub language_config: LanguageConfig,
    pub pre_processing: PreProcessing,
    pub messages_config: MessagesConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageConfig {
    /// Empty means auto-detect
    pub languages: Vec<String>,
    pub code_switching: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreProcessing {
    pub audio_enhancer: bool,
    pub speech_threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesConfig {
    pub receive_partial_transcripts: bool,
    pub receive_final_transcripts: bool,
    pub receive_speech_events: bool,
    pub receive_pre_processing_events: bool,
    pub receive_realtime_processing_events: bool,
    pub receive_post_processing_events: bool,
    pub receive_acknowledgments: bool,
    pub receive_errors: bool,
    pub receive_lifecycle_events: bool,
}

impl SessionRequest {
    pub fn new(sample_rate: u32, languages: Vec<String>) -> Self {
        Self {
            encoding: "wav/pcm".to_string(),
            bit_depth: 16,
            sample_rate,
            channels: 1,
            language_config: LanguageConfig {
                languages,
                code_switching: true,
            },
            pre_processing: PreProcessing {
                audio_enhancer: true,
                speech_threshold: 0.01,
            },
            messages_config: MessagesConfig {
                receive_partial_transcripts: false,
                receive_final_transcripts: true,
                receive_speech_events: true,
                receive_pre_processing_events: true,
                receive_realtime_processing_events: true,
                receive_post_processing_events: true,
                receive_acknowledgments: true,
                receive_errors: true,
                receive_lifecycle_events: false,
            },
        }
    }
}

/// Session-creation response.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub url: String,
}

/// Best-effort notification of the issued session id to an external
/// manager, for crash recovery.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCallback {
    pub connection_id: String,
    pub stream_session_id: String,
}

/// End-of-audio control message.
pub fn stop_recording_message() -> String {
    serde_json::json!({ "type": "stop_recording" }).to_string()
}

/// A transcript utterance with its time span.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Utterance {
    pub text: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub language: Option<String>,
}

/// Inbound socket messages, dispatched by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Transcript {
        is_final: bool,
        utterance: Utterance,
    },
    /// Receipt acknowledgment for a transmitted byte range
    AudioChunkAck {
        byte_range: (u64, u64),
    },
    /// Server-side error status; the socket usually closes right after
    Error {
        message: String,
    },
    /// Advisory busy status; keep streaming
    Busy {
        message: String,
    },
    /// Language auto-detection notice
    DetectedLanguage {
        language: String,
    },
    /// Server asks the client to close the socket
    Disconnect,
    /// Anything unrecognized; logged and otherwise ignored
    Other(serde_json::Value),
}

impl ServerMessage {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        if let Some(kind) = value.get("type").and_then(|v| v.as_str()) {
            match kind {
                "transcript" => {
                    let data = value
                        .get("data")
                        .ok_or_else(|| anyhow::anyhow!("transcript without data"))?;
                    let is_final = data
                        .get("is_final")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let utterance: Utterance = serde_json::from_value(
                        data.get("utterance")
                            .cloned()
                            .ok_or_else(|| anyhow::anyhow!("transcript without utterance"))?,
                    )?;
                    return Ok(ServerMessage::Transcript {
                        is_final,
                        utterance,
                    });
                }
                "audio_chunk" => {
                    let range = value
                        .get("data")
                        .and_then(|d| d.get("byte_range"))
                        .and_then(|r| r.as_array())
                        .map(|r| {
                            (
                                r.first().and_then(|v| v.as_u64()).unwrap_or(0),
                                r.get(1).and_then(|v| v.as_u64()).unwrap_or(0),
                            )
                        })
                        .unwrap_or((0, 0));
                    return Ok(ServerMessage::AudioChunkAck { byte_range: range });
                }
                _ => {}
            }
        }

        if let Some(status) = value.get("status").and_then(|v| v.as_str()) {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            match status {
                "ERROR" => return Ok(ServerMessage::Error { message }),
                "WAIT" => return Ok(ServerMessage::Busy { message }),
                _ => {}
            }
        }

        if value.get("message").and_then(|v| v.as_str()) == Some("DISCONNECT") {
            return Ok(ServerMessage::Disconnect);
        }

        if let Some(language) = value.get("language").and_then(|v| v.as_str()) {
            return Ok(ServerMessage::DetectedLanguage {
                language: language.to_string(),
            });
        }

        Ok(ServerMessage::Other(value))
    }
}
