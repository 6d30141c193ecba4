// Tests for the transcription backend wire types.

use meeting_attendant::audio::PcmFrame;
use meeting_attendant::stream::protocol::{
    stop_recording_message, ServerMessage, SessionRequest,
};

#[test]
fn test_session_request_body_shape() {
    let request = SessionRequest::new(16_000, vec!["en".to_string()]);
    let body = serde_json::to_value(&request).unwrap();

    assert_eq!(body["encoding"], "wav/pcm");
    assert_eq!(body["bit_depth"], 16);
    assert_eq!(body["sample_rate"], 16_000);
    assert_eq!(body["channels"], 1);
    assert_eq!(body["language_config"]["languages"], serde_json::json!(["en"]));
    assert_eq!(body["language_config"]["code_switching"], true);
    assert_eq!(body["pre_processing"]["audio_enhancer"], true);

    let messages = &body["messages_config"];
    assert_eq!(messages["receive_partial_transcripts"], false);
    assert_eq!(messages["receive_final_transcripts"], true);
    assert_eq!(messages["receive_speech_events"], true);
    assert_eq!(messages["receive_acknowledgments"], true);
    assert_eq!(messages["receive_errors"], true);
    assert_eq!(messages["receive_lifecycle_events"], false);
}

#[test]
fn test_auto_detect_sends_empty_language_list() {
    let request = SessionRequest::new(16_000, Vec::new());
    let body = serde_json::to_value(&request).unwrap();
    assert_eq!(body["language_config"]["languages"], serde_json::json!([]));
}

#[test]
fn test_parse_final_transcript() {
    let text = r#"{"type":"transcript","data":{"is_final":true,
        "utterance":{"text":"hello there","start":1.25,"end":2.5,"language":"en"}}}"#;

    match ServerMessage::parse(text).unwrap() {
        ServerMessage::Transcript { is_final, utterance } => {
            assert!(is_final);
            assert_eq!(utterance.text, "hello there");
            assert_eq!(utterance.start, 1.25);
            assert_eq!(utterance.end, 2.5);
            assert_eq!(utterance.language.as_deref(), Some("en"));
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_parse_partial_transcript_defaults() {
    let text = r#"{"type":"transcript","data":{"is_final":false,
        "utterance":{"text":"hel"}}}"#;

    match ServerMessage::parse(text).unwrap() {
        ServerMessage::Transcript { is_final, utterance } => {
            assert!(!is_final);
            assert_eq!(utterance.text, "hel");
            assert_eq!(utterance.language, None);
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_parse_audio_chunk_ack() {
    let text = r#"{"type":"audio_chunk","data":{"byte_range":[0,3200]}}"#;
    assert_eq!(
        ServerMessage::parse(text).unwrap(),
        ServerMessage::AudioChunkAck {
            byte_range: (0, 3200)
        }
    );
}

#[test]
fn test_parse_error_and_busy_statuses() {
    assert_eq!(
        ServerMessage::parse(r#"{"status":"ERROR","message":"bad frame"}"#).unwrap(),
        ServerMessage::Error {
            message: "bad frame".to_string()
        }
    );
    assert_eq!(
        ServerMessage::parse(r#"{"status":"WAIT","message":"overloaded"}"#).unwrap(),
        ServerMessage::Busy {
            message: "overloaded".to_string()
        }
    );
}

#[test]
fn test_parse_detected_language() {
    assert_eq!(
        ServerMessage::parse(r#"{"language":"fr"}"#).unwrap(),
        ServerMessage::DetectedLanguage {
            language: "fr".to_string()
        }
    );
}

#[test]
fn test_parse_disconnect_request() {
    assert_eq!(
        ServerMessage::parse(r#"{"message":"DISCONNECT"}"#).unwrap(),
        ServerMessage::Disconnect
    );
}

#[test]
fn test_unknown_message_is_preserved() {
    match ServerMessage::parse(r#"{"something":"else"}"#).unwrap() {
        ServerMessage::Other(value) => assert_eq!(value["something"], "else"),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_stop_message_shape() {
    let value: serde_json::Value = serde_json::from_str(&stop_recording_message()).unwrap();
    assert_eq!(value["type"], "stop_recording");
}

#[test]
fn test_pcm_frames_serialize_little_endian() {
    let frame = PcmFrame {
        samples: vec![1, -2, 256],
        sample_rate: 16_000,
    };
    assert_eq!(
        frame.to_le_bytes(),
        vec![0x01, 0x00, 0xFE, 0xFF, 0x00, 0x01]
    );
}
