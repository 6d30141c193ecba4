// Top-level session state machine.
//
// Drives the join → record → leave lifecycle against the UI driver and
// composes the audio pipeline, stream client, speaker tracker and leave
// policy while recording. External control (stop, reconfigure) arrives on
// a command queue so every mutation of shared session state happens on
// this task.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audio::FrameProcessor;
use crate::config::BotConfig;
use crate::driver::{AdmissionResult, MeetingDriver};
use crate::error::BotError;
use crate::policy::{run_evaluator, PolicyTrigger};
use crate::presence::{ParticipantCount, SpeakerEventKind, SpeakerTracker};
use crate::retry::retry_with_wait;
use crate::stream::{AudioAnchor, StreamClient, StreamCommand, StreamEvent};

/// Wait between recording-preparation attempts.
const PREPARE_RETRY_WAIT: Duration = Duration::from_secs(2);
const PREPARE_ATTEMPTS: u32 = 3;

/// How long the leave sequence waits for the stream client to flush.
const STREAM_STOP_WAIT: Duration = Duration::from_secs(3);

/// Lifecycle phases of one meeting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotPhase {
    Joining,
    AwaitingAdmission,
    PreparingRecording,
    Recording,
    Leaving,
    Terminated,
}

impl BotPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotPhase::Joining => "joining",
            BotPhase::AwaitingAdmission => "awaiting_admission",
            BotPhase::PreparingRecording => "preparing_recording",
            BotPhase::Recording => "recording",
            BotPhase::Leaving => "leaving",
            BotPhase::Terminated => "terminated",
        }
    }
}

/// Machine-readable cause of session termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    MissingMeetingUrl,
    JoinError,
    AdmissionFailed,
    PrepareRecordingFailed,
    PostJoinSetupError,
    ContextInvalid,
    NoParticipantsTimeout,
    AloneWithBotTimeout,
    MaxDurationExceeded,
    ExplicitStop,
    StreamError,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::MissingMeetingUrl => "missing_meeting_url",
            ExitReason::JoinError => "join_error",
            ExitReason::AdmissionFailed => "admission_failed",
            ExitReason::PrepareRecordingFailed => "prepare_recording_failed",
            ExitReason::PostJoinSetupError => "post_join_setup_error",
            ExitReason::ContextInvalid => "context_invalid",
            ExitReason::NoParticipantsTimeout => "no_participants_timeout",
            ExitReason::AloneWithBotTimeout => "alone_with_bot_timeout",
            ExitReason::MaxDurationExceeded => "max_duration_exceeded",
            ExitReason::ExplicitStop => "explicit_stop",
            ExitReason::StreamError => "stream_error",
        }
    }

    /// Numeric exit code distinguishing the failure family: join 1,
    /// admission 2, preparation 3, everything else 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::MissingMeetingUrl
            | ExitReason::JoinError
            | ExitReason::PostJoinSetupError => 1,
            ExitReason::AdmissionFailed => 2,
            ExitReason::PrepareRecordingFailed => 3,
            _ => 0,
        }
    }
}

/// Final state exposed to the caller once the session terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: ExitReason,
    pub exit_code: i32,
}

/// External commands accepted while a session is running.
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    /// Stop the session now (reason `explicit_stop`)
    Stop,
    /// Change the stream client's language/task hints
    Reconfigure {
        language: Option<String>,
        task: Option<String>,
    },
}

/// Cloneable handle for sending commands into a running session.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
}

impl ControllerHandle {
    pub async fn stop(&self) -> bool {
        self.command_tx.send(ControllerCommand::Stop).await.is_ok()
    }

    pub async fn reconfigure(&self, language: Option<String>, task: Option<String>) -> bool {
        self.command_tx
            .send(ControllerCommand::Reconfigure { language, task })
            .await
            .is_ok()
    }
}

/// Everything that has to be wound down when leaving from the recording
/// phase.
struct RecordingRig {
    stream_command_tx: mpsc::Sender<StreamCommand>,
    stream_events_rx: mpsc::Receiver<StreamEvent>,
    count: ParticipantCount,
    tasks: Vec<JoinHandle<()>>,
}

pub struct SessionController {
    config: BotConfig,
    driver: Arc<dyn MeetingDriver>,
    command_rx: mpsc::Receiver<ControllerCommand>,
    /// Backend session id recovered from a previous attempt, if any
    resume_session_id: Option<String>,
}

impl SessionController {
    pub fn new(
        config: BotConfig,
        driver: Arc<dyn MeetingDriver>,
        resume_session_id: Option<String>,
    ) -> (Self, ControllerHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        (
            Self {
                config,
                driver,
                command_rx,
                resume_session_id,
            },
            ControllerHandle { command_tx },
        )
    }

    /// Run the session to completion. Always returns an outcome; every
    /// failure path goes through the same leave sequence.
    pub async fn run(mut self) -> SessionOutcome {
        let display_name = self.config.meeting.display_name.clone();

        let meeting_url = match self.config.meeting.url.clone() {
            Some(url) if !url.is_empty() => url,
            _ => {
                error!("No meeting URL configured, nothing to join");
                return self.leave_and_terminate(ExitReason::MissingMeetingUrl, None).await;
            }
        };

        self.enter(BotPhase::Joining);
        if let Err(e) = self.driver.join(&meeting_url, &display_name).await {
            error!("{}", BotError::Join(format!("{:#}", e)));
            self.driver.capture_diagnostic("join-error").await;
            return self.leave_and_terminate(ExitReason::JoinError, None).await;
        }
        info!("{} requested to join the meeting", display_name);

        self.enter(BotPhase::AwaitingAdmission);
        let waiting_room = Duration::from_millis(self.config.automatic_leave.waiting_room_timeout_ms);
        match self.driver.await_admission(waiting_room).await {
            Ok(AdmissionResult::Admitted) => {
                info!("Admitted to the meeting");
            }
            Ok(AdmissionResult::Rejected) => {
                warn!("Join request rejected by the platform");
                self.driver.capture_diagnostic("admission-failed").await;
                return self.leave_and_terminate(ExitReason::AdmissionFailed, None).await;
            }
            Ok(AdmissionResult::TimedOut) => {
                warn!(
                    "{}",
                    BotError::AdmissionTimeout {
                        timeout_ms: waiting_room.as_millis() as u64
                    }
                );
                self.driver.capture_diagnostic("admission-failed").await;
                return self.leave_and_terminate(ExitReason::AdmissionFailed, None).await;
            }
            Err(e) => {
                warn!("Admission check failed: {:#}", e);
                self.driver.capture_diagnostic("admission-failed").await;
                return self.leave_and_terminate(ExitReason::AdmissionFailed, None).await;
            }
        }

        self.enter(BotPhase::PreparingRecording);
        let driver = self.driver.clone();
        let diag_driver = self.driver.clone();
        let prepared = retry_with_wait(
            "prepare recording",
            PREPARE_ATTEMPTS,
            PREPARE_RETRY_WAIT,
            || {
                let driver = driver.clone();
                async move { driver.prepare_recording().await }
            },
            Some(move || async move {
                diag_driver.capture_diagnostic("recording-prep-failed").await;
            }),
        )
        .await;
        if let Err(e) = prepared {
            error!(
                "{}",
                BotError::RecordingPrep {
                    attempts: PREPARE_ATTEMPTS,
                    source: e,
                }
            );
            return self
                .leave_and_terminate(ExitReason::PrepareRecordingFailed, None)
                .await;
        }
        info!("Recording preparation successful");

        self.enter(BotPhase::Recording);
        let (reason, rig) = match self.record().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("{}", BotError::AudioPipeline(format!("{:#}", e)));
                self.driver.capture_diagnostic("post-join-setup-error").await;
                return self
                    .leave_and_terminate(ExitReason::PostJoinSetupError, None)
                    .await;
            }
        };

        self.leave_and_terminate(reason, Some(rig)).await
    }

    fn enter(&self, phase: BotPhase) {
        info!("Session phase: {}", phase.as_str());
    }

    /// Wire up the recording-phase tasks and wait for the first
    /// termination signal.
    async fn record(&mut self) -> Result<(ExitReason, RecordingRig)> {
        let anchor = AudioAnchor::default();

        let presence_rx = self.driver.observe_presence().await?;
        let capture_rx = self.driver.capture_audio().await?;

        // Speaker tracker
        let tracker = SpeakerTracker::new(self.config.tracker_config(), anchor.clone());
        let count = tracker.count_handle();
        let (speaker_tx, mut speaker_rx) = mpsc::channel(64);
        let tracker_task = tokio::spawn(tracker.run(presence_rx, speaker_tx));

        // Stream client
        let client = StreamClient::new(
            self.config.stream_settings(),
            anchor.clone(),
            self.resume_session_id.take(),
        );
        let (pcm_tx, pcm_rx) = mpsc::channel(64);
        let (stream_command_tx, stream_command_rx) = mpsc::channel(16);
        let (stream_events_tx, mut stream_events_rx) = mpsc::channel(64);
        let stream_task = tokio::spawn(client.run(pcm_rx, stream_command_rx, stream_events_tx));

        // Audio pipeline: capture -> resample/gate -> stream client.
        // Frames are handled one at a time; the channel bound is the only
        // buffering.
        let processor = FrameProcessor::new(self.config.resampler_config());
        let pipeline_task = tokio::spawn(async move {
            let mut capture_rx = capture_rx;
            while let Some(frame) = capture_rx.recv().await {
                if let Some(pcm) = processor.process(&frame) {
                    if pcm_tx.send(pcm).await.is_err() {
                        break;
                    }
                }
            }
            info!("Audio capture stream ended");
        });

        // Leave policy
        let (policy_tx, mut policy_rx) = mpsc::channel(4);
        let policy_task = tokio::spawn(run_evaluator(
            self.config.policy_config(),
            self.driver.clone(),
            count.clone(),
            policy_tx,
        ));

        let max_duration = self
            .config
            .automatic_leave
            .max_session_duration_ms
            .map(Duration::from_millis);
        let session_deadline = async move {
            match max_duration {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(session_deadline);

        let mut policy_open = true;
        let mut speaker_open = true;
        let mut commands_open = true;
        let reason = loop {
            tokio::select! {
                command = self.command_rx.recv(), if commands_open => {
                    match command {
                        Some(ControllerCommand::Stop) => break ExitReason::ExplicitStop,
                        Some(ControllerCommand::Reconfigure { language, task }) => {
                            info!("Forwarding reconfigure to stream client");
                            let _ = stream_command_tx
                                .send(StreamCommand::Reconfigure { language, task })
                                .await;
                        }
                        // All handles dropped; the session keeps running
                        // on its own policies
                        None => commands_open = false,
                    }
                }
                trigger = policy_rx.recv(), if policy_open => {
                    match trigger {
                        Some(PolicyTrigger::ContextInvalid) => break ExitReason::ContextInvalid,
                        Some(PolicyTrigger::NoParticipantsTimeout) => {
                            break ExitReason::NoParticipantsTimeout
                        }
                        Some(PolicyTrigger::AloneWithBotTimeout) => {
                            break ExitReason::AloneWithBotTimeout
                        }
                        None => policy_open = false,
                    }
                }
                event = stream_events_rx.recv() => {
                    match event {
                        Some(StreamEvent::Fatal(message)) => {
                            error!("Stream client gave up: {}", message);
                            break ExitReason::StreamError;
                        }
                        Some(StreamEvent::Connected { session_id, connection_uid }) => {
                            info!(
                                "Streaming on session {} (connection {})",
                                session_id, connection_uid
                            );
                        }
                        Some(StreamEvent::Transcript { .. })
                        | Some(StreamEvent::DetectedLanguage(_))
                        | Some(StreamEvent::Stopped) => {}
                        None => {
                            // Stream task ended without a fatal event;
                            // treat like an unrecoverable stream failure.
                            break ExitReason::StreamError;
                        }
                    }
                }
                speaker = speaker_rx.recv(), if speaker_open => {
                    match speaker {
                        Some(event) => {
                            let kind = match event.kind {
                                SpeakerEventKind::Start => "SPEAKER_START",
                                SpeakerEventKind::End => "SPEAKER_END",
                            };
                            info!(
                                "{}: {} ({}) at +{}ms",
                                kind, event.display_name, event.participant_id, event.relative_ms
                            );
                        }
                        None => speaker_open = false,
                    }
                }
                _ = &mut session_deadline => {
                    warn!("Maximum session duration reached");
                    break ExitReason::MaxDurationExceeded;
                }
            }
        };

        Ok((
            reason,
            RecordingRig {
                stream_command_tx,
                stream_events_rx,
                count,
                tasks: vec![tracker_task, stream_task, pipeline_task, policy_task],
            },
        ))
    }

    /// The single leave path. Safe to reach from any phase; emits exactly
    /// one structured leave event and tears down whatever is running.
    async fn leave_and_terminate(
        mut self,
        reason: ExitReason,
        rig: Option<RecordingRig>,
    ) -> SessionOutcome {
        self.enter(BotPhase::Leaving);

        let participants = rig.as_ref().map(|r| r.count.get()).unwrap_or(0);
        let leave_event = serde_json::json!({
            "type": "LEAVING_MEETING",
            "reason": reason.as_str(),
            "connection_id": self.config.meeting.connection_id,
            "participants": participants,
            "ts": chrono::Utc::now().to_rfc3339(),
        });
        info!("Leave event: {}", leave_event);

        if let Some(mut rig) = rig {
            // Ask the stream client to flush and close; give it a bounded
            // window before tearing the tasks down.
            let _ = rig.stream_command_tx.send(StreamCommand::Stop).await;
            let stopped = tokio::time::timeout(STREAM_STOP_WAIT, async {
                while let Some(event) = rig.stream_events_rx.recv().await {
                    if matches!(event, StreamEvent::Stopped | StreamEvent::Fatal(_)) {
                        break;
                    }
                }
            })
            .await;
            if stopped.is_err() {
                warn!("Stream client did not confirm stop in time");
            }

            for task in &rig.tasks {
                task.abort();
            }
        }

        // Best-effort: a missing leave control must not block teardown.
        let left = self.driver.leave().await;
        if left {
            info!("Leave control activated");
        } else {
            warn!("Leave control not found or leave failed; continuing teardown");
        }

        self.command_rx.close();
        self.enter(BotPhase::Terminated);

        let outcome = SessionOutcome {
            reason,
            exit_code: reason.exit_code(),
        };
        info!(
            "Session terminated: {} (exit code {})",
            reason.as_str(),
            outcome.exit_code
        );
        outcome
    }
}
