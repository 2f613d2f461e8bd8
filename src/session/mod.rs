//! Session orchestration: lifecycle, event interpretation, and playback
//! detection.
//!
//! The controller owns all mutable session state behind an `Arc`, so clones
//! are cheap handles that the IPC bridge, background tasks, and the embedding
//! application can all hold. `start_session` is the only long-running
//! operation; `stop_session` is synchronous, idempotent, and also serves as
//! cancellation for an establishment still in flight (every await point in
//! establishment re-checks the stop epoch).
//!
//! State changes surface as [`Notification`] values on a channel the embedder
//! supplies; the controller never talks to a UI directly.

pub mod phase;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{start_capture, CaptureHandle, LevelMeter};
use crate::config::SessionConfig;
use crate::conversation::{ConversationEntry, ConversationLog};
use crate::detector::{Decision, SilenceDetector};
use crate::error::SessionError;
use crate::events::{ClientEvent, ServerEvent};
use crate::tools::ToolRegistry;
use crate::transport::{self, TokenClient, TransportEvent, WebRtcHandle};

pub use phase::SessionPhase;

/// State changes pushed to the embedding application.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Human-readable progress/status line.
    Status(String),
    /// Full conversation snapshot after any log mutation.
    Conversation(Vec<ConversationEntry>),
    /// Assistant playback volume on a 0..1 scale.
    Volume(f32),
    /// Assistant audio playback started/stopped.
    Playback(bool),
    /// Session became active / inactive.
    Active(bool),
    /// A non-fatal or establishment error.
    Error(String),
}

/// Resources owned by one established session.
struct ActiveSession {
    capture: CaptureHandle,
    transport: WebRtcHandle,
    event_task: JoinHandle<()>,
    detector_task: JoinHandle<()>,
    meter: Arc<LevelMeter>,
}

struct Shared {
    config: SessionConfig,
    log: Mutex<ConversationLog>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    detector: Mutex<SilenceDetector>,
    phase: Mutex<SessionPhase>,
    tools: ToolRegistry,
    /// True from the moment a start is accepted until stop. Guards against
    /// concurrent starts.
    session_active: AtomicBool,
    audio_playing: AtomicBool,
    /// Bumped by every `stop_session`; establishment snapshots it and bails
    /// out if it moves.
    epoch: AtomicU64,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl Shared {
    fn notify(&self, n: Notification) {
        let _ = self.notifications.send(n);
    }

    fn notify_conversation(&self) {
        let entries = self.log.lock().unwrap().entries().to_vec();
        self.notify(Notification::Conversation(entries));
    }

    fn set_phase(&self, phase: SessionPhase, status: &str) {
        *self.phase.lock().unwrap() = phase;
        self.notify(Notification::Status(status.to_string()));
    }
}

/// Handle to the voice session core. Cloning shares the same session.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl SessionController {
    pub fn new(config: SessionConfig, notifications: mpsc::UnboundedSender<Notification>) -> Self {
        let detector = SilenceDetector::new(config.detector.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                log: Mutex::new(ConversationLog::new()),
                outbound: Mutex::new(None),
                detector: Mutex::new(detector),
                phase: Mutex::new(SessionPhase::Idle),
                tools: ToolRegistry::new(),
                session_active: AtomicBool::new(false),
                audio_playing: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                notifications,
            }),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.session_active.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.lock().unwrap()
    }

    /// Current conversation entries, in arrival order.
    pub fn conversation_snapshot(&self) -> Vec<ConversationEntry> {
        self.shared.log.lock().unwrap().entries().to_vec()
    }

    /// Register an async tool handler callable by the model. Allowed at any
    /// time, including mid-session.
    pub fn register_function<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        self.shared.tools.register_fn(name, f);
    }

    /// Toggle: stop when a session is active or establishing, start
    /// otherwise. Start errors are reported through notifications.
    pub async fn handle_start_stop_click(&self) {
        if self.is_active() {
            self.stop_session();
        } else if let Err(e) = self.start_session().await {
            debug!("Start rejected: {}", e);
        }
    }

    /// Establish a session: microphone, token, peer connection, then the
    /// event and detector loops.
    ///
    /// Errors are also emitted as notifications before returning, except
    /// [`SessionError::Cancelled`], which means a concurrent `stop_session`
    /// already reported the stop.
    pub async fn start_session(&self) -> Result<(), SessionError> {
        if self.shared.session_active.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyActive);
        }
        let my_epoch = self.shared.epoch.load(Ordering::SeqCst);

        self.shared.audio_playing.store(false, Ordering::SeqCst);
        self.shared.detector.lock().unwrap().reset();

        // Microphone first: permission prompts should appear before any
        // network traffic.
        self.shared
            .set_phase(SessionPhase::RequestingMic, "Requesting microphone...");
        let (mic_tx, mic_rx) = mpsc::channel::<Vec<f32>>(16);
        let capture = match start_capture(self.shared.config.input_device.clone(), mic_tx).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail_start(e)),
        };
        if self.establishment_cancelled(my_epoch) {
            capture.stop();
            return Err(SessionError::Cancelled);
        }

        self.shared
            .set_phase(SessionPhase::FetchingToken, "Fetching session token...");
        let token_client = TokenClient::new(&self.shared.config.token_endpoint);
        let token = match token_client.mint().await {
            Ok(t) => t,
            Err(e) => {
                capture.stop();
                return Err(self.fail_start(e));
            }
        };
        if self.establishment_cancelled(my_epoch) {
            capture.stop();
            return Err(SessionError::Cancelled);
        }

        self.shared
            .set_phase(SessionPhase::Establishing, "Establishing connection...");
        let (out_tx, out_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (transport, channels) =
            match transport::connect(&self.shared.config, &token, mic_rx, out_rx).await {
                Ok(pair) => pair,
                Err(e) => {
                    capture.stop();
                    return Err(self.fail_start(e));
                }
            };
        if self.establishment_cancelled(my_epoch) {
            capture.stop();
            transport.close();
            return Err(SessionError::Cancelled);
        }

        *self.shared.outbound.lock().unwrap() = Some(out_tx.clone());
        self.send_session_update(&out_tx);
        if let Some(greeting) = &self.shared.config.greeting {
            // Priming message: elicits the first assistant turn but is not a
            // conversation entry the user typed.
            let _ = out_tx.send(ClientEvent::user_message(greeting));
            let _ = out_tx.send(ClientEvent::ResponseCreate);
        }

        let meter = LevelMeter::new();
        let event_task = self.spawn_event_loop(channels, meter.clone());
        let detector_task = self.spawn_detector_loop(meter.clone());

        // Publish the active session, unless a stop won the race.
        {
            let mut active = self.active.lock().unwrap();
            if self.establishment_cancelled(my_epoch) {
                event_task.abort();
                detector_task.abort();
                capture.stop();
                transport.close();
                *self.shared.outbound.lock().unwrap() = None;
                return Err(SessionError::Cancelled);
            }
            *active = Some(ActiveSession {
                capture,
                transport,
                event_task,
                detector_task,
                meter,
            });
        }

        self.shared
            .set_phase(SessionPhase::Active, "Session established successfully!");
        self.shared.notify(Notification::Active(true));
        info!("Session active");
        Ok(())
    }

    /// Stop the session. Synchronous, idempotent, never fails.
    ///
    /// Also cancels an establishment still in flight. Calling with nothing
    /// running leaves all state untouched.
    pub fn stop_session(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        let was_active = self.shared.session_active.swap(false, Ordering::SeqCst);
        let active = self.active.lock().unwrap().take();

        if active.is_none() && !was_active {
            return;
        }

        if let Some(session) = active {
            session.event_task.abort();
            session.detector_task.abort();
            session.capture.stop();
            session.transport.close();
            session.meter.clear();
        }

        *self.shared.outbound.lock().unwrap() = None;
        self.shared.audio_playing.store(false, Ordering::SeqCst);
        self.shared.detector.lock().unwrap().reset();
        self.shared.log.lock().unwrap().clear();

        self.shared.set_phase(SessionPhase::Stopped, "Session stopped");
        self.shared.notify(Notification::Playback(false));
        self.shared.notify(Notification::Volume(0.0));
        self.shared.notify_conversation();
        self.shared.notify(Notification::Active(false));
        info!("Session stopped");
    }

    /// Send a typed user message and request a response.
    ///
    /// Whitespace-only text is a no-op. Requires an open event channel.
    pub fn send_text_message(&self, text: &str) -> Result<(), SessionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let sender = self
            .shared
            .outbound
            .lock()
            .unwrap()
            .clone()
            .ok_or(SessionError::ChannelClosed)?;

        self.shared.log.lock().unwrap().push_user_text(trimmed);
        self.shared.notify_conversation();

        sender
            .send(ClientEvent::user_message(trimmed))
            .map_err(|_| SessionError::ChannelClosed)?;
        sender
            .send(ClientEvent::ResponseCreate)
            .map_err(|_| SessionError::ChannelClosed)?;
        Ok(())
    }

    /// True once any `stop_session` has run since the establishment attempt
    /// that snapshotted `my_epoch` began. Checked after every establishment
    /// await so late-acquired resources are released instead of wired into an
    /// abandoned session.
    fn establishment_cancelled(&self, my_epoch: u64) -> bool {
        self.shared.epoch.load(Ordering::SeqCst) != my_epoch
    }

    /// Establishment failed: roll back to idle and report.
    fn fail_start(&self, err: SessionError) -> SessionError {
        self.shared.session_active.store(false, Ordering::SeqCst);
        self.shared.set_phase(SessionPhase::Idle, &format!("Error: {err}"));
        self.shared.notify(Notification::Error(err.to_string()));
        self.shared.notify(Notification::Active(false));
        err
    }

    /// Advertise session parameters right after the channel opens.
    fn send_session_update(&self, out: &mpsc::UnboundedSender<ClientEvent>) {
        let mut session = serde_json::json!({ "voice": self.shared.config.voice });
        if let Some(instructions) = &self.shared.config.instructions {
            session["instructions"] = serde_json::Value::String(instructions.clone());
        }
        let _ = out.send(ClientEvent::SessionUpdate { session });
    }

    fn spawn_event_loop(
        &self,
        channels: transport::TransportChannels,
        meter: Arc<LevelMeter>,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut events = channels.events;
            let mut inbound = channels.inbound_audio;
            let mut inbound_done = false;
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(TransportEvent::Message(event)) => {
                            controller.handle_server_event(event).await;
                        }
                        Some(TransportEvent::Closed) | None => {
                            info!("Transport closed; stopping session");
                            controller
                                .shared
                                .notify(Notification::Status("Connection closed".to_string()));
                            controller.stop_session();
                            break;
                        }
                    },
                    frame = inbound.recv(), if !inbound_done => match frame {
                        Some(frame) => meter.update(&frame),
                        None => inbound_done = true,
                    },
                }
            }
        })
    }

    fn spawn_detector_loop(&self, meter: Arc<LevelMeter>) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let interval_ms = shared.config.detector.interval_ms;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let energy = meter.take();
                let decision = shared.detector.lock().unwrap().observe(energy);
                match decision {
                    Decision::Audible { volume } => {
                        if !shared.audio_playing.swap(true, Ordering::SeqCst) {
                            shared.notify(Notification::Playback(true));
                        }
                        shared.notify(Notification::Volume(volume));
                    }
                    Decision::Stopped => {
                        if shared.audio_playing.swap(false, Ordering::SeqCst) {
                            shared.notify(Notification::Playback(false));
                            shared.notify(Notification::Volume(0.0));
                        }
                    }
                    Decision::Quiet => {}
                }
            }
        })
    }

    /// Interpret one inbound transport event.
    ///
    /// Problems here (unknown tools, malformed arguments, reported errors)
    /// are isolated to the offending message; the session keeps running.
    async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::SpeechStarted => {
                self.shared.log.lock().unwrap().begin_user_utterance();
                self.shared.notify_conversation();
            }
            ServerEvent::SpeechStopped => {
                debug!("User stopped speaking");
            }
            ServerEvent::InputCommitted => {
                self.shared.log.lock().unwrap().mark_user_committed();
                self.shared.notify_conversation();
            }
            ServerEvent::UserTranscriptionDelta { delta } => {
                self.shared.log.lock().unwrap().append_user_partial(&delta);
                self.shared.notify_conversation();
            }
            ServerEvent::UserTranscriptionCompleted { transcript } => {
                self.shared
                    .log
                    .lock()
                    .unwrap()
                    .finalize_user(transcript.trim());
                self.shared.notify_conversation();
            }
            ServerEvent::AssistantTranscriptDelta { delta } => {
                self.shared.log.lock().unwrap().append_assistant_delta(&delta);
                self.shared.notify_conversation();
            }
            ServerEvent::AssistantTranscriptDone => {
                self.shared.log.lock().unwrap().finalize_assistant();
                self.shared.notify_conversation();
            }
            ServerEvent::AudioPlaybackStarted => {
                self.shared.detector.lock().unwrap().reset();
                if !self.shared.audio_playing.swap(true, Ordering::SeqCst) {
                    self.shared.notify(Notification::Playback(true));
                }
                self.shared.notify(Notification::Volume(
                    self.shared.config.detector.initial_volume,
                ));
            }
            ServerEvent::AudioPlaybackStopped => {
                self.shared.detector.lock().unwrap().reset();
                if self.shared.audio_playing.swap(false, Ordering::SeqCst) {
                    self.shared.notify(Notification::Playback(false));
                    self.shared.notify(Notification::Volume(0.0));
                }
            }
            ServerEvent::FunctionCallArgumentsDone {
                name,
                call_id,
                arguments,
            } => {
                self.handle_function_call(&name, &call_id, &arguments).await;
            }
            ServerEvent::Error { error } => {
                warn!("Transport reported error: {}", error);
                self.shared.notify(Notification::Error(error.to_string()));
            }
            ServerEvent::Unknown => {}
        }
    }

    async fn handle_function_call(&self, name: &str, call_id: &str, arguments: &str) {
        let args: serde_json::Value = match serde_json::from_str(arguments) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = name, "Malformed tool arguments: {}", e);
                serde_json::Value::Null
            }
        };

        info!(tool = name, call_id, "Dispatching function call");
        let output = match self.shared.tools.dispatch(name, args).await {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                warn!(tool = name, "Tool handler failed: {}", e);
                serde_json::json!({ "error": e.to_string() })
            }
            None => {
                warn!(tool = name, "No handler registered; ignoring call");
                return;
            }
        };

        let sender = self.shared.outbound.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(ClientEvent::function_output(call_id, &output));
            let _ = sender.send(ClientEvent::ResponseCreate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (SessionController, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionController::new(SessionConfig::default(), tx), rx)
    }

    /// Wire a captured outbound channel as if establishment completed.
    fn install_outbound(
        c: &SessionController,
    ) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *c.shared.outbound.lock().unwrap() = Some(tx);
        rx
    }

    #[tokio::test]
    async fn test_stop_when_idle_leaves_state_untouched() {
        let (c, mut rx) = controller();
        c.stop_session();
        c.stop_session();
        assert!(!c.is_active());
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert!(rx.try_recv().is_err(), "idle stop must not notify");
    }

    #[tokio::test]
    async fn test_send_text_before_start_is_channel_closed() {
        let (c, _rx) = controller();
        assert!(matches!(
            c.send_text_message("hello"),
            Err(SessionError::ChannelClosed)
        ));
        assert!(c.conversation_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_send_whitespace_text_is_noop() {
        let (c, _rx) = controller();
        let mut out = install_outbound(&c);
        c.send_text_message("   \n\t ").unwrap();
        assert!(c.conversation_snapshot().is_empty());
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_text_logs_final_entry_and_requests_response() {
        let (c, _rx) = controller();
        let mut out = install_outbound(&c);
        c.send_text_message("  my point stands  ").unwrap();

        let entries = c.conversation_snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "my point stands");
        assert!(entries[0].is_final);

        assert!(matches!(
            out.try_recv().unwrap(),
            ClientEvent::ConversationItemCreate { .. }
        ));
        assert!(matches!(out.try_recv().unwrap(), ClientEvent::ResponseCreate));
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_user_utterance_flow_partial_to_final() {
        let (c, _rx) = controller();
        c.handle_server_event(ServerEvent::SpeechStarted).await;
        c.handle_server_event(ServerEvent::SpeechStopped).await;
        c.handle_server_event(ServerEvent::InputCommitted).await;
        c.handle_server_event(ServerEvent::UserTranscriptionDelta {
            delta: "the sky ".to_string(),
        })
        .await;
        c.handle_server_event(ServerEvent::UserTranscriptionDelta {
            delta: "is blue".to_string(),
        })
        .await;
        c.handle_server_event(ServerEvent::UserTranscriptionCompleted {
            transcript: "The sky is blue.".to_string(),
        })
        .await;

        let entries = c.conversation_snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "The sky is blue.");
        assert!(entries[0].is_final);
    }

    #[tokio::test]
    async fn test_assistant_deltas_merge_until_done() {
        let (c, _rx) = controller();
        c.handle_server_event(ServerEvent::AssistantTranscriptDelta {
            delta: "I dis".to_string(),
        })
        .await;
        c.handle_server_event(ServerEvent::AssistantTranscriptDelta {
            delta: "agree".to_string(),
        })
        .await;
        c.handle_server_event(ServerEvent::AssistantTranscriptDone).await;
        c.handle_server_event(ServerEvent::AssistantTranscriptDelta {
            delta: "Because".to_string(),
        })
        .await;

        let entries = c.conversation_snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "I disagree");
        assert!(entries[0].is_final);
        assert_eq!(entries[1].text, "Because");
    }

    #[tokio::test]
    async fn test_playback_events_toggle_flag_once() {
        let (c, mut rx) = controller();
        c.handle_server_event(ServerEvent::AudioPlaybackStarted).await;
        c.handle_server_event(ServerEvent::AudioPlaybackStarted).await;
        c.handle_server_event(ServerEvent::AudioPlaybackStopped).await;

        let mut playback = Vec::new();
        while let Ok(n) = rx.try_recv() {
            if let Notification::Playback(p) = n {
                playback.push(p);
            }
        }
        assert_eq!(playback, vec![true, false]);
        assert!(!c.shared.audio_playing.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_function_call_dispatches_and_answers() {
        let (c, _rx) = controller();
        let mut out = install_outbound(&c);
        c.register_function("audience_votes", |args| async move {
            Ok(serde_json::json!({ "topic": args["topic"], "votes": 42 }))
        });

        c.handle_server_event(ServerEvent::FunctionCallArgumentsDone {
            name: "audience_votes".to_string(),
            call_id: "call_7".to_string(),
            arguments: r#"{"topic":"ai"}"#.to_string(),
        })
        .await;

        match out.try_recv().unwrap() {
            ClientEvent::ConversationItemCreate { item } => {
                let value = serde_json::to_value(item).unwrap();
                assert_eq!(value["call_id"], "call_7");
                assert!(value["output"].as_str().unwrap().contains("42"));
            }
            other => panic!("expected item create, got {:?}", other),
        }
        assert!(matches!(out.try_recv().unwrap(), ClientEvent::ResponseCreate));
    }

    #[tokio::test]
    async fn test_unregistered_function_is_ignored() {
        let (c, _rx) = controller();
        let mut out = install_outbound(&c);
        c.handle_server_event(ServerEvent::FunctionCallArgumentsDone {
            name: "missing".to_string(),
            call_id: "call_1".to_string(),
            arguments: "{}".to_string(),
        })
        .await;
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failing_tool_reports_error_output() {
        let (c, _rx) = controller();
        let mut out = install_outbound(&c);
        c.register_function("flaky", |_| async { anyhow::bail!("backend down") });

        c.handle_server_event(ServerEvent::FunctionCallArgumentsDone {
            name: "flaky".to_string(),
            call_id: "call_2".to_string(),
            arguments: "{}".to_string(),
        })
        .await;

        match out.try_recv().unwrap() {
            ClientEvent::ConversationItemCreate { item } => {
                let value = serde_json::to_value(item).unwrap();
                assert!(value["output"].as_str().unwrap().contains("backend down"));
            }
            other => panic!("expected item create, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_during_establishment_cancels_the_attempt() {
        let (c, mut rx) = controller();
        // As start_session does before its first await: claim the active
        // flag and snapshot the stop epoch.
        assert!(!c.shared.session_active.swap(true, Ordering::SeqCst));
        let my_epoch = c.shared.epoch.load(Ordering::SeqCst);
        let _out = install_outbound(&c);
        assert!(!c.establishment_cancelled(my_epoch));

        // Stop lands while establishment is mid-flight.
        c.stop_session();

        // Every later checkpoint must refuse to wire the session up.
        assert!(c.establishment_cancelled(my_epoch));
        assert!(!c.is_active());
        assert!(c.active.lock().unwrap().is_none());
        assert!(c.shared.outbound.lock().unwrap().is_none());
        assert_eq!(c.phase(), SessionPhase::Stopped);

        let mut saw_inactive = false;
        while let Ok(n) = rx.try_recv() {
            if matches!(n, Notification::Active(false)) {
                saw_inactive = true;
            }
        }
        assert!(saw_inactive, "cancelled attempt must report inactive");

        // A fresh attempt starts from a clean slate.
        assert!(!c.shared.session_active.swap(true, Ordering::SeqCst));
        let next_epoch = c.shared.epoch.load(Ordering::SeqCst);
        assert!(!c.establishment_cancelled(next_epoch));
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back_and_reports() {
        let (c, mut rx) = controller();
        c.shared.session_active.store(true, Ordering::SeqCst);
        let err = c.fail_start(SessionError::MicPermissionDenied("denied by user".into()));
        assert!(matches!(err, SessionError::MicPermissionDenied(_)));
        assert!(!c.is_active());
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert!(c.shared.outbound.lock().unwrap().is_none());

        let mut saw_error = false;
        let mut saw_status = false;
        while let Ok(n) = rx.try_recv() {
            match n {
                Notification::Error(m) => saw_error = m.contains("permission"),
                Notification::Status(s) => saw_status = s.contains("permission"),
                _ => {}
            }
        }
        assert!(saw_error);
        assert!(saw_status);
    }

    #[tokio::test]
    async fn test_stop_clears_conversation_and_channel() {
        let (c, mut rx) = controller();
        let _out = install_outbound(&c);
        c.shared.session_active.store(true, Ordering::SeqCst);
        c.handle_server_event(ServerEvent::AssistantTranscriptDelta {
            delta: "hello".to_string(),
        })
        .await;

        c.stop_session();
        assert!(!c.is_active());
        assert!(c.conversation_snapshot().is_empty());
        assert!(c.shared.outbound.lock().unwrap().is_none());
        assert!(matches!(
            c.send_text_message("x"),
            Err(SessionError::ChannelClosed)
        ));

        let mut saw_inactive = false;
        while let Ok(n) = rx.try_recv() {
            if matches!(n, Notification::Active(false)) {
                saw_inactive = true;
            }
        }
        assert!(saw_inactive);

        // Second stop: nothing further is emitted.
        c.stop_session();
        assert!(rx.try_recv().is_err());
    }
}
