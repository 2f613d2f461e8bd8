//! Debate voice core — session driver binary.
//!
//! Wraps the session controller in JSON-line IPC on stdin/stdout so a UI
//! shell (Electron, a dev harness, a test script) can drive voice sessions
//! without linking the crate.

use tracing::info;
use tracing_subscriber::EnvFilter;

use debate_voice_core::audio::list_devices;
use debate_voice_core::config::read_session_config;
use debate_voice_core::ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use debate_voice_core::ipc::{UiCommand, UiEvent};
use debate_voice_core::session::{Notification, SessionController};

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info).
    // Logs go to stderr; stdout is reserved for the event stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Emit starting event immediately so the UI knows we're alive.
    emit_event(&UiEvent::Starting {});

    let config = read_session_config();
    info!(?config, "Configuration loaded");

    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel::<Notification>();
    let controller = SessionController::new(config, notify_tx);

    // Spawn stdin reader (blocking thread -> async channel).
    let mut cmd_rx = spawn_stdin_reader();

    emit_event(&UiEvent::Ready {});
    info!("Voice core ready");

    // Main loop: UI commands in, controller notifications out.
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !handle_command(&controller, command).await {
                            break;
                        }
                    }
                    None => {
                        // stdin closed — parent process gone.
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            notification = notify_rx.recv() => {
                if let Some(n) = notification {
                    emit_event(&to_ui_event(n));
                }
            }
        }
    }

    controller.stop_session();
    info!("Voice core shutting down");
}

fn to_ui_event(n: Notification) -> UiEvent {
    match n {
        Notification::Status(message) => UiEvent::Status { message },
        Notification::Conversation(entries) => UiEvent::Conversation { entries },
        Notification::Volume(level) => UiEvent::Volume { level },
        Notification::Playback(playing) => UiEvent::Playback { playing },
        Notification::Active(active) => UiEvent::SessionActive { active },
        Notification::Error(message) => UiEvent::Error { message },
    }
}

/// Handle a single command from the UI.
/// Returns `false` if the main loop should exit.
async fn handle_command(controller: &SessionController, cmd: UiCommand) -> bool {
    match cmd {
        UiCommand::Ping {} => {
            emit_event(&UiEvent::Pong {});
        }

        UiCommand::Stop {} => {
            emit_event(&UiEvent::Stopping {});
            return false;
        }

        // Establishment runs on its own task so status notifications keep
        // flowing to the UI while it is in flight.
        UiCommand::StartSession {} => {
            let controller = controller.clone();
            tokio::spawn(async move {
                if let Err(e) = controller.start_session().await {
                    info!("Session start failed: {}", e);
                }
            });
        }

        UiCommand::StopSession {} => {
            controller.stop_session();
        }

        UiCommand::Toggle {} => {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller.handle_start_stop_click().await;
            });
        }

        UiCommand::Say { text } => {
            if let Err(e) = controller.send_text_message(&text) {
                emit_error(&format!("Cannot send text: {}", e));
            }
        }

        UiCommand::ListAudioDevices {} => {
            emit_event(&UiEvent::AudioDevices {
                input: list_devices(),
            });
        }
    }

    true
}
