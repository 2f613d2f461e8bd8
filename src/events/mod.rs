//! Wire vocabulary of the realtime event channel.
//!
//! The message schema is the transport provider's contract; we mirror it with
//! serde-tagged enums and treat anything we don't recognize as ignorable.
//! Inbound events arrive as JSON text frames on the data channel; outbound
//! events are serialized the same way.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound control/data messages from the realtime transport.
///
/// Unrecognized `type` values deserialize to [`ServerEvent::Unknown`] and are
/// dropped without error by the interpreter.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// The user started speaking into the input buffer.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// The user stopped speaking. The transcript has not arrived yet.
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// The input buffer was committed for transcription.
    #[serde(rename = "input_audio_buffer.committed")]
    InputCommitted,

    /// Partial transcript of the in-progress user utterance.
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    UserTranscriptionDelta {
        #[serde(default)]
        delta: String,
    },

    /// Final transcript of the user utterance.
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    UserTranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },

    /// Incremental assistant transcript text.
    #[serde(rename = "response.audio_transcript.delta")]
    AssistantTranscriptDelta {
        #[serde(default)]
        delta: String,
    },

    /// The assistant transcript for this response is complete.
    #[serde(rename = "response.audio_transcript.done")]
    AssistantTranscriptDone,

    /// Assistant audio playback started.
    #[serde(rename = "output_audio_buffer.started")]
    AudioPlaybackStarted,

    /// Assistant audio playback stopped. Not reliably delivered; the silence
    /// detector compensates when this never arrives.
    #[serde(rename = "output_audio_buffer.stopped")]
    AudioPlaybackStopped,

    /// The model requested a function/tool call.
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        name: String,
        call_id: String,
        /// JSON-encoded argument object.
        #[serde(default)]
        arguments: String,
    },

    /// Transport-reported error. Isolated per message, never fatal.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: serde_json::Value,
    },

    /// Any message type we don't interpret.
    #[serde(other)]
    Unknown,
}

/// Outbound messages to the realtime transport.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Create a conversation item (user message or function-call output).
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Ask the model to produce a response to the current conversation.
    #[serde(rename = "response.create")]
    ResponseCreate,

    /// Update session parameters (instructions, voice, tool schemas).
    #[serde(rename = "session.update")]
    SessionUpdate { session: serde_json::Value },
}

impl ClientEvent {
    /// A user text message item.
    pub fn user_message(text: &str) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "user".to_string(),
                content: vec![ContentPart::InputText {
                    text: text.to_string(),
                }],
            },
        }
    }

    /// A function-call result item answering `call_id`.
    pub fn function_output(call_id: &str, output: &serde_json::Value) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.to_string(),
                output: output.to_string(),
            },
        }
    }
}

/// Items carried by `conversation.item.create`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    #[serde(rename = "message")]
    Message {
        role: String,
        content: Vec<ContentPart>,
    },
    #[serde(rename = "function_call_output")]
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "input_text")]
    InputText { text: String },
}

/// Parse one inbound data-channel frame.
///
/// Malformed payloads return `None` after a warning; they never interrupt the
/// session.
pub fn parse_server_event(raw: &[u8]) -> Option<ServerEvent> {
    match serde_json::from_slice::<ServerEvent>(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Discarding malformed event payload: {}", e);
            None
        }
    }
}

/// Serialize an outbound event with a fresh event id.
pub fn encode_client_event(event: &ClientEvent) -> anyhow::Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "event_id".to_string(),
            serde_json::Value::String(format!("evt_{}", Uuid::new_v4().simple())),
        );
    }
    Ok(value.to_string())
}
