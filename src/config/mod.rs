//! Configuration reading and data directory paths.
//!
//! The controller never reads config from module-level globals: the embedding
//! application constructs one `SessionConfig` (from disk or in code) and
//! injects it at controller construction.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detector::DetectorConfig;
use paths::get_data_dir;

/// Default realtime model the debate demo speaks to.
const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Top-level session_config.json shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Realtime model identifier.
    pub model: String,
    /// Assistant voice selector.
    pub voice: String,
    /// System instructions for the debate persona.
    pub instructions: Option<String>,
    /// Priming message sent right after the channel opens to elicit the
    /// first assistant turn. Preserved demo behavior; set to `None` to skip.
    pub greeting: Option<String>,
    /// Endpoint minting the short-lived session credential.
    pub token_endpoint: String,
    /// Realtime transport endpoint accepting the SDP offer.
    pub realtime_endpoint: String,
    /// Input device name; `None` uses the system default microphone.
    pub input_device: Option<String>,
    /// Silence-detector tuning.
    pub detector: DetectorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: "verse".to_string(),
            instructions: None,
            greeting: Some("Hello! Let's begin the debate.".to_string()),
            token_endpoint: "http://localhost:3000/api/session".to_string(),
            realtime_endpoint: "https://api.openai.com/v1/realtime".to_string(),
            input_device: None,
            detector: DetectorConfig::default(),
        }
    }
}

/// Read session_config.json from the data directory, falling back to
/// defaults if missing or unparsable.
pub fn read_session_config() -> SessionConfig {
    read_json_file(&get_config_path()).unwrap_or_default()
}

/// Path to session_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("session_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
