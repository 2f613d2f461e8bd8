//! Platform data directory paths.

use std::path::PathBuf;

/// Data directory: `<platform config dir>/debate-voice/data`.
///
/// Windows: `%APPDATA%`, macOS: `~/Library/Application Support`, Linux:
/// `$XDG_CONFIG_HOME` (default `~/.config`) — all via `dirs::config_dir`.
pub fn get_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("debate-voice")
        .join("data")
}
