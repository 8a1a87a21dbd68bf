use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line: `{"id": "...", "method": "scores.record", "params": {...}}`.
/// The id is echoed back verbatim so callers can correlate replies.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon-wide state. Both fields stay `None` until `workspace.select`
/// opens a SQLite workspace.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
