//! JSON file persistence for per-provider message lists.
use super::*;

/// Reads a session file; a missing file is an empty session.
pub(super) fn read_session_messages(path: &Path) -> Result<Vec<Message>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read session file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<Message>>(&raw)
        .with_context(|| format!("failed to parse session file {}", path.display()))
}

pub(super) fn write_session_messages_atomic(path: &Path, messages: &[Message]) -> Result<()> {
    let encoded =
        serde_json::to_string_pretty(messages).context("failed to encode session messages")?;
    write_text_atomic(path, &encoded)
}
