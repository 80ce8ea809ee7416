//! Per-provider conversation sessions persisted as JSON.
//!
//! Each provider owns `<state_dir>/<provider>_session.json`, holding the
//! ordered message list verbatim. Pairing between tool results and the
//! assistant calls that requested them is repaired before every save.
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use dcx_ai::{Message, MessageRole};
use dcx_core::write_text_atomic;

mod session_integrity;
mod session_storage;
#[cfg(test)]
mod tests;

pub use session_integrity::{pairing_report, repair_tool_pairing, PairingReport};
use session_storage::{read_session_messages, write_session_messages_atomic};

/// Project-local directory holding session files.
pub const SESSION_STATE_DIR: &str = ".deepcoderx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Size bound applied after each turn.
pub struct PruningPolicy {
    /// Prune once the history holds more than this many messages.
    pub max_messages: usize,
    /// Non-system messages retained when pruning.
    pub keep_recent: usize,
}

impl Default for PruningPolicy {
    fn default() -> Self {
        Self {
            max_messages: 10,
            keep_recent: 8,
        }
    }
}

pub fn session_path(state_dir: &Path, provider: &str) -> PathBuf {
    state_dir.join(format!("{provider}_session.json"))
}

/// Keeps the leading system message plus the newest `keep_recent` messages.
///
/// Returns how many messages were discarded.
pub fn prune_history(messages: &mut Vec<Message>, policy: PruningPolicy) -> usize {
    if messages.len() <= policy.max_messages {
        return 0;
    }
    let has_system = messages
        .first()
        .map(|message| message.role == MessageRole::System)
        .unwrap_or(false);
    let head = usize::from(has_system);
    let tail_start = messages.len().saturating_sub(policy.keep_recent).max(head);
    let removed = tail_start - head;
    messages.drain(head..tail_start);
    removed
}

#[derive(Debug)]
/// Public struct `SessionStore` used across dcx components.
pub struct SessionStore {
    provider: String,
    path: PathBuf,
    system_prompt: String,
    messages: Vec<Message>,
}

impl SessionStore {
    /// Loads (or starts) the session for `provider`, repairing pairing defects.
    pub fn load(state_dir: &Path, provider: &str, system_prompt: &str) -> Result<Self> {
        let path = session_path(state_dir, provider);
        let mut messages = read_session_messages(&path)?;
        let report = repair_tool_pairing(&mut messages);
        if !report.is_clean() {
            tracing::warn!(
                provider,
                orphaned = report.orphaned_tool_messages,
                dangling = report.dangling_tool_calls,
                "repaired session tool pairing on load"
            );
        }

        let mut store = Self {
            provider: provider.to_string(),
            path,
            system_prompt: system_prompt.to_string(),
            messages,
        };
        store.ensure_system_message();
        Ok(store)
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn prune(&mut self, policy: PruningPolicy) -> usize {
        let removed = prune_history(&mut self.messages, policy);
        if removed > 0 {
            let report = repair_tool_pairing(&mut self.messages);
            tracing::debug!(
                provider = %self.provider,
                removed,
                orphaned = report.orphaned_tool_messages,
                "pruned session history"
            );
        }
        removed
    }

    /// Repairs pairing and writes the session file atomically.
    pub fn save(&mut self) -> Result<()> {
        let report = repair_tool_pairing(&mut self.messages);
        if !report.is_clean() {
            tracing::warn!(
                provider = %self.provider,
                orphaned = report.orphaned_tool_messages,
                dangling = report.dangling_tool_calls,
                "repaired session tool pairing before save"
            );
        }
        write_session_messages_atomic(&self.path, &self.messages)
    }

    /// Deletes the session file and resets to the system message.
    pub fn clear(&mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).with_context(|| {
                format!("failed to remove session file {}", self.path.display())
            })?;
        }
        self.messages.clear();
        self.ensure_system_message();
        tracing::info!(provider = %self.provider, "session cleared");
        Ok(())
    }

    fn ensure_system_message(&mut self) {
        let has_system = self
            .messages
            .first()
            .map(|message| message.role == MessageRole::System)
            .unwrap_or(false);
        if !has_system && !self.system_prompt.trim().is_empty() {
            self.messages
                .insert(0, Message::system(self.system_prompt.clone()));
        }
    }
}
