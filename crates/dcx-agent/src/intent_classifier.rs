//! Intent classification for direct filesystem commands.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Intent plus the entities it needs.
pub enum Intent {
    ChangeDirectory { path: String },
    ListDir { path: String },
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    DeletePath { path: String },
    RunBash { command: String },
    Clarify { reason: String },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeDirectory { .. } => "change_directory",
            Self::ListDir { .. } => "list_dir",
            Self::ReadFile { .. } => "read_file",
            Self::WriteFile { .. } => "write_file",
            Self::DeletePath { .. } => "delete_path",
            Self::RunBash { .. } => "run_bash",
            Self::Clarify { .. } => "clarify",
        }
    }

    fn clarify(reason: impl Into<String>) -> Self {
        Self::Clarify {
            reason: reason.into(),
        }
    }
}

#[async_trait]
/// Trait contract for `IntentClassifier` behavior.
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Intent;
}

#[derive(Debug, Clone, Copy, Default)]
/// Rule-based classifier keyed on the leading verb.
pub struct KeywordIntentClassifier;

const FILLER_WORDS: [&str; 9] = ["a", "an", "the", "new", "file", "me", "directory", "folder", "in"];

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, text: &str) -> Intent {
        classify_keywords(text)
    }
}

pub fn classify_keywords(text: &str) -> Intent {
    let text = text.trim();
    if text.is_empty() {
        return Intent::clarify("No command given.");
    }
    let (verb, rest) = match text.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb.to_ascii_lowercase(), rest.trim()),
        None => (text.to_ascii_lowercase(), ""),
    };

    if matches!(verb.as_str(), "run" | "execute" | "exec") {
        return if rest.is_empty() {
            Intent::clarify("No command specified for execution.")
        } else {
            Intent::RunBash {
                command: rest.to_string(),
            }
        };
    }

    let words = match shell_words::split(rest) {
        Ok(words) => words,
        Err(error) => return Intent::clarify(format!("Could not parse the command: {error}.")),
    };
    let mut operands = words
        .iter()
        .map(String::as_str)
        .skip_while(|word| FILLER_WORDS.contains(&word.to_ascii_lowercase().as_str()));

    match verb.as_str() {
        "cd" | "chdir" | "enter" => Intent::ChangeDirectory {
            path: operands.next().unwrap_or(".").to_string(),
        },
        "ls" | "list" => {
            let path = operands
                .find(|word| !matches!(word.to_ascii_lowercase().as_str(), "files" | "contents" | "of" | "in"))
                .unwrap_or(".");
            Intent::ListDir {
                path: path.to_string(),
            }
        }
        "read" | "show" | "cat" | "open" | "display" | "print" => match operands.next() {
            Some(path) => Intent::ReadFile {
                path: path.to_string(),
            },
            None => Intent::clarify("No file path specified for reading."),
        },
        "write" | "create" | "make" => {
            let Some(path) = operands.next() else {
                return Intent::clarify("The filename is missing.");
            };
            let content = operands
                .skip_while(|word| matches!(word.to_ascii_lowercase().as_str(), "with" | "content" | "containing" | "text"))
                .collect::<Vec<_>>()
                .join(" ");
            Intent::WriteFile {
                path: path.to_string(),
                content,
            }
        }
        "delete" | "remove" | "rm" => match operands.next() {
            Some(path) => Intent::DeletePath {
                path: path.to_string(),
            },
            None => Intent::clarify("No path specified for deletion."),
        },
        _ => Intent::clarify(format!("Could not understand the command '{text}'.")),
    }
}
