//! Turns free-form model replies into validated tool invocations.
//!
//! Candidates are collected from three sources in order: balanced-brace
//! objects anywhere in the text, fenced code blocks, then standalone JSON
//! lines. Duplicates keep their first position. A candidate that fails to
//! parse gets exactly one repair attempt which escapes raw control characters
//! inside string literals. The repair is heuristic and lossy; it targets only
//! that shape.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tool_catalogue::{find_tool, known_tool_names, TOOL_NAME_KEYS};


#[derive(Debug, Clone, PartialEq)]
/// A tool call taken from model text. Immutable once validated.
pub struct ToolInvocation {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
    pub raw_source_text: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Enumerates supported `ExtractionError` values.
pub enum ExtractionError {
    #[error("invalid {tool_name} call: {message}")]
    Validation {
        tool_name: String,
        message: String,
        required: Vec<String>,
        optional: Vec<String>,
        example: String,
    },
    #[error("unknown tool '{name}'. Available tools: {}", known.join(", "))]
    UnknownTool { name: String, known: Vec<String> },
    #[error("invalid tool call JSON: {0}")]
    Parse(String),
}

impl ExtractionError {
    /// Actionable text relayed back to the model.
    pub fn feedback(&self) -> String {
        match self {
            Self::Validation {
                required,
                optional,
                example,
                ..
            } => {
                let mut feedback = format!("{self}\nRequired parameters: {required:?}");
                if !optional.is_empty() {
                    feedback.push_str(&format!("\nOptional parameters: {optional:?}"));
                }
                feedback.push_str(&format!("\nExample: {example}"));
                feedback
            }
            Self::UnknownTool { .. } => format!(
                "{self}\nExample: {{\"tool\": \"read_file\", \"path\": \"config.py\"}}"
            ),
            Self::Parse(_) => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Every tool-naming candidate in a reply, valid or not, in textual order.
pub struct Extraction {
    pub calls: Vec<Result<ToolInvocation, ExtractionError>>,
}

impl Extraction {
    pub fn invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.calls.iter().filter_map(|call| call.as_ref().ok())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ExtractionError> {
        self.calls.iter().filter_map(|call| call.as_ref().err())
    }

    /// True when at least one candidate named a tool.
    pub fn is_tool_turn(&self) -> bool {
        !self.calls.is_empty()
    }
}

pub fn extract_tool_calls(text: &str) -> Extraction {
    let mut extraction = Extraction::default();
    for candidate in candidate_json_objects(text) {
        match parse_candidate(&candidate) {
            Ok(Some(invocation)) => extraction.calls.push(Ok(invocation)),
            Ok(None) => {}
            Err(ExtractionError::Parse(reason)) => {
                tracing::debug!(%reason, "discarding unparseable tool call candidate");
            }
            Err(error) => {
                tracing::debug!(%error, "rejected tool call candidate");
                extraction.calls.push(Err(error));
            }
        }
    }
    extraction
}

/// Collects JSON object candidates, deduplicated in first-seen order.
pub fn candidate_json_objects(text: &str) -> Vec<String> {
    let mut candidates = balanced_brace_objects(text);
    candidates.extend(fenced_json_blocks(text));
    candidates.extend(
        text.lines()
            .map(str::trim)
            .filter(|line| line.starts_with('{') && line.ends_with('}'))
            .map(str::to_string),
    );

    let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

fn balanced_brace_objects(text: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let mut cursor = 0usize;
    while let Some(open_rel) = text[cursor..].find('{') {
        let open = cursor + open_rel;
        match matching_close_brace(text, open) {
            Some(close) => {
                objects.push(text[open..=close].trim().to_string());
                cursor = close + 1;
            }
            // A stray `{` in prose must not swallow the objects after it.
            None => cursor = open + 1,
        }
    }
    objects
}

/// Byte index of the `}` closing the object that opens at `open`.
fn matching_close_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[open..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn fenced_json_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    while let Some(open_rel) = text[cursor..].find("```") {
        let open = cursor + open_rel;
        let after_open = &text[open + 3..];
        let header_end_rel = after_open.find('\n').unwrap_or(after_open.len());
        let header = after_open[..header_end_rel].trim();
        let block_start = if header.starts_with('{') {
            open + 3
        } else if header_end_rel < after_open.len() {
            open + 3 + header_end_rel + 1
        } else {
            open + 3 + header_end_rel
        };
        let Some(close_rel) = text[block_start..].find("```") else {
            break;
        };
        let close = block_start + close_rel;
        cursor = close + 3;

        if !(header.is_empty() || header.eq_ignore_ascii_case("json") || header.starts_with('{')) {
            continue;
        }
        let block = text[block_start..close].trim();
        if block.starts_with('{') && block.ends_with('}') {
            blocks.push(block.to_string());
        }
    }
    blocks
}

/// Parses one candidate. `Ok(None)` means valid JSON that names no tool.
pub fn parse_candidate(candidate: &str) -> Result<Option<ToolInvocation>, ExtractionError> {
    let value = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(first_error) => {
            let Some(repaired) = repair_control_characters(candidate) else {
                return Err(ExtractionError::Parse(first_error.to_string()));
            };
            serde_json::from_str::<Value>(&repaired)
                .map_err(|error| ExtractionError::Parse(error.to_string()))?
        }
    };
    let Value::Object(mut object) = value else {
        return Ok(None);
    };

    let Some(name_value) = TOOL_NAME_KEYS.iter().find_map(|key| object.get(*key).cloned()) else {
        return Ok(None);
    };
    for key in TOOL_NAME_KEYS {
        object.remove(key);
    }

    let tool_name = match name_value {
        Value::String(name) if !name.trim().is_empty() => name.trim().to_string(),
        other => {
            return Err(ExtractionError::UnknownTool {
                name: other.to_string(),
                known: known_tool_names(),
            })
        }
    };
    let Some(spec) = find_tool(&tool_name) else {
        return Err(ExtractionError::UnknownTool {
            name: tool_name,
            known: known_tool_names(),
        });
    };

    let missing = spec
        .required
        .iter()
        .filter(|key| !has_value(object.get(**key)))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ExtractionError::Validation {
            tool_name,
            message: format!("missing required parameter(s): {}", missing.join(", ")),
            required: spec.required.iter().map(|key| key.to_string()).collect(),
            optional: spec.optional.iter().map(|key| key.to_string()).collect(),
            example: spec.example.to_string(),
        });
    }

    Ok(Some(ToolInvocation {
        tool_name,
        parameters: object,
        raw_source_text: candidate.to_string(),
    }))
}

fn has_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(_) => true,
    }
}

/// Escapes raw control characters inside string literals.
///
/// Returns `None` when nothing needed escaping.
pub fn repair_control_characters(candidate: &str) -> Option<String> {
    let mut repaired = String::with_capacity(candidate.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut changed = false;

    for ch in candidate.chars() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            repaired.push(ch);
            continue;
        }
        if escaped {
            escaped = false;
            repaired.push(ch);
            continue;
        }
        match ch {
            '\\' => {
                escaped = true;
                repaired.push(ch);
            }
            '"' => {
                in_string = false;
                repaired.push(ch);
            }
            '\n' => {
                changed = true;
                repaired.push_str("\\n");
            }
            '\r' => {
                changed = true;
                repaired.push_str("\\r");
            }
            '\t' => {
                changed = true;
                repaired.push_str("\\t");
            }
            control if (control as u32) < 0x20 => {
                changed = true;
                repaired.push_str(&format!("\\u{:04x}", control as u32));
            }
            other => repaired.push(other),
        }
    }

    changed.then_some(repaired)
}
