use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageRole` values.
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Native tool call attached to an assistant message.
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One conversation entry, persisted verbatim in session files.
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(MessageRole::User, text)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, text)
    }

    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::text(MessageRole::Assistant, text)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text(MessageRole::Tool, text)
        }
    }

    pub fn text_content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `ChatRequest` used across dcx components.
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
/// Public struct `ChatUsage` used across dcx components.
pub struct ChatUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `ChatResponse` used across dcx components.
pub struct ChatResponse {
    pub message: Message,
    pub finish_reason: Option<String>,
    pub usage: ChatUsage,
}

#[derive(Debug, Error)]
/// Enumerates supported `DcxAiError` values.
pub enum DcxAiError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl DcxAiError {
    /// True when the provider rejected our credentials rather than failing in transit.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::MissingApiKey | Self::HttpStatus { status: 401 | 403, .. }
        )
    }
}

#[async_trait]
/// Trait contract for `LlmClient` behavior.
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, DcxAiError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DcxAiError, Message, MessageRole, ToolCall};

    #[test]
    fn unit_plain_messages_serialize_without_tool_fields() {
        let encoded = serde_json::to_value(Message::user("hello")).expect("encode");
        assert_eq!(encoded, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn unit_tool_messages_round_trip_pairing_fields() {
        let assistant = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "read_file".to_string(),
                arguments: json!({"path": "a.txt"}),
            }],
        );
        let tool = Message::tool_result("call_1", "contents");
        let raw = serde_json::to_string(&vec![assistant.clone(), tool.clone()]).expect("encode");
        let decoded: Vec<Message> = serde_json::from_str(&raw).expect("decode");
        assert_eq!(decoded, vec![assistant, tool]);
        assert_eq!(decoded[1].role, MessageRole::Tool);
        assert_eq!(decoded[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn unit_authentication_classification_covers_401_and_403() {
        for status in [401_u16, 403] {
            let error = DcxAiError::HttpStatus {
                status,
                body: String::new(),
            };
            assert!(error.is_authentication());
        }
        let server_error = DcxAiError::HttpStatus {
            status: 500,
            body: String::new(),
        };
        assert!(!server_error.is_authentication());
    }
}
