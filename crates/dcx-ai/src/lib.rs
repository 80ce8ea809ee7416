//! Model-facing data types and the OpenAI-compatible chat client.
mod openai;
mod provider;
mod retry;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use provider::{ProviderConfig, DEEPSEEK_PROVIDER, LOCAL_PROVIDER};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, DcxAiError, LlmClient, Message, MessageRole, ToolCall,
};
