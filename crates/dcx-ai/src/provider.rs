use std::fmt;

pub const LOCAL_PROVIDER: &str = "local";
pub const DEEPSEEK_PROVIDER: &str = "deepseek";

#[derive(Clone, PartialEq)]
/// Connection and sampling settings for one chat-completion backend.
///
/// Built once at startup and treated as read-only for the life of a session.
pub struct ProviderConfig {
    pub name: String,
    pub endpoint: String,
    pub credential: Option<String>,
    pub model_id: String,
    pub supports_tools: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ProviderConfig {
    /// OpenAI-compatible server running on the developer's machine.
    pub fn local(endpoint: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            name: LOCAL_PROVIDER.to_string(),
            endpoint: endpoint.into(),
            credential: None,
            model_id: model_id.into(),
            supports_tools: true,
            max_tokens: 4_096,
            temperature: 0.1,
        }
    }

    pub fn deepseek(
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            name: DEEPSEEK_PROVIDER.to_string(),
            endpoint: endpoint.into(),
            credential: Some(credential.into()),
            model_id: model_id.into(),
            supports_tools: true,
            max_tokens: 8_192,
            temperature: 0.0,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[redacted]"),
            )
            .field("model_id", &self.model_id)
            .field("supports_tools", &self.supports_tools)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}
