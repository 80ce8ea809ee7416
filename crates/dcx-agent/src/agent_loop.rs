//! Multi-turn tool loop: ask the model, run the tools it names, feed results back.
//!
//! One `handle` call is one user turn. The loop alternates between
//! `Thinking` and `ExecutingTools` until the model replies without naming a
//! tool (`FinalAnswer`), the user declines to continue at the ceiling, or the
//! ceiling is reached.

use std::sync::Arc;

use async_trait::async_trait;
use dcx_ai::{ChatRequest, LlmClient, Message, ProviderConfig};
use dcx_session::{PruningPolicy, SessionStore};
use thiserror::Error;
use tokio::sync::watch;

use crate::security_middleware::SecurityViolation;
use crate::tool_call_extractor::extract_tool_calls;
use crate::tool_executor::{aggregate_tool_results, ToolExecutor, ToolResult, INVALID_TOOL_CALL};


pub const DEFAULT_MAX_ITERATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `LoopPhase` values.
pub enum LoopPhase {
    Thinking,
    ExecutingTools,
    FinalAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Per-turn counters. Dropped when the turn completes.
pub struct LoopState {
    pub phase: LoopPhase,
    pub iteration_count: usize,
    pub max_iterations: usize,
    pub awaiting_user_confirmation: bool,
}

impl LoopState {
    fn new(max_iterations: usize) -> Self {
        Self {
            phase: LoopPhase::Thinking,
            iteration_count: 0,
            max_iterations,
            awaiting_user_confirmation: false,
        }
    }

    /// Only reachable once a tool turn has run; a first reply always gets through.
    fn at_confirmation_point(&self) -> bool {
        self.iteration_count > 0 && self.iteration_count + 1 == self.max_iterations
    }

    fn ceiling_reached(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }
}

#[derive(Debug, Error)]
/// Enumerates supported `AgentError` values.
pub enum AgentError {
    #[error("authentication failed for provider '{provider}': {message}")]
    Authentication { provider: String, message: String },
    #[error("model request to '{provider}' failed: {message}")]
    Transport { provider: String, message: String },
    #[error("Exceeded maximum tool calls ({0}).")]
    LoopLimitExceeded(usize),
    #[error("Operation cancelled by user.")]
    OperationCancelled,
    #[error(transparent)]
    SecurityBlocked(#[from] SecurityViolation),
    #[error("session persistence failed: {0}")]
    Session(String),
}

#[async_trait]
/// Asks the operator whether a long-running turn may continue.
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Declines every confirmation.
pub struct AutoDecline;

#[async_trait]
impl ConfirmationPrompt for AutoDecline {
    async fn confirm(&self, _message: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Public struct `AgentLoopConfig` used across dcx components.
pub struct AgentLoopConfig {
    pub max_iterations: usize,
    pub pruning: PruningPolicy,
    /// Automated execution: confirmations are declined without asking.
    pub non_interactive: bool,
    /// Confirmations are approved without asking. Ignored when non-interactive.
    pub auto_confirm: bool,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            pruning: PruningPolicy::default(),
            non_interactive: false,
            auto_confirm: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Final answer of a completed turn.
pub struct TurnOutcome {
    pub answer: String,
    pub tool_turns: usize,
}

/// Drives one provider's conversation.
pub struct AgentLoop {
    provider: ProviderConfig,
    client: Arc<dyn LlmClient>,
    executor: Arc<dyn ToolExecutor>,
    confirmation: Arc<dyn ConfirmationPrompt>,
    config: AgentLoopConfig,
    status: Option<watch::Sender<String>>,
}

impl AgentLoop {
    pub fn new(
        provider: ProviderConfig,
        client: Arc<dyn LlmClient>,
        executor: Arc<dyn ToolExecutor>,
        confirmation: Arc<dyn ConfirmationPrompt>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            provider,
            client,
            executor,
            confirmation,
            config,
            status: None,
        }
    }

    /// Publishes short status lines for a progress display.
    pub fn with_status_channel(mut self, status: watch::Sender<String>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    /// Runs one user turn against `session`, then prunes and saves it.
    pub async fn handle(
        &self,
        session: &mut SessionStore,
        user_input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        session.push(Message::user(user_input));
        let outcome = self.run_turn(session).await;

        let removed = session.prune(self.config.pruning);
        if removed > 0 {
            tracing::debug!(provider = %self.provider.name, removed, "pruned history after turn");
        }
        session
            .save()
            .map_err(|error| AgentError::Session(format!("{error:#}")))?;
        outcome
    }

    async fn run_turn(&self, session: &mut SessionStore) -> Result<TurnOutcome, AgentError> {
        let mut state = LoopState::new(self.config.max_iterations);

        loop {
            if state.ceiling_reached() {
                tracing::warn!(
                    provider = %self.provider.name,
                    iterations = state.iteration_count,
                    "tool loop reached its ceiling"
                );
                return Err(AgentError::LoopLimitExceeded(state.max_iterations));
            }
            if state.at_confirmation_point() {
                state.awaiting_user_confirmation = true;
                if !self.confirm_continue(&state).await {
                    tracing::warn!(
                        provider = %self.provider.name,
                        iterations = state.iteration_count,
                        "tool loop cancelled at confirmation point"
                    );
                    return Err(AgentError::OperationCancelled);
                }
                state.awaiting_user_confirmation = false;
            }

            state.phase = LoopPhase::Thinking;
            self.publish_status(format!("Thinking with {}...", self.provider.name));
            let reply = self.request_completion(session.messages()).await?;

            let extraction = extract_tool_calls(&reply);
            if !extraction.is_tool_turn() {
                state.phase = LoopPhase::FinalAnswer;
                session.push(Message::assistant_text(reply.clone()));
                return Ok(TurnOutcome {
                    answer: reply,
                    tool_turns: state.iteration_count,
                });
            }

            state.phase = LoopPhase::ExecutingTools;
            let mut results = Vec::with_capacity(extraction.calls.len());
            for call in &extraction.calls {
                match call {
                    Ok(invocation) => {
                        self.publish_status(format!("Using tool: {}...", invocation.tool_name));
                        results.push(self.executor.execute(invocation).await);
                    }
                    Err(error) => {
                        results.push(ToolResult::error(INVALID_TOOL_CALL, error.feedback(), 0));
                    }
                }
            }

            session.push(Message::assistant_text(reply));
            session.push(Message::user(aggregate_tool_results(&results)));
            state.iteration_count += 1;
        }
    }

    async fn confirm_continue(&self, state: &LoopState) -> bool {
        if self.config.non_interactive {
            return false;
        }
        if self.config.auto_confirm {
            return true;
        }
        let message = format!(
            "The agent has used its tools {} times and may be in a loop. Allow it to continue?",
            state.iteration_count
        );
        self.confirmation.confirm(&message).await
    }

    async fn request_completion(&self, messages: &[Message]) -> Result<String, AgentError> {
        let request = ChatRequest {
            model: self.provider.model_id.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(self.provider.max_tokens),
            temperature: Some(self.provider.temperature),
        };
        match self.client.complete(request).await {
            Ok(response) => Ok(response.message.content),
            Err(error) if error.is_authentication() => {
                tracing::warn!(provider = %self.provider.name, %error, "model rejected credentials");
                Err(AgentError::Authentication {
                    provider: self.provider.name.clone(),
                    message: error.to_string(),
                })
            }
            Err(error) => {
                tracing::warn!(provider = %self.provider.name, %error, "model request failed");
                Err(AgentError::Transport {
                    provider: self.provider.name.clone(),
                    message: error.to_string(),
                })
            }
        }
    }

    fn publish_status(&self, status: String) {
        if let Some(sender) = &self.status {
            sender.send_replace(status);
        }
    }
}
