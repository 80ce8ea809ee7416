//! Ordered routing of REPL input to its handler.
//!
//! `SecurityMiddleware` runs before any route. Routes are evaluated in
//! priority order and the first whose predicate accepts the input handles it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};

use crate::agent_loop::{AgentError, AgentLoop};
use crate::intent_classifier::{Intent, IntentClassifier};
use crate::security_middleware::SecurityMiddleware;
use crate::tool_call_extractor::ToolInvocation;
use crate::tool_executor::{GatewayToolExecutor, ToolExecutor};
use dcx_session::SessionStore;


const FILESYSTEM_PREFIX: &str = "use your tools";
const BUILD_CONTEXT_FLAG: &str = "--build-context";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Commands the REPL handles itself, before routing.
pub enum BuiltinCommand {
    Exit,
    ClearAll,
    ClearProvider(String),
    BuildContext,
}

pub fn parse_builtin(input: &str) -> Option<BuiltinCommand> {
    let normalized = input.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "exit" | "quit" => return Some(BuiltinCommand::Exit),
        "clear" => return Some(BuiltinCommand::ClearAll),
        BUILD_CONTEXT_FLAG => return Some(BuiltinCommand::BuildContext),
        _ => {}
    }
    let (tag, rest) = normalized.split_once(char::is_whitespace)?;
    let provider = tag.strip_prefix('@').filter(|name| !name.is_empty())?;
    match rest.trim() {
        "clear" => Some(BuiltinCommand::ClearProvider(provider.to_string())),
        BUILD_CONTEXT_FLAG => Some(BuiltinCommand::BuildContext),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `RouteHandler` values.
pub enum RouteHandler {
    Filesystem,
    Provider,
    DefaultProvider,
    NotFound,
}

#[derive(Clone, Copy)]
/// One `{predicate, handler}` pair in the routing table.
pub struct Route {
    pub name: &'static str,
    pub predicate: fn(&str, &CommandRouter) -> bool,
    pub handler: RouteHandler,
}

pub fn default_routes() -> Vec<Route> {
    vec![
        Route {
            name: "filesystem",
            predicate: |input, _| is_filesystem_command(input),
            handler: RouteHandler::Filesystem,
        },
        Route {
            name: "provider",
            predicate: |input, router| {
                provider_tag(input).is_some_and(|(name, _)| router.providers.contains_key(name))
            },
            handler: RouteHandler::Provider,
        },
        Route {
            name: "default_provider",
            predicate: |_, router| router.default_provider.is_some(),
            handler: RouteHandler::DefaultProvider,
        },
        Route {
            name: "not_found",
            predicate: |_, _| true,
            handler: RouteHandler::NotFound,
        },
    ]
}

fn is_filesystem_command(input: &str) -> bool {
    input
        .get(..FILESYSTEM_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(FILESYSTEM_PREFIX))
}

fn provider_tag(input: &str) -> Option<(&str, &str)> {
    let (tag, rest) = input
        .split_once(char::is_whitespace)
        .unwrap_or((input, ""));
    let name = tag.strip_prefix('@').filter(|name| !name.is_empty())?;
    Some((name, rest.trim()))
}

/// A provider's agent loop together with its session.
pub struct ProviderRuntime {
    pub agent: AgentLoop,
    pub session: SessionStore,
}

/// Routes REPL input to the filesystem handler or a provider's agent loop.
pub struct CommandRouter {
    routes: Vec<Route>,
    security: SecurityMiddleware,
    classifier: Arc<dyn IntentClassifier>,
    executor: Arc<GatewayToolExecutor>,
    providers: BTreeMap<String, ProviderRuntime>,
    default_provider: Option<String>,
    working_dir: PathBuf,
}

impl CommandRouter {
    pub fn new(
        security: SecurityMiddleware,
        classifier: Arc<dyn IntentClassifier>,
        executor: Arc<GatewayToolExecutor>,
        providers: Vec<ProviderRuntime>,
        default_provider: &str,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|runtime| (runtime.agent.provider().name.clone(), runtime))
            .collect::<BTreeMap<_, _>>();
        let default_provider = if providers.contains_key(default_provider) {
            Some(default_provider.to_string())
        } else {
            tracing::warn!(provider = default_provider, "default provider is not enabled");
            None
        };
        Self {
            routes: default_routes(),
            security,
            classifier,
            executor,
            providers,
            default_provider,
            working_dir: PathBuf::new(),
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Directory the filesystem route resolves paths against, relative to the sandbox root.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn route_for(&self, input: &str) -> &'static str {
        self.select_route(input.trim()).0
    }

    fn select_route(&self, input: &str) -> (&'static str, RouteHandler) {
        self.routes
            .iter()
            .find(|route| (route.predicate)(input, self))
            .map(|route| (route.name, route.handler))
            .unwrap_or(("not_found", RouteHandler::NotFound))
    }

    /// Runs one user command and returns the text to show.
    pub async fn dispatch(&mut self, input: &str) -> Result<String, AgentError> {
        let input = input.trim();
        if let Err(violation) = self.security.check(input) {
            tracing::warn!(%violation, "security middleware blocked command");
            return Err(violation.into());
        }

        let (route, handler) = self.select_route(input);
        tracing::debug!(route, "routing command");
        match handler {
            RouteHandler::Filesystem => {
                let text = input[FILESYSTEM_PREFIX.len()..].trim().to_string();
                Ok(self.handle_filesystem(&text).await)
            }
            RouteHandler::Provider => {
                let Some((name, text)) = provider_tag(input) else {
                    return Ok(format!("Command not found: {input}"));
                };
                let name = name.to_string();
                self.handle_provider(&name, text).await
            }
            RouteHandler::DefaultProvider => {
                let Some(name) = self.default_provider.clone() else {
                    return Ok(format!("Command not found: {input}"));
                };
                self.handle_provider(&name, input).await
            }
            RouteHandler::NotFound => Ok(format!("Command not found: {input}")),
        }
    }

    async fn handle_provider(&mut self, name: &str, text: &str) -> Result<String, AgentError> {
        let prompt = self.include_file_context(text).await;
        let Some(runtime) = self.providers.get_mut(name) else {
            return Ok(format!("Command not found: @{name} {text}"));
        };
        let outcome = runtime.agent.handle(&mut runtime.session, &prompt).await?;
        Ok(outcome.answer)
    }

    /// Prepends the content of each `@path` word that is not a provider tag.
    async fn include_file_context(&self, text: &str) -> String {
        let mut blocks = Vec::new();
        for word in text.split_whitespace() {
            let Some(path) = word.strip_prefix('@') else {
                continue;
            };
            let path = path.trim_end_matches([',', ';', ':', '!', '?', ')']);
            if path.is_empty() || self.providers.contains_key(path) {
                continue;
            }
            let scoped = self.scoped_path(path);
            let reply = self.executor.gateway().read_file(&scoped).await;
            match reply.get("content").and_then(Value::as_str) {
                Some(content) => blocks.push(format!("File: {path}\n```\n{content}\n```")),
                None => {
                    let error = reply
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unreadable");
                    tracing::warn!(path, error, "skipping @file reference");
                }
            }
        }
        if blocks.is_empty() {
            return text.to_string();
        }
        format!("{}\n\n{text}", blocks.join("\n\n"))
    }

    async fn handle_filesystem(&mut self, text: &str) -> String {
        let intent = self.classifier.classify(text).await;
        tracing::debug!(intent = intent.name(), "classified filesystem command");
        let (tool_name, parameters) = match intent {
            Intent::Clarify { reason } => return format!("Clarification needed: {reason}"),
            Intent::ChangeDirectory { path } => return self.change_directory(&path),
            Intent::RunBash { command } => return self.run_in_working_dir(&command).await,
            Intent::ListDir { path } => ("list_dir", json!({"path": self.scoped_path(&path)})),
            Intent::ReadFile { path } => ("read_file", json!({"path": self.scoped_path(&path)})),
            Intent::WriteFile { path, content } => (
                "write_file",
                json!({"path": self.scoped_path(&path), "content": content}),
            ),
            Intent::DeletePath { path } => (
                "delete_path",
                json!({"path": self.scoped_path(&path), "recursive": true}),
            ),
        };
        let Value::Object(parameters) = parameters else {
            return "Error: malformed tool parameters".to_string();
        };
        let invocation = ToolInvocation {
            tool_name: tool_name.to_string(),
            parameters,
            raw_source_text: text.to_string(),
        };
        let result = self.executor.execute(&invocation).await;
        if result.success {
            result.output
        } else {
            format!(
                "Error: {}",
                result.error.unwrap_or_else(|| "unknown error".to_string())
            )
        }
    }

    async fn run_in_working_dir(&self, command: &str) -> String {
        if self.executor.dry_run() {
            return format!("DRY RUN: would run_bash {command}");
        }
        let runner = self.executor.runner();
        let cwd = runner.working_dir().join(&self.working_dir);
        match runner.run_in(command, &cwd).await {
            Ok(output) => output.render(),
            Err(error) => format!("Error: {error}"),
        }
    }

    fn change_directory(&mut self, path: &str) -> String {
        let root = self.executor.runner().working_dir();
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let Ok(target) = std::fs::canonicalize(root.join(&self.working_dir).join(path)) else {
            return format!("Error: Not a directory: {path}");
        };
        let Ok(relative) = target.strip_prefix(&root) else {
            tracing::warn!(path, "refused cd outside the project root");
            return "Error: Cannot 'cd' outside the project root.".to_string();
        };
        if !target.is_dir() {
            return format!("Error: Not a directory: {path}");
        }
        self.working_dir = relative.to_path_buf();
        format!("Current directory: {}", display_relative(&self.working_dir))
    }

    fn scoped_path(&self, path: &str) -> String {
        if self.working_dir.as_os_str().is_empty() {
            return path.to_string();
        }
        self.working_dir.join(path).to_string_lossy().into_owned()
    }

    pub fn clear_session(&mut self, provider: &str) -> Result<bool> {
        let Some(runtime) = self.providers.get_mut(provider) else {
            return Ok(false);
        };
        runtime.session.clear()?;
        Ok(true)
    }

    pub fn clear_all_sessions(&mut self) -> Result<()> {
        for runtime in self.providers.values_mut() {
            runtime.session.clear()?;
        }
        Ok(())
    }

    pub fn save_sessions(&mut self) -> Result<()> {
        for runtime in self.providers.values_mut() {
            runtime.session.save()?;
        }
        Ok(())
    }
}

fn display_relative(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.display().to_string()
    }
}
