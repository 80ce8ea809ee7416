//! Executes validated tool invocations and materializes every outcome as data.

use std::time::Instant;

use async_trait::async_trait;
use dcx_sandbox::SandboxGateway;
use serde_json::{Map, Value};

use crate::local_runner::CommandRunner;
use crate::tool_call_extractor::ToolInvocation;
use crate::tool_catalogue::find_tool;

/// Tool name used for calls rejected during extraction.
pub const INVALID_TOOL_CALL: &str = "invalid_tool_call";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of one tool invocation. Never raised, always fed back.
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, output: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: output.into(),
            error: None,
            elapsed_ms,
        }
    }

    pub fn error(tool_name: impl Into<String>, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            elapsed_ms,
        }
    }

    pub fn render(&self) -> String {
        if self.success {
            format!(
                "[{}] ok ({}ms):\n{}",
                self.tool_name, self.elapsed_ms, self.output
            )
        } else {
            format!(
                "[{}] error ({}ms): {}",
                self.tool_name,
                self.elapsed_ms,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Builds the single results message appended after a tool turn.
pub fn aggregate_tool_results(results: &[ToolResult]) -> String {
    let rendered = results
        .iter()
        .map(ToolResult::render)
        .collect::<Vec<_>>()
        .join("\n");
    format!("Tool Results:\n{rendered}")
}

#[async_trait]
/// Trait contract for `ToolExecutor` behavior.
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolResult;
}

/// Reads a parameter as text. Non-string values render as their JSON text.
pub fn string_param(parameters: &Map<String, Value>, key: &str) -> Option<String> {
    match parameters.get(key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

pub fn bool_param(parameters: &Map<String, Value>, key: &str) -> bool {
    match parameters.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(number)) => number.as_i64().is_some_and(|value| value != 0),
        _ => false,
    }
}

/// Routes file tools through the sandbox gateway and `run_bash` through the local runner.
pub struct GatewayToolExecutor {
    gateway: SandboxGateway,
    runner: CommandRunner,
    dry_run: bool,
}

impl GatewayToolExecutor {
    pub fn new(gateway: SandboxGateway, runner: CommandRunner, dry_run: bool) -> Self {
        Self {
            gateway,
            runner,
            dry_run,
        }
    }

    pub fn gateway(&self) -> &SandboxGateway {
        &self.gateway
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> Result<String, String> {
        let params = &invocation.parameters;
        let path = || string_param(params, "path").unwrap_or_default();
        match invocation.tool_name.as_str() {
            "read_file" => {
                let reply = self.gateway.read_file(&path()).await;
                gateway_field(&reply, "content")
            }
            "write_file" => {
                let target = path();
                let content = string_param(params, "content").unwrap_or_default();
                let reply = self.gateway.write_file(&target, &content).await;
                gateway_status(&reply)?;
                Ok(format!("Wrote {} bytes to {target}", content.len()))
            }
            "list_dir" => {
                let target = string_param(params, "path").unwrap_or_else(|| ".".to_string());
                let reply = self.gateway.list_dir(&target).await;
                gateway_status(&reply)?;
                Ok(render_listing(&target, &reply["result"]))
            }
            "delete_path" => {
                let target = path();
                let reply = self
                    .gateway
                    .delete_path(&target, bool_param(params, "recursive"))
                    .await;
                gateway_status(&reply)?;
                Ok(format!("Deleted {target}"))
            }
            "move_path" => {
                let reply = self
                    .gateway
                    .move_path(
                        &string_param(params, "source").unwrap_or_default(),
                        &string_param(params, "destination").unwrap_or_default(),
                        bool_param(params, "overwrite"),
                    )
                    .await;
                gateway_field(&reply, "message")
            }
            "make_dir" => {
                let reply = self
                    .gateway
                    .make_dir(
                        &path(),
                        bool_param(params, "parents"),
                        bool_param(params, "exist_ok"),
                    )
                    .await;
                gateway_field(&reply, "message")
            }
            "stat_path" => {
                let reply = self.gateway.stat_path(&path()).await;
                gateway_status(&reply)?;
                serde_json::to_string_pretty(&reply["result"]).map_err(|error| error.to_string())
            }
            "run_bash" => {
                let command = string_param(params, "command").unwrap_or_default();
                let output = self
                    .runner
                    .run(&command)
                    .await
                    .map_err(|error| error.to_string())?;
                Ok(output.render())
            }
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

#[async_trait]
impl ToolExecutor for GatewayToolExecutor {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolResult {
        let started = Instant::now();
        let tool_name = invocation.tool_name.as_str();

        if self.dry_run && find_tool(tool_name).is_some_and(|spec| spec.mutating) {
            let target = dry_run_target(invocation);
            tracing::info!(tool = tool_name, %target, "dry run skipped mutating tool");
            return ToolResult::ok(tool_name, format!("DRY RUN: would {tool_name} {target}"), 0);
        }

        let outcome = self.dispatch(invocation).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(tool = tool_name, elapsed_ms, ok = outcome.is_ok(), "executed tool");
        match outcome {
            Ok(output) => ToolResult::ok(tool_name, output, elapsed_ms),
            Err(error) => ToolResult::error(tool_name, error, elapsed_ms),
        }
    }
}

fn dry_run_target(invocation: &ToolInvocation) -> String {
    let params = &invocation.parameters;
    match invocation.tool_name.as_str() {
        "move_path" => format!(
            "{} -> {}",
            string_param(params, "source").unwrap_or_default(),
            string_param(params, "destination").unwrap_or_default()
        ),
        "run_bash" => string_param(params, "command").unwrap_or_default(),
        _ => string_param(params, "path").unwrap_or_default(),
    }
}

fn gateway_status(reply: &Value) -> Result<(), String> {
    match reply.get("error") {
        Some(error) => Err(error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())),
        None => Ok(()),
    }
}

fn gateway_field(reply: &Value, field: &str) -> Result<String, String> {
    gateway_status(reply)?;
    reply
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("sandbox reply missing '{field}'"))
}

fn render_listing(path: &str, listing: &Value) -> String {
    let names = |key: &str| {
        listing[key]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    };
    format!(
        "Directory listing for '{path}':\nFiles: {}\nDirectories: {}",
        names("files"),
        names("directories")
    )
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};
    use tempfile::tempdir;

    use super::*;
    use crate::{CommandRunnerConfig, SecurityMiddleware};
    use dcx_sandbox::SandboxGatewayConfig;

    fn invocation(value: serde_json::Value) -> ToolInvocation {
        let Value::Object(mut parameters) = value else {
            panic!("object expected");
        };
        let tool_name = parameters
            .remove("tool")
            .and_then(|name| name.as_str().map(str::to_string))
            .expect("tool");
        ToolInvocation {
            tool_name,
            parameters,
            raw_source_text: String::new(),
        }
    }

    fn offline_executor(dir: &std::path::Path, dry_run: bool) -> GatewayToolExecutor {
        let gateway = SandboxGateway::new(SandboxGatewayConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "k".to_string(),
            request_timeout_ms: 500,
        })
        .expect("gateway");
        let runner = CommandRunner::new(
            CommandRunnerConfig {
                working_dir: dir.to_path_buf(),
                timeout_ms: 5_000,
                max_stream_bytes: 4_096,
            },
            SecurityMiddleware::new().expect("security"),
        );
        GatewayToolExecutor::new(gateway, runner, dry_run)
    }

    #[test]
    fn unit_results_render_and_aggregate_in_order() {
        let results = vec![
            ToolResult::ok("read_file", "hello", 3),
            ToolResult::error("write_file", "path_security_error: nope", 1),
        ];
        assert_eq!(
            aggregate_tool_results(&results),
            "Tool Results:\n[read_file] ok (3ms):\nhello\n[write_file] error (1ms): path_security_error: nope"
        );
    }

    #[test]
    fn unit_params_render_non_strings_as_json() {
        let mut params = Map::new();
        params.insert("path".to_string(), json!(42));
        params.insert("recursive".to_string(), json!("true"));
        assert_eq!(string_param(&params, "path").as_deref(), Some("42"));
        assert!(bool_param(&params, "recursive"));
        assert!(!bool_param(&params, "overwrite"));
    }

    #[tokio::test]
    async fn functional_dry_run_skips_mutating_tools() {
        let temp = tempdir().expect("tempdir");
        let executor = offline_executor(temp.path(), true);

        let result = executor
            .execute(&invocation(json!({"tool": "run_bash", "command": "touch made.txt"})))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "DRY RUN: would run_bash touch made.txt");
        assert!(!temp.path().join("made.txt").exists());

        let result = executor
            .execute(&invocation(
                json!({"tool": "move_path", "source": "a", "destination": "b"}),
            ))
            .await;
        assert_eq!(result.output, "DRY RUN: would move_path a -> b");
    }

    #[tokio::test]
    async fn regression_unreachable_gateway_becomes_error_result() {
        let temp = tempdir().expect("tempdir");
        let executor = offline_executor(temp.path(), true);
        let result = executor
            .execute(&invocation(json!({"tool": "read_file", "path": "a.txt"})))
            .await;
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .is_some_and(|error| error.starts_with("sandbox read")));
    }

    #[tokio::test]
    async fn functional_run_bash_executes_locally() {
        let temp = tempdir().expect("tempdir");
        let executor = offline_executor(temp.path(), false);
        let result = executor
            .execute(&invocation(json!({"tool": "run_bash", "command": "printf hi"})))
            .await;
        assert!(result.success, "{result:?}");
        assert!(result.output.contains("STDOUT:\nhi\n"));

        let blocked = executor
            .execute(&invocation(json!({"tool": "run_bash", "command": "chmod 777 x"})))
            .await;
        assert_eq!(
            blocked.error.as_deref(),
            Some(r"blocked dangerous pattern: chmod\s+777")
        );
    }
}
