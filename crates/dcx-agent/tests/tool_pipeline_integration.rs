use std::path::PathBuf;

use dcx_agent::{
    aggregate_tool_results, extract_tool_calls, CommandRunner, CommandRunnerConfig,
    GatewayToolExecutor, SecurityMiddleware, ToolExecutor,
};
use dcx_sandbox::{
    spawn_sandbox_service, PathValidator, SandboxFs, SandboxGateway, SandboxGatewayConfig,
    SandboxServiceConfig, SandboxServiceHandle, DEFAULT_MAX_FILE_SIZE,
};
use tempfile::{tempdir, TempDir};

const KEY: &str = "pipeline-key";

async fn start(dry_run: bool) -> (TempDir, PathBuf, SandboxServiceHandle, GatewayToolExecutor) {
    let temp = tempdir().expect("tempdir");
    let root = std::fs::canonicalize(temp.path()).expect("canonical");
    let validator = PathValidator::with_default_extensions(&root).expect("validator");
    let service = spawn_sandbox_service(SandboxServiceConfig {
        bind: "127.0.0.1:0".to_string(),
        api_key: KEY.to_string(),
        fs: SandboxFs::new(validator, DEFAULT_MAX_FILE_SIZE),
    })
    .await
    .expect("service");
    let gateway = SandboxGateway::new(SandboxGatewayConfig {
        base_url: service.base_url(),
        api_key: KEY.to_string(),
        request_timeout_ms: 5_000,
    })
    .expect("gateway");
    let runner = CommandRunner::new(
        CommandRunnerConfig {
            working_dir: root.clone(),
            timeout_ms: 5_000,
            max_stream_bytes: 4_096,
        },
        SecurityMiddleware::new().expect("security"),
    );
    let executor = GatewayToolExecutor::new(gateway, runner, dry_run);
    (temp, root, service, executor)
}

#[tokio::test]
async fn integration_model_reply_drives_sandbox_operations_in_order() {
    let (_temp, root, service, executor) = start(false).await;
    let reply = r#"Let me set things up.
{"tool": "make_dir", "path": "pkg", "parents": true}
```json
{"tool_name": "write_file", "path": "pkg/main.py", "content": "print('hi')"}
```
{"function": "move_path", "source": "pkg/main.py", "destination": "pkg/app.py"}
{"tool": "list_dir", "path": "pkg"}
{"tool": "read_file", "path": "pkg/app.py"}"#;

    let extraction = extract_tool_calls(reply);
    assert_eq!(extraction.rejected().count(), 0);
    let mut results = Vec::new();
    for invocation in extraction.invocations() {
        results.push(executor.execute(invocation).await);
    }
    let names = results
        .iter()
        .map(|result| result.tool_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["make_dir", "write_file", "move_path", "list_dir", "read_file"]
    );
    assert!(results.iter().all(|result| result.success), "{results:?}");
    assert_eq!(results[4].output, "print('hi')");
    assert!(results[3].output.contains("app.py"));
    assert!(root.join("pkg/app.py").is_file());
    assert!(!root.join("pkg/main.py").exists());

    let aggregated = aggregate_tool_results(&results);
    assert!(aggregated.starts_with("Tool Results:\n[make_dir] ok ("));
    service.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn regression_escaping_and_blocked_calls_become_error_results() {
    let (_temp, _root, service, executor) = start(false).await;
    let reply = r#"{"tool": "read_file", "path": "../../etc/passwd"}
{"tool": "write_file", "path": "payload.exe", "content": "x"}
{"tool": "run_bash", "command": "rm -rf /"}"#;

    let extraction = extract_tool_calls(reply);
    let mut results = Vec::new();
    for invocation in extraction.invocations() {
        results.push(executor.execute(invocation).await);
    }
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|result| !result.success));
    let errors = results
        .iter()
        .map(|result| result.error.clone().unwrap_or_default())
        .collect::<Vec<_>>();
    assert!(errors[0].contains("path_security_error"), "{errors:?}");
    assert!(errors[1].contains("unsupported_file_type"), "{errors:?}");
    assert!(errors[2].contains("blocked dangerous pattern"), "{errors:?}");
    service.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn functional_stat_reports_existing_file() {
    let (_temp, root, service, executor) = start(false).await;
    std::fs::write(root.join("notes.md"), "abc").expect("write");
    let extraction = extract_tool_calls(r#"{"tool": "stat_path", "path": "notes.md"}"#);
    let invocation = extraction.invocations().next().expect("invocation");
    let result = executor.execute(invocation).await;
    assert!(result.success, "{result:?}");
    assert!(result.output.contains("\"size\": 3"), "{}", result.output);
    service.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn functional_dry_run_does_not_touch_sandbox() {
    let (_temp, root, service, executor) = start(true).await;
    let extraction =
        extract_tool_calls(r#"{"tool": "write_file", "path": "draft.md", "content": "x"}"#);
    let invocation = extraction.invocations().next().expect("invocation");
    let result = executor.execute(invocation).await;
    assert_eq!(result.output, "DRY RUN: would write_file draft.md");
    assert!(!root.join("draft.md").exists());
    service.shutdown().await.expect("shutdown");
}
