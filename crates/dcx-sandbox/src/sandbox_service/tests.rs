//! Sandbox service tests grouped by endpoint behavior.
use std::path::Path;

use reqwest::{Client, StatusCode};
use tempfile::tempdir;

use super::*;
use crate::{PathValidator, DEFAULT_MAX_FILE_SIZE};

const TEST_KEY: &str = "test-sandbox-key";

async fn start(root: &Path) -> SandboxServiceHandle {
    spawn_sandbox_service(SandboxServiceConfig {
        bind: "127.0.0.1:0".to_string(),
        api_key: TEST_KEY.to_string(),
        fs: SandboxFs::new(
            PathValidator::with_default_extensions(root).expect("validator"),
            DEFAULT_MAX_FILE_SIZE,
        ),
    })
    .await
    .expect("spawn service")
}

async fn post_json(handle: &SandboxServiceHandle, path: &str, body: Value) -> (StatusCode, Value) {
    let response = Client::new()
        .post(format!("{}{path}", handle.base_url()))
        .header(API_KEY_HEADER, TEST_KEY)
        .json(&body)
        .send()
        .await
        .expect("send");
    let status = response.status();
    (status, response.json::<Value>().await.expect("json body"))
}

#[tokio::test]
async fn integration_write_then_read_round_trips_through_http() {
    let temp = tempdir().expect("tempdir");
    let handle = start(temp.path()).await;

    let (status, body) = post_json(
        &handle,
        WRITE_ENDPOINT,
        json!({"file": "pkg/notes.md", "content": "line one\nline two"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let response = Client::new()
        .get(format!("{}{READ_ENDPOINT}", handle.base_url()))
        .query(&[("file", "pkg/notes.md")])
        .header(API_KEY_HEADER, TEST_KEY)
        .send()
        .await
        .expect("read");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.json::<Value>().await.expect("json");
    assert_eq!(body["status"], "success");
    assert_eq!(body["content"], "line one\nline two");

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn regression_bad_api_key_fails_before_path_validation() {
    let temp = tempdir().expect("tempdir");
    let handle = start(temp.path()).await;

    let response = Client::new()
        .get(format!("{}{READ_ENDPOINT}", handle.base_url()))
        .query(&[("file", "../../etc/passwd")])
        .header(API_KEY_HEADER, "wrong")
        .send()
        .await
        .expect("read");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response.json::<Value>().await.expect("json");
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "authentication_error");
    assert!(body["timestamp"].is_string());

    let response = Client::new()
        .get(format!("{}{DISCOVER_TOOLS_ENDPOINT}", handle.base_url()))
        .send()
        .await
        .expect("discover");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn integration_escape_attempt_returns_path_security_envelope() {
    let temp = tempdir().expect("tempdir");
    let handle = start(temp.path()).await;

    let (status, body) = post_json(
        &handle,
        WRITE_ENDPOINT,
        json!({"file": "../escape.txt", "content": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "path_security_error");
    assert!(!temp.path().parent().expect("parent").join("escape.txt").exists());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn integration_list_delete_and_move_report_expected_shapes() {
    let temp = tempdir().expect("tempdir");
    std::fs::create_dir_all(temp.path().join("src")).expect("src");
    std::fs::write(temp.path().join("a.txt"), "a").expect("a");
    std::fs::write(temp.path().join("b.txt"), "b").expect("b");
    let handle = start(temp.path()).await;

    let (status, body) = post_json(&handle, LIST_ENDPOINT, json!({"path": "."})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["result"],
        json!({"files": ["a.txt", "b.txt"], "directories": ["src"]})
    );

    let (status, body) = post_json(
        &handle,
        FS_MOVE_ENDPOINT,
        json!({"source": "a.txt", "destination": "b.txt", "overwrite": false}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_exists");
    assert!(temp.path().join("a.txt").exists());

    let (status, body) = post_json(
        &handle,
        FS_MOVE_ENDPOINT,
        json!({"source": "a.txt", "destination": "src/a.txt"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["message"].as_str().is_some());

    let (status, body) = post_json(&handle, DELETE_ENDPOINT, json!({"path": "src"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "is_a_directory");

    let (status, _) = post_json(
        &handle,
        DELETE_ENDPOINT,
        json!({"path": "src", "recursive": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!temp.path().join("src").exists());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn integration_mkdir_and_stat_support_get_and_post() {
    let temp = tempdir().expect("tempdir");
    let handle = start(temp.path()).await;

    let (status, body) = post_json(
        &handle,
        FS_MKDIR_ENDPOINT,
        json!({"path": "docs/api", "parents": true, "exist_ok": false}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, body) = post_json(&handle, FS_STAT_ENDPOINT, json!({"path": "docs"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["type"], "directory");
    assert_eq!(body["result"]["dir_count"], 1);

    let response = Client::new()
        .get(format!("{}{FS_STAT_ENDPOINT}", handle.base_url()))
        .query(&[("path", "docs/api")])
        .header(API_KEY_HEADER, TEST_KEY)
        .send()
        .await
        .expect("stat get");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.json::<Value>().await.expect("json");
    assert_eq!(body["result"]["item_count"], 0);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn unit_malformed_body_maps_to_validation_error() {
    let temp = tempdir().expect("tempdir");
    let handle = start(temp.path()).await;

    let response = Client::new()
        .post(format!("{}{WRITE_ENDPOINT}", handle.base_url()))
        .header(API_KEY_HEADER, TEST_KEY)
        .body("{not json")
        .send()
        .await
        .expect("write");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>().await.expect("json");
    assert_eq!(body["code"], "validation_error");

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn functional_discover_tools_lists_every_capability() {
    let temp = tempdir().expect("tempdir");
    let handle = start(temp.path()).await;

    let response = Client::new()
        .get(format!("{}{DISCOVER_TOOLS_ENDPOINT}", handle.base_url()))
        .header(API_KEY_HEADER, TEST_KEY)
        .send()
        .await
        .expect("discover");
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.json::<Value>().await.expect("json");
    assert_eq!(body["tools"].as_array().map(Vec::len), Some(7));
    assert_eq!(body["capabilities"], json!(SERVICE_CAPABILITIES));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    handle.shutdown().await.expect("shutdown");
}

fn direct_state(root: &Path) -> Arc<SandboxServiceState> {
    Arc::new(SandboxServiceState {
        api_key: TEST_KEY.to_string(),
        fs: SandboxFs::new(
            PathValidator::with_default_extensions(root).expect("validator"),
            DEFAULT_MAX_FILE_SIZE,
        ),
    })
}

#[tokio::test(flavor = "current_thread")]
async fn unit_filesystem_work_runs_off_the_async_thread() {
    let temp = tempdir().expect("tempdir");
    std::fs::write(temp.path().join("a.txt"), "a").expect("a");
    let state = direct_state(temp.path());
    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, TEST_KEY.parse().expect("header"));

    let async_thread = std::thread::current().id();
    let outcome = authorized_blocking(&state, &headers, move |fs| {
        let listing = fs.list(".")?;
        Ok(json!({
            "files": listing.files,
            "same_thread": std::thread::current().id() == async_thread,
        }))
    })
    .await
    .expect("listing");
    assert_eq!(outcome["files"], json!(["a.txt"]));
    assert_eq!(outcome["same_thread"], json!(false));
}

#[tokio::test]
async fn regression_unauthorized_request_never_reaches_filesystem_task() {
    let temp = tempdir().expect("tempdir");
    let state = direct_state(temp.path());
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&ran);

    let error = authorized_blocking(&state, &HeaderMap::new(), move |_| {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(json!({}))
    })
    .await
    .expect_err("unauthorized");
    assert_eq!(error.code, "authentication_error");
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
}
