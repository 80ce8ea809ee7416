use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use crate::sandbox_service::API_KEY_HEADER;

#[derive(Debug, Clone)]
/// Connection settings for `SandboxGateway`.
pub struct SandboxGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
/// Client stub for the sandbox service.
///
/// Every method resolves to a JSON value. Transport failures, timeouts and
/// non-2xx replies all collapse into `{"error": "<message>"}` so callers treat
/// them exactly like an operation that failed on the service side.
pub struct SandboxGateway {
    client: reqwest::Client,
    base_url: String,
    request_timeout_ms: u64,
}

impl SandboxGateway {
    pub fn new(config: SandboxGatewayConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(config.api_key.trim()) {
            headers.insert(API_KEY_HEADER, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout_ms: config.request_timeout_ms,
        })
    }

    pub async fn read_file(&self, path: &str) -> Value {
        let request = self
            .client
            .get(self.url("/read"))
            .query(&[("file", path)]);
        self.dispatch("read", request).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Value {
        self.post("write", "/write", json!({"file": path, "content": content}))
            .await
    }

    pub async fn list_dir(&self, path: &str) -> Value {
        self.post("list", "/list", json!({"path": path})).await
    }

    pub async fn delete_path(&self, path: &str, recursive: bool) -> Value {
        self.post(
            "delete",
            "/delete",
            json!({"path": path, "recursive": recursive}),
        )
        .await
    }

    pub async fn move_path(&self, source: &str, destination: &str, overwrite: bool) -> Value {
        self.post(
            "move",
            "/fs/move",
            json!({"source": source, "destination": destination, "overwrite": overwrite}),
        )
        .await
    }

    pub async fn make_dir(&self, path: &str, parents: bool, exist_ok: bool) -> Value {
        self.post(
            "mkdir",
            "/fs/mkdir",
            json!({"path": path, "parents": parents, "exist_ok": exist_ok}),
        )
        .await
    }

    pub async fn stat_path(&self, path: &str) -> Value {
        self.post("stat", "/fs/stat", json!({"path": path})).await
    }

    pub async fn discover_tools(&self) -> Value {
        let request = self.client.get(self.url("/discover-tools"));
        self.dispatch("discover", request).await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn post(&self, operation: &'static str, endpoint: &str, body: Value) -> Value {
        let request = self.client.post(self.url(endpoint)).json(&body);
        self.dispatch(operation, request).await
    }

    async fn dispatch(&self, operation: &'static str, request: reqwest::RequestBuilder) -> Value {
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                let message = if error.is_timeout() {
                    format!(
                        "sandbox {operation} timed out after {} ms",
                        self.request_timeout_ms
                    )
                } else {
                    format!("sandbox {operation} request failed: {error}")
                };
                tracing::warn!(operation, %error, "sandbox transport failure");
                return error_result(message);
            }
        };

        let status = response.status();
        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(error) => {
                return error_result(format!("sandbox {operation} response unreadable: {error}"))
            }
        };
        let parsed = serde_json::from_str::<Value>(&raw).ok();

        if status.is_success() {
            return parsed.unwrap_or_else(|| {
                error_result(format!("sandbox {operation} returned a non-JSON body"))
            });
        }

        let message = parsed
            .as_ref()
            .and_then(|envelope| {
                let code = envelope.get("code")?.as_str()?;
                let message = envelope.get("message")?.as_str()?;
                Some(format!("{code}: {message}"))
            })
            .unwrap_or_else(|| format!("sandbox {operation} failed with status {status}: {raw}"));
        tracing::debug!(operation, status = status.as_u16(), %message, "sandbox returned error");
        error_result(message)
    }
}

fn error_result(message: String) -> Value {
    json!({"error": message})
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{SandboxGateway, SandboxGatewayConfig};

    fn gateway(base_url: String, timeout_ms: u64) -> SandboxGateway {
        SandboxGateway::new(SandboxGatewayConfig {
            base_url,
            api_key: "k".to_string(),
            request_timeout_ms: timeout_ms,
        })
        .expect("gateway")
    }

    #[tokio::test]
    async fn functional_success_body_is_returned_verbatim() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/read")
                .query_param("file", "a.txt")
                .header("x-api-key", "k");
            then.status(200)
                .json_body(json!({"status": "success", "content": "hello"}));
        });

        let result = gateway(server.base_url(), 2_000).read_file("a.txt").await;
        mock.assert();
        assert_eq!(result, json!({"status": "success", "content": "hello"}));
    }

    #[tokio::test]
    async fn functional_error_envelope_becomes_uniform_error_result() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/fs/move");
            then.status(409).json_body(json!({
                "status": "error",
                "code": "already_exists",
                "message": "path 'b.txt' already exists",
                "timestamp": "2024-01-01T00:00:00Z"
            }));
        });

        let result = gateway(server.base_url(), 2_000)
            .move_path("a.txt", "b.txt", false)
            .await;
        assert_eq!(
            result,
            json!({"error": "already_exists: path 'b.txt' already exists"})
        );
    }

    #[tokio::test]
    async fn regression_connection_refused_is_materialized_not_raised() {
        let result = gateway("http://127.0.0.1:9".to_string(), 500)
            .list_dir(".")
            .await;
        let message = result["error"].as_str().expect("error message");
        assert!(message.starts_with("sandbox list"), "{message}");
    }

    #[tokio::test]
    async fn regression_timeouts_report_configured_budget() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/fs/stat");
            then.status(200)
                .delay(std::time::Duration::from_millis(400))
                .json_body(json!({"status": "success"}));
        });

        let result = gateway(server.base_url(), 50).stat_path("a.txt").await;
        assert_eq!(
            result,
            json!({"error": "sandbox stat timed out after 50 ms"})
        );
    }
}
