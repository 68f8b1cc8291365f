//! HTTP forwarding to hosted blockchains

use std::time::Duration;

use async_trait::async_trait;
use relaycraft_core::{ChainExecutor, ExecutionError, HostedBlockchain, RelayPayload};
use tracing::debug;

/// Hosted chain request timeout when none is configured
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 3000;

/// [`ChainExecutor`] that forwards payloads over HTTP
pub struct HttpChainExecutor {
    http_client: reqwest::Client,
}

/// `base` and `path` joined with exactly one slash; empty path keeps `base`
fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

impl HttpChainExecutor {
    pub fn new(timeout: Duration) -> Result<Self, ExecutionError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    pub fn with_timeout_ms(timeout_ms: u64) -> Result<Self, ExecutionError> {
        Self::new(Duration::from_millis(timeout_ms))
    }
}

#[async_trait]
impl ChainExecutor for HttpChainExecutor {
    async fn execute(
        &self,
        chain: &HostedBlockchain,
        payload: &RelayPayload,
    ) -> Result<String, ExecutionError> {
        let url = join_url(&chain.url, &payload.path);
        let method = if payload.method.is_empty() {
            "POST".to_string()
        } else {
            payload.method.to_uppercase()
        };
        let mut req = match method.as_str() {
            "GET" => self.http_client.get(&url),
            "POST" => self.http_client.post(&url),
            "PUT" => self.http_client.put(&url),
            "DELETE" => self.http_client.delete(&url),
            "PATCH" => self.http_client.patch(&url),
            _ => return Err(ExecutionError::Request(format!("Unsupported method: {}", method))),
        };

        if let Some(auth) = &chain.basic_auth {
            if !auth.username.is_empty() {
                req = req.basic_auth(&auth.username, Some(&auth.password));
            }
        }
        let has_content_type = payload
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            req = req.header("Content-Type", "application/json");
        }
        for (key, value) in &payload.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if !payload.data.is_empty() {
            req = req.body(payload.data.clone());
        }

        debug!("Forwarding {} relay to chain {}", method, chain.id);
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ExecutionError::Timeout
            } else {
                ExecutionError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ExecutionError::Timeout
            } else {
                ExecutionError::Request(e.to_string())
            }
        })?;
        if !status.is_success() {
            return Err(ExecutionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycraft_core::BasicAuth;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chain(url: &str) -> HostedBlockchain {
        HostedBlockchain {
            id: "0001".to_string(),
            url: url.to_string(),
            basic_auth: None,
        }
    }

    fn payload(data: &str, path: &str) -> RelayPayload {
        RelayPayload {
            data: data.to_string(),
            method: String::new(),
            path: path.to_string(),
            headers: Default::default(),
        }
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://a:1", ""), "http://a:1");
        assert_eq!(join_url("http://a:1/", "/v1/q"), "http://a:1/v1/q");
        assert_eq!(join_url("http://a:1", "v1"), "http://a:1/v1");
    }

    #[tokio::test]
    async fn test_post_forwards_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/query"))
            .and(body_string(r#"{"jsonrpc":"2.0"}"#))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result":"0x10"}"#))
            .mount(&server)
            .await;

        let executor = HttpChainExecutor::with_timeout_ms(DEFAULT_RPC_TIMEOUT_MS).unwrap();
        let result = executor
            .execute(&chain(&server.uri()), &payload(r#"{"jsonrpc":"2.0"}"#, "/v1/query"))
            .await
            .unwrap();
        assert_eq!(result, r#"{"result":"0x10"}"#);
    }

    #[tokio::test]
    async fn test_basic_auth_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut hosted = chain(&server.uri());
        hosted.basic_auth = Some(BasicAuth {
            username: "user".to_string(),
            password: "pass".to_string(),
        });
        let executor = HttpChainExecutor::with_timeout_ms(DEFAULT_RPC_TIMEOUT_MS).unwrap();
        let result = executor.execute(&hosted, &payload("{}", "")).await.unwrap();
        assert_eq!(result, "ok");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let executor = HttpChainExecutor::with_timeout_ms(DEFAULT_RPC_TIMEOUT_MS).unwrap();
        let err = executor
            .execute(&chain(&server.uri()), &payload("{}", ""))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Status {
                status: 500,
                body: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let executor = HttpChainExecutor::with_timeout_ms(50).unwrap();
        let err = executor
            .execute(&chain(&server.uri()), &payload("{}", ""))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::Timeout);
    }

    #[tokio::test]
    async fn test_get_method() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("up"))
            .mount(&server)
            .await;

        let mut request = payload("", "status");
        request.method = "get".to_string();
        let executor = HttpChainExecutor::with_timeout_ms(DEFAULT_RPC_TIMEOUT_MS).unwrap();
        let result = executor.execute(&chain(&server.uri()), &request).await.unwrap();
        assert_eq!(result, "up");
    }
}
