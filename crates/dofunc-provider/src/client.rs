use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dofunc_core::config::ApiToken;
use dofunc_core::{ProviderConfig, ProviderError, Result};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::context::OpContext;
use crate::retry::RetryPolicy;

const CREATE_PATH: [&str; 3] = ["v2", "functions", "namespaces"];

/// Body of `POST /v2/functions/namespaces`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateFunctionRequest {
    pub name: String,
    pub runtime: String,
}

/// Body of `PUT /v2/functions/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateFunctionRequest {
    pub runtime: String,
    pub code: String,
}

/// Fields the control plane reports about a function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDetails {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

/// Control-plane operations on functions.
#[async_trait]
pub trait FunctionApi: Send + Sync {
    /// Register a function. Only HTTP 200 is success.
    async fn create_function(&self, ctx: &OpContext, request: &CreateFunctionRequest) -> Result<FunctionDetails>;

    /// Look a function up. HTTP 404 yields `Ok(None)`.
    async fn get_function(&self, ctx: &OpContext, name: &str) -> Result<Option<FunctionDetails>>;

    /// Update runtime and code in place. Only HTTP 200 is success.
    async fn update_function(&self, ctx: &OpContext, name: &str, request: &UpdateFunctionRequest) -> Result<()>;

    /// Delete a function. HTTP 204 is success, 404 means it was already gone.
    async fn delete_function(&self, ctx: &OpContext, name: &str) -> Result<DeleteOutcome>;

    /// Control-plane address of the named function.
    fn function_url(&self, name: &str) -> String;
}

pub type DynFunctionApi = Arc<dyn FunctionApi>;

/// HTTP client for the functions control-plane API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: ApiToken,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api.base_url)
            .map_err(|e| ProviderError::configuration(format!("invalid api.base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::configuration("api.base_url cannot be a base URL"));
        }
        let token = config
            .api
            .token
            .clone()
            .ok_or_else(|| ProviderError::configuration("api.token is required"))?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token,
            timeout: config.api.request_timeout(),
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn function_endpoint(&self, name: &str) -> Url {
        self.endpoint(&["v2", "functions", name])
    }

    /// Send one request and return status and body text.
    async fn send(
        &self,
        ctx: &OpContext,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String)> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(self.token.expose())
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        ctx.bound(operation, self.timeout, async {
            let response = request
                .send()
                .await
                .map_err(|e| ProviderError::transport(operation, e))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| ProviderError::transport(operation, e))?;
            tracing::debug!(operation, status = status.as_u16(), "control-plane response");
            Ok((status, text))
        })
        .await
    }
}

fn to_json<T: Serialize>(operation: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ProviderError::decode(operation, e))
}

/// Pull the invocation URL out of a function response body.
///
/// Accepts `{"url": ..}` and `{"function": {"url": ..}}`.
fn parse_details(operation: &str, body: &str) -> Result<FunctionDetails> {
    let value: Value = serde_json::from_str(body).map_err(|e| ProviderError::decode(operation, e))?;
    if !value.is_object() {
        return Err(ProviderError::decode(operation, "expected a JSON object"));
    }
    let url = value
        .get("url")
        .or_else(|| value.pointer("/function/url"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Ok(FunctionDetails { url })
}

#[async_trait]
impl FunctionApi for ApiClient {
    async fn create_function(&self, ctx: &OpContext, request: &CreateFunctionRequest) -> Result<FunctionDetails> {
        let operation = "create function";
        let body = to_json(operation, request)?;
        // POST has no de-duplication key, so it is never retried.
        let (status, text) = self
            .send(ctx, operation, Method::POST, self.endpoint(&CREATE_PATH), Some(&body))
            .await?;
        if status != StatusCode::OK {
            return Err(ProviderError::protocol(operation, status.as_u16(), text));
        }
        if text.trim().is_empty() {
            return Ok(FunctionDetails::default());
        }
        parse_details(operation, &text)
    }

    async fn get_function(&self, ctx: &OpContext, name: &str) -> Result<Option<FunctionDetails>> {
        let operation = "get function";
        let url = self.function_endpoint(name);
        let (status, text) = self
            .retry
            .run(ctx, operation, || self.send(ctx, operation, Method::GET, url.clone(), None))
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::protocol(operation, status.as_u16(), text));
        }
        parse_details(operation, &text).map(Some)
    }

    async fn update_function(&self, ctx: &OpContext, name: &str, request: &UpdateFunctionRequest) -> Result<()> {
        let operation = "update function";
        let url = self.function_endpoint(name);
        let body = to_json(operation, request)?;
        // PUT replaces the same fields every time, so a repeat is harmless.
        let (status, text) = self
            .retry
            .run(ctx, operation, || {
                self.send(ctx, operation, Method::PUT, url.clone(), Some(&body))
            })
            .await?;
        if status != StatusCode::OK {
            return Err(ProviderError::protocol(operation, status.as_u16(), text));
        }
        Ok(())
    }

    async fn delete_function(&self, ctx: &OpContext, name: &str) -> Result<DeleteOutcome> {
        let operation = "delete function";
        let (status, text) = self
            .send(ctx, operation, Method::DELETE, self.function_endpoint(name), None)
            .await?;
        match status {
            StatusCode::NO_CONTENT => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::AlreadyAbsent),
            other => Err(ProviderError::protocol(operation, other.as_u16(), text)),
        }
    }

    fn function_url(&self, name: &str) -> String {
        self.function_endpoint(name).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        let mut config = ProviderConfig::with_token("tok");
        config.api.base_url = base.to_string();
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let c = client("https://api.example.com");
        assert_eq!(
            c.endpoint(&CREATE_PATH).as_str(),
            "https://api.example.com/v2/functions/namespaces"
        );
        assert_eq!(c.function_url("fn1"), "https://api.example.com/v2/functions/fn1");

        let prefixed = client("http://127.0.0.1:8080/proxy/");
        assert_eq!(prefixed.function_url("fn 1"), "http://127.0.0.1:8080/proxy/v2/functions/fn%201");
    }

    #[test]
    fn test_parse_details_shapes() {
        let flat = parse_details("get", r#"{"url":"https://faas/fn1"}"#).unwrap();
        assert_eq!(flat.url.as_deref(), Some("https://faas/fn1"));

        let nested = parse_details("get", r#"{"function":{"url":"https://faas/fn1"}}"#).unwrap();
        assert_eq!(nested.url.as_deref(), Some("https://faas/fn1"));

        let missing = parse_details("get", r#"{"name":"fn1"}"#).unwrap();
        assert!(missing.url.is_none());

        assert!(matches!(parse_details("get", "<html>"), Err(ProviderError::Decode { .. })));
        assert!(matches!(parse_details("get", "[1,2]"), Err(ProviderError::Decode { .. })));
    }

    #[test]
    fn test_missing_token_is_a_configuration_error() {
        let config = ProviderConfig::default();
        assert!(matches!(ApiClient::new(&config), Err(ProviderError::Configuration(_))));
    }
}
