//! The Retrying HTTP Client: every outbound call this crate makes - to a
//! service container or to the subscription broker - goes through here, so
//! the retry policy is fixed in one place rather than re-derived at each
//! call site.

use std::collections::HashMap;

use reqwest::Method;

use crate::error::{DispatchContext, DispatchError};
use crate::resilience::retry::{RetryConfig, RetryExecutor};

/// The parts of an HTTP response the dispatch core reads.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The response status code.
    pub status: u16,
    /// The `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// The raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for any `2xx` status.
    pub fn is_success(&self) -> bool {
        self.status / 100 == 2
    }

    /// True if `content_type` names `application/json`.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }
}

/// A `reqwest` client wrapped with the engine's fixed retry policy: three
/// total attempts (one initial try plus two retries) at connection-level
/// failures. A response that arrives but carries a non-2xx status is
/// returned as-is - the caller decides what that means for the line being
/// dispatched, matching the original distinction between "the call could
/// not be made" and "the call was made and failed".
pub struct RetryingHttpClient {
    client: reqwest::Client,
    executor: RetryExecutor,
}

impl RetryingHttpClient {
    /// Build a client with the engine's fixed retry policy.
    pub fn new() -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().build().map_err(|e| DispatchError::DownstreamError {
            context: DispatchContext::without_line("<http-client-init>"),
            source: Box::new(e),
        })?;

        Ok(Self {
            client,
            executor: RetryExecutor::new(RetryConfig::default()),
        })
    }

    /// Issue a request, retrying connection-level failures up to the fixed
    /// policy. `operation` names the call for tracing (e.g. the URL).
    pub async fn fetch_with_retry(
        &self,
        operation: &str,
        context: &DispatchContext,
        method: Method,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, DispatchError> {
        let result = self
            .executor
            .execute(operation, || {
                let mut request = self.client.request(method.clone(), url);
                for (name, value) in headers {
                    request = request.header(name, value);
                }
                if let Some(body) = body.clone() {
                    request = request.body(body);
                }
                request.send()
            })
            .await;

        let response = result.map_err(|retry_err| DispatchError::DownstreamError {
            context: context.clone(),
            source: Box::new(retry_err.last_error),
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| DispatchError::DownstreamError {
            context: context.clone(),
            source: Box::new(e),
        })?;

        Ok(HttpResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range_is_exactly_2xx() {
        let ok = HttpResponse {
            status: 204,
            content_type: None,
            body: Vec::new(),
        };
        assert!(ok.is_success());

        let err = HttpResponse {
            status: 503,
            content_type: None,
            body: Vec::new(),
        };
        assert!(!err.is_success());
    }

    #[test]
    fn json_detection_looks_at_content_type_substring() {
        let resp = HttpResponse {
            status: 200,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: Vec::new(),
        };
        assert!(resp.is_json());

        let resp = HttpResponse {
            status: 200,
            content_type: Some("text/plain".to_string()),
            body: Vec::new(),
        };
        assert!(!resp.is_json());
    }
}
