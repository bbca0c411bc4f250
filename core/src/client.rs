//! The client value threaded through every operation.
//!
//! # Design
//! `SendGridClient` holds a `ClientConfig` and a `Transport` and nothing
//! else, so it carries no state from one call to the next. Each resource
//! operation comes as three methods:
//! - `build_*` produces the `HttpRequest` (after local validation),
//! - `parse_*` interprets the `HttpResponse`,
//! - the plain operation runs build, `Transport::execute` and parse.
//!
//! Callers that do their own I/O use the first two directly. The resource
//! methods live in `api_keys`, `templates` and `template_versions`.

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{encode, ApiError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::retry::{retry_on_rate_limit, Deadline};

/// Client for the provider's administrative API.
#[derive(Debug, Clone)]
pub struct SendGridClient<T> {
    config: ClientConfig,
    transport: T,
}

impl<T> SendGridClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Request without a body.
    pub(crate) fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: format!("{}{path}", self.config.base_url),
            headers: self.headers(false),
            body: None,
        }
    }

    /// Request with a JSON body.
    pub(crate) fn json_request<B: serde::Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        Ok(HttpRequest {
            method,
            path: format!("{}{path}", self.config.base_url),
            headers: self.headers(true),
            body: Some(encode(body)?),
        })
    }

    fn headers(&self, json: bool) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                "authorization".to_string(),
                format!("Bearer {}", self.config.api_key),
            ),
            ("user-agent".to_string(), self.config.user_agent.clone()),
        ];
        if json {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        headers
    }
}

impl<T: Transport> SendGridClient<T> {
    /// One round trip. Transport failures become `ApiError::Transport`.
    pub(crate) fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, path = %request.path, "sending request");
        let response = self.transport.execute(request)?;
        debug!(status = response.status, "received response");
        Ok(response)
    }

    /// Run `action` under the configured rate-limit retry policy.
    ///
    /// ```no_run
    /// # use std::time::Duration;
    /// # use sendgrid_core::{ClientConfig, Deadline, SendGridClient, UreqTransport};
    /// let client = SendGridClient::new(ClientConfig::new("SG.key"), UreqTransport::new());
    /// let deadline = Deadline::after(Duration::from_secs(60));
    /// let key = client.with_retry(&deadline, || client.create_api_key("ci", &["mail.send".to_string()]));
    /// ```
    pub fn with_retry<R, F>(&self, deadline: &Deadline, action: F) -> Result<R, ApiError>
    where
        F: FnMut() -> Result<R, ApiError>,
    {
        retry_on_rate_limit(&self.config.retry, deadline, action)
    }
}
