//! `http`: one REST call

use super::{expect_mapping, required};
use crate::executor::{CommandHandler, StepContext, StepOutput};
use crate::pipeline::{Params, StepError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::json;
use url::Url;

const METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
];

/// Issues an HTTP request described by a mapping
///
/// Non-2xx responses are returned as payloads, not errors.
#[derive(Debug, Clone, Default)]
pub struct HttpCommand {
    client: Client,
}

impl HttpCommand {
    /// Creates the command with a shared client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the request described by `params`
    ///
    /// # Errors
    ///
    /// Returns [`StepError::InvalidParams`] for a missing or unparsable URL, or
    /// an unsupported method.
    pub fn build_request(&self, params: &Params) -> Result<RequestBuilder, StepError> {
        let cmd = self.name();
        expect_mapping(params, cmd)?;

        let method = parse_method(params.get_str("method").as_deref().unwrap_or("GET"))
            .ok_or_else(|| {
                StepError::invalid_params(
                    cmd,
                    format!(
                        "unsupported HTTP method: {}",
                        params.get_str("method").unwrap_or_default()
                    ),
                )
            })?;
        let raw_url = required(params, "url", cmd)?;
        let url = Url::parse(&raw_url)
            .map_err(|e| StepError::invalid_params(cmd, format!("bad url '{raw_url}': {e}")))?;

        let mut request = self.client.request(method, url);

        if let Some(headers) = params.get("header").and_then(Params::as_mapping) {
            for (key, value) in headers {
                if let Some(value) = value.to_text() {
                    request = request.header(key.as_str(), value);
                }
            }
        }

        match params.get("body") {
            None | Some(Params::Null) => {}
            Some(Params::Scalar(text)) => request = request.body(text.clone()),
            Some(body) => request = request.json(&body.to_json()),
        }

        if let Some(basic) = params.get("auth").and_then(|a| a.get("basic")) {
            let username = basic.get_str("username").unwrap_or_default();
            request = request.basic_auth(username, basic.get_str("password"));
        }

        Ok(request)
    }
}

fn parse_method(raw: &str) -> Option<Method> {
    let upper = raw.trim().to_ascii_uppercase();
    METHODS.into_iter().find(|m| m.as_str() == upper)
}

#[async_trait]
impl CommandHandler for HttpCommand {
    fn name(&self) -> &str {
        "http"
    }

    fn help(&self) -> &str {
        "Make an HTTP request"
    }

    async fn execute(&self, params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let mut request = self.build_request(params)?;
        if let Some(timeout) = ctx.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::info!(step = %ctx.step_name, status = status.as_u16(), bytes = text.len(), "HTTP response");

        let body = serde_json::from_str::<serde_json::Value>(&text)
            .unwrap_or(serde_json::Value::String(text));
        Ok(StepOutput::respond(json!({
            "status": status.as_u16(),
            "body": body,
        })))
    }
}
