//! HTTP utilities for JSON-protocol provider calls
//!
//! Every call is a `POST /` carrying the operation in `X-Amz-Target` and the
//! input as the JSON body. Requests are sent unsigned; point the factory at a
//! signing proxy or a local emulator with an endpoint override.
//!
//! Services on the query or REST-XML protocols (EC2, Route 53) cannot be
//! reached directly. They are only served through an endpoint override that
//! accepts JSON-protocol calls, or through a replay snapshot.

use super::{region_label, ApiClient, ClientFactory, Region};
use crate::error::{ApiError, InventoryError, Result};
use crate::resource::catalog::Protocol;
use crate::resource::get_service;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Client for one service in one region
#[derive(Clone)]
pub struct JsonHttpClient {
    client: Client,
    url: String,
    service: String,
    region: String,
    target_prefix: String,
    content_type: String,
}

impl JsonHttpClient {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        service: impl Into<String>,
        region: Option<&Region>,
        target_prefix: impl Into<String>,
        json_version: &str,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            service: service.into(),
            region: region_label(region).to_string(),
            target_prefix: target_prefix.into(),
            content_type: format!("application/x-amz-json-{}", json_version),
        }
    }

    fn error(&self, operation: &str, code: &str, message: impl Into<String>) -> ApiError {
        ApiError::new(&self.service, operation, &self.region, code, message)
    }
}

#[async_trait]
impl ApiClient for JsonHttpClient {
    async fn call(&self, operation: &str, input: &Value) -> Result<Value, ApiError> {
        tracing::debug!("POST {} {}.{}", self.url, self.target_prefix, operation);

        let response = self
            .client
            .post(&self.url)
            .header("X-Amz-Target", format!("{}.{}", self.target_prefix, operation))
            .header(reqwest::header::CONTENT_TYPE, &self.content_type)
            .body(input.to_string())
            .send()
            .await
            .map_err(|e| self.error(operation, "RequestFailed", e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.error(operation, "RequestFailed", e.to_string()))?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            let (code, message) = parse_error_body(&body);
            return Err(self
                .error(operation, &code, message)
                .with_status(status.as_u16()));
        }

        // Handle empty response
        if body.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        serde_json::from_str(&body).map_err(|e| {
            self.error(
                operation,
                "MalformedResponse",
                format!("failed to parse response JSON: {}", e),
            )
        })
    }
}

/// Extract `(code, message)` from a JSON-protocol error body
///
/// `__type` may be namespaced (`com.amazonaws.kms#AccessDeniedException`);
/// only the part after `#` is kept.
fn parse_error_body(body: &str) -> (String, String) {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);

    let code = parsed
        .get("__type")
        .or_else(|| parsed.get("code"))
        .and_then(|v| v.as_str())
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_else(|| "UnknownError".to_string());

    let message = parsed
        .get("message")
        .or_else(|| parsed.get("Message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| sanitize_for_log(body));

    (code, message)
}

/// Builds [`JsonHttpClient`]s from the service catalog
#[derive(Clone)]
pub struct HttpClientFactory {
    client: Client,
    endpoint: Option<Url>,
}

impl HttpClientFactory {
    /// Create a factory; `endpoint` overrides the per-service endpoints
    pub fn new(endpoint: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cloudinv/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InventoryError::Config(format!("failed to create HTTP client: {}", e)))?;

        let endpoint = endpoint
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| InventoryError::Config(format!("invalid endpoint '{}': {}", raw, e)))
            })
            .transpose()?;

        Ok(Self { client, endpoint })
    }

    /// Resolve the URL for a service in a region
    pub fn endpoint_for(&self, endpoint_prefix: &str, region: Option<&Region>) -> String {
        if let Some(ref endpoint) = self.endpoint {
            return endpoint.to_string();
        }
        match region {
            Some(region) => format!("https://{}.{}.amazonaws.com/", endpoint_prefix, region),
            None => format!("https://{}.amazonaws.com/", endpoint_prefix),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    fn client(&self, service: &str, region: Option<&Region>) -> Result<Arc<dyn ApiClient>> {
        let Some(def) = get_service(service) else {
            return Err(InventoryError::Config(format!("unknown service: {}", service)));
        };
        if def.protocol != Protocol::Json && self.endpoint.is_none() {
            return Err(InventoryError::Config(format!(
                "{} speaks the {} protocol; use --replay or an --endpoint that accepts JSON-protocol calls",
                service,
                def.protocol.as_str()
            )));
        }

        let url = self.endpoint_for(&def.endpoint_prefix, region);
        Ok(Arc::new(JsonHttpClient::new(
            self.client.clone(),
            url,
            service,
            region,
            &def.target_prefix,
            &def.json_version,
        )))
    }
}

/// Format an inventory error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_api_error(error: &InventoryError) -> String {
    if let Some(api) = error.as_api() {
        match api.status {
            Some(401) => return "Authentication failed. Check your credentials or signing proxy.".to_string(),
            Some(403) => return format!("Permission denied for {}.{}.", api.service, api.operation),
            Some(404) => return "Endpoint not found. Check the configured endpoint.".to_string(),
            Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
            Some(500) | Some(503) => {
                return "Service temporarily unavailable. Please try again.".to_string()
            }
            _ => {}
        }
        if api.code == "RequestFailed" {
            return "Request failed. Check your network connection and try again.".to_string();
        }
    }

    let error_str = error.to_string();

    // Truncate long error messages and remove potential sensitive data
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(160)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
