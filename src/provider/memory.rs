//! In-memory replay provider
//!
//! Serves canned responses from a [`Snapshot`], either written by hand in
//! YAML/JSON (`--replay`) or assembled in code. Calls are matched on service,
//! region, operation and the exact input, so each page of a paginated listing
//! is its own entry keyed by the continuation token it was requested with.

use super::{region_label, ApiClient, ClientFactory, Region, RegionCatalog};
use crate::error::{ApiError, InventoryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Canned provider error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CannedError {
    #[serde(default)]
    pub status: Option<u16>,
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// One canned call outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CannedResponse {
    pub service: String,
    /// Absent for global services
    #[serde(default)]
    pub region: Option<Region>,
    pub operation: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<CannedError>,
    #[serde(default)]
    pub delay_ms: u64,
}

/// Everything a replay session can be asked for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub regions_error: Option<CannedError>,
    #[serde(default)]
    pub responses: Vec<CannedResponse>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_regions<I, R>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Region>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_regions_error(mut self, code: &str, message: &str) -> Self {
        self.regions_error = Some(CannedError {
            status: None,
            code: code.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// Add a successful response
    pub fn respond(
        mut self,
        service: &str,
        region: Option<&str>,
        operation: &str,
        input: Value,
        output: Value,
    ) -> Self {
        self.responses.push(CannedResponse {
            service: service.to_string(),
            region: region.map(Region::from),
            operation: operation.to_string(),
            input,
            output: Some(output),
            error: None,
            delay_ms: 0,
        });
        self
    }

    /// Add a failing response
    pub fn fail(
        mut self,
        service: &str,
        region: Option<&str>,
        operation: &str,
        input: Value,
        status: Option<u16>,
        code: &str,
    ) -> Self {
        self.responses.push(CannedResponse {
            service: service.to_string(),
            region: region.map(Region::from),
            operation: operation.to_string(),
            input,
            output: None,
            error: Some(CannedError {
                status,
                code: code.to_string(),
                message: format!("canned {} error", code),
            }),
            delay_ms: 0,
        });
        self
    }

    /// Delay the most recently added response
    pub fn delayed(mut self, delay: Duration) -> Self {
        if let Some(last) = self.responses.last_mut() {
            last.delay_ms = delay.as_millis() as u64;
        }
        self
    }

    /// Parse a snapshot from YAML (JSON is valid YAML)
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| InventoryError::Config(format!("invalid replay snapshot: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InventoryError::Config(format!("cannot read replay snapshot {:?}: {}", path, e))
        })?;
        Self::from_yaml(&content)
    }
}

/// A call served by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub service: String,
    pub region: Option<Region>,
    pub operation: String,
    pub input: Value,
}

struct MemoryInner {
    snapshot: Snapshot,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Region catalog and client factory backed by a [`Snapshot`]
#[derive(Clone)]
pub struct MemoryProvider {
    inner: Arc<MemoryInner>,
}

impl MemoryProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                snapshot,
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Number of calls made to `service.operation` across all regions
    pub fn calls(&self, service: &str, operation: &str) -> usize {
        self.recorded()
            .iter()
            .filter(|c| c.service == service && c.operation == operation)
            .count()
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RegionCatalog for MemoryProvider {
    async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        if let Some(ref err) = self.inner.snapshot.regions_error {
            let api = ApiError::new("regions", "DescribeRegions", "global", &err.code, &err.message);
            return Err(match err.status {
                Some(status) => api.with_status(status),
                None => api,
            });
        }
        Ok(self.inner.snapshot.regions.clone())
    }
}

impl ClientFactory for MemoryProvider {
    fn client(&self, service: &str, region: Option<&Region>) -> Result<Arc<dyn ApiClient>> {
        Ok(Arc::new(MemoryClient {
            inner: self.inner.clone(),
            service: service.to_string(),
            region: region.cloned(),
        }))
    }
}

struct MemoryClient {
    inner: Arc<MemoryInner>,
    service: String,
    region: Option<Region>,
}

/// `null` and `{}` both mean "no parameters"
fn normalize(input: &Value) -> Value {
    match input {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    }
}

#[async_trait]
impl ApiClient for MemoryClient {
    async fn call(&self, operation: &str, input: &Value) -> Result<Value, ApiError> {
        let input = normalize(input);
        tracing::debug!(
            "replay {}.{} in {}: {}",
            self.service,
            operation,
            region_label(self.region.as_ref()),
            input
        );

        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                service: self.service.clone(),
                region: self.region.clone(),
                operation: operation.to_string(),
                input: input.clone(),
            });

        let canned = self.inner.snapshot.responses.iter().find(|r| {
            r.service == self.service
                && r.region == self.region
                && r.operation == operation
                && normalize(&r.input) == input
        });

        let region = region_label(self.region.as_ref());
        let Some(canned) = canned else {
            return Err(ApiError::new(
                &self.service,
                operation,
                region,
                "NoCannedResponse",
                format!("no canned response for input {}", input),
            ));
        };

        if canned.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(canned.delay_ms)).await;
        }

        if let Some(ref err) = canned.error {
            let api = ApiError::new(&self.service, operation, region, &err.code, &err.message);
            return Err(match err.status {
                Some(status) => api.with_status(status),
                None => api,
            });
        }

        Ok(canned
            .output
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}
