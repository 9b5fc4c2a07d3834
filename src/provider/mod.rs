//! Provider interaction module
//!
//! The inventory core never talks to the network directly. It consumes the
//! traits defined here, and the submodules provide implementations.
//!
//! # Module Structure
//!
//! - [`http`] - JSON-protocol HTTP client and endpoint resolution
//! - [`memory`] - In-memory replay provider driven by a snapshot file
//!
//! # Example
//!
//! ```ignore
//! use cloudinv::provider::{http::HttpClientFactory, StaticRegions};
//!
//! let clients = HttpClientFactory::new(Some("http://localhost:4566"))?;
//! let regions = StaticRegions::new(["us-east-1", "eu-west-1"]);
//! ```

pub mod http;
pub mod memory;

use crate::error::{ApiError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Label used in logs and errors for region-less clients
pub const GLOBAL_REGION: &str = "global";

/// A provider-defined geographic partition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Region {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Region {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Label for an optional region
pub fn region_label(region: Option<&Region>) -> &str {
    region.map(Region::as_str).unwrap_or(GLOBAL_REGION)
}

/// A client bound to one service and one region (or none, for global services)
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(&self, operation: &str, input: &Value) -> Result<Value, ApiError>;
}

/// Source of the regions an account can be queried in
#[async_trait]
pub trait RegionCatalog: Send + Sync {
    async fn regions(&self) -> Result<Vec<Region>, ApiError>;
}

/// Builds region-scoped clients
pub trait ClientFactory: Send + Sync {
    /// `region` is `None` for services that are not regionally partitioned
    fn client(&self, service: &str, region: Option<&Region>) -> Result<Arc<dyn ApiClient>>;
}

/// Decides which provider errors mean "not entitled here"
pub trait AccessDenialClassifier: Send + Sync {
    fn is_access_denied(&self, err: &ApiError) -> bool;
}

impl<F> AccessDenialClassifier for F
where
    F: Fn(&ApiError) -> bool + Send + Sync,
{
    fn is_access_denied(&self, err: &ApiError) -> bool {
        self(err)
    }
}

/// Denial classification for AWS-style error responses
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsAccessDenial;

impl AccessDenialClassifier for AwsAccessDenial {
    fn is_access_denied(&self, err: &ApiError) -> bool {
        // Errors without a status come from canned or synthetic sources; judge them by code alone
        let status_matches = matches!(err.status, None | Some(400) | Some(403));
        let code_matches = ["AccessDenied", "UnauthorizedOperation", "AuthorizationError"]
            .iter()
            .any(|needle| err.code.contains(needle));
        status_matches && code_matches
    }
}

/// Fixed list of regions, typically from configuration
#[derive(Debug, Clone)]
pub struct StaticRegions {
    regions: Vec<Region>,
}

impl StaticRegions {
    pub fn new<I, R>(regions: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Region>,
    {
        Self {
            regions: regions.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RegionCatalog for StaticRegions {
    async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        Ok(self.regions.clone())
    }
}

/// Region list obtained from a `DescribeRegions`-style call
pub struct ApiRegionCatalog {
    client: Arc<dyn ApiClient>,
    operation: String,
    response_path: String,
    name_field: String,
}

impl ApiRegionCatalog {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self {
            client,
            operation: "DescribeRegions".to_string(),
            response_path: "Regions".to_string(),
            name_field: "RegionName".to_string(),
        }
    }
}

#[async_trait]
impl RegionCatalog for ApiRegionCatalog {
    async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        let response = self
            .client
            .call(&self.operation, &Value::Object(serde_json::Map::new()))
            .await?;

        let regions = response
            .get(&self.response_path)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|r| r.get(&self.name_field).and_then(|v| v.as_str()))
                    .map(Region::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(regions)
    }
}
