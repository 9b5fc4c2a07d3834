//! Resource discovery layer
//!
//! This module provides a data-driven approach to discovering cloud resources.
//! Resource definitions are loaded from JSON files at compile time, allowing
//! new resource kinds to be added without code changes.
//!
//! # Architecture
//!
//! - [`catalog`] - Loads and caches resource definitions from embedded JSON
//! - [`fetcher`] - Drives list calls through every page as a stream
//! - [`pool`] - Bounded-concurrency job execution
//! - [`fanout`] - One job per region, access-denial tolerant
//! - [`registry`] - Session-scoped identity map of discovered nodes
//! - [`describe`] - Per-node memoized describe calls and child listings
//! - [`mapping`] / [`join`] - Raw records to node fields
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `services.json` - Endpoint and protocol details per service
//! - `compute.json` - EC2 instances
//! - `dns.json` - Route 53 hosted zones
//! - `logging.json` / `cloudwatch.json` - Log groups and metric alarms
//! - `kms.json` - KMS keys
//! - `sagemaker.json` - SageMaker endpoints
//! - `config.json` - Config recorders
//!
//! # Example
//!
//! ```ignore
//! use cloudinv::Session;
//!
//! async fn log_groups(session: &Session) -> cloudinv::Result<usize> {
//!     Ok(session.fetch_all("aws.cloudwatch.loggroup").await?.len())
//! }
//! ```

pub mod catalog;
pub mod describe;
pub mod fanout;
pub mod fetcher;
pub mod join;
pub mod mapping;
pub mod node;
pub mod pool;
pub mod registry;

pub use catalog::{get_all_resource_kinds, get_catalog, get_resource, get_service, ResourceDef};
pub use describe::{ChildCache, DescribeCache, DescribeState, LazyCache};
pub use fanout::fan_out;
pub use fetcher::{extract_json_value, fetch_all_pages, paginate};
pub use node::{FieldValue, Node, NodeRef};
pub use pool::{run_jobs, Job, JobPool};
pub use registry::NodeRegistry;
