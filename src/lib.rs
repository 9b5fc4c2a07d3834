//! Multi-region cloud inventory
//!
//! Discovers resources of a kind across every region of an account, keeps
//! them in a session-scoped identity map and resolves references and
//! expensive describe fields on demand.
//!
//! # Module Structure
//!
//! - [`provider`] - Traits for region catalogs, clients and denial classification
//! - [`resource`] - Catalog, pagination, job pool, fan-out and node registry
//! - [`session`] - The query-facing entry points
//! - [`config`] - Persistent user configuration
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod provider;
pub mod resource;
pub mod session;

pub use error::{ApiError, InventoryError, Result};
pub use provider::{AccessDenialClassifier, ApiClient, ClientFactory, Region, RegionCatalog};
pub use resource::{FieldValue, Node, NodeRef};
pub use session::{FetchSettings, NodeRequest, Session, SessionBuilder};
