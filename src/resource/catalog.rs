//! Resource Catalog - Load resource definitions from JSON
//!
//! This module loads all resource kind definitions from embedded JSON files
//! and provides lookup functions for the rest of the crate.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/services.json"),
    include_str!("../resources/compute.json"),
    include_str!("../resources/dns.json"),
    include_str!("../resources/logging.json"),
    include_str!("../resources/kms.json"),
    include_str!("../resources/sagemaker.json"),
    include_str!("../resources/cloudwatch.json"),
    include_str!("../resources/config.json"),
];

fn default_json_version() -> String {
    "1.1".to_string()
}

/// Wire protocol a service speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// `X-Amz-Target` JSON over POST
    #[default]
    Json,
    /// Form-encoded query API with XML responses (EC2)
    Query,
    /// REST paths with XML bodies (Route 53)
    RestXml,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Json => "json",
            Protocol::Query => "query",
            Protocol::RestXml => "rest-xml",
        }
    }
}

/// Service endpoint definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    pub endpoint_prefix: String,
    pub target_prefix: String,
    #[serde(default = "default_json_version")]
    pub json_version: String,
    #[serde(default)]
    pub protocol: Protocol,
    /// Not regionally partitioned; fetched once with a region-less client
    #[serde(default)]
    pub is_global: bool,
}

/// Secondary cursor field copied from a response into the next request
#[derive(Debug, Clone, Deserialize)]
pub struct CarriedToken {
    pub request: String,
    pub response: String,
}

/// How a listing call pages
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationDef {
    /// Input field carrying the continuation token
    pub request_token: String,
    /// Output field carrying the next token
    pub response_token: String,
    /// Output flag that is `true` while more pages exist (older APIs)
    #[serde(default)]
    pub more_flag: Option<String>,
    /// Extra cursor fields for APIs that page on several keys
    #[serde(default)]
    pub carry: Vec<CarriedToken>,
}

/// How a derived value is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    #[default]
    Raw,
    /// Epoch seconds rendered as RFC 3339
    Timestamp,
}

/// Field mapping from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Dot path into the raw record; empty means the whole record
    pub json_path: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub format: FieldFormat,
}

/// Reference to another kind, stored on the node by identity
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceDef {
    pub field: String,
    pub json_path: String,
    pub kind: String,
}

/// Expensive describe call feeding several derived fields
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeDef {
    pub operation: String,
    /// Input template; `{field}` placeholders are filled from the node
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub response_path: String,
    pub fields: Vec<FieldDef>,
}

/// Secondary listing joined onto primary records by `key/region`
#[derive(Debug, Clone, Deserialize)]
pub struct JoinDef {
    pub operation: String,
    pub response_path: String,
    /// Key field in the secondary records
    pub key_field: String,
    /// Mapped primary field holding the same key
    pub record_key: String,
    /// Defaults apply when the primary record has no secondary entry
    pub fields: Vec<FieldDef>,
}

/// Per-node listing of another kind, e.g. the record sets of a hosted zone
#[derive(Debug, Clone, Deserialize)]
pub struct ChildDef {
    /// Kind of the listed nodes
    pub kind: String,
    pub operation: String,
    /// Input template; `{field}` placeholders are filled from the parent
    #[serde(default)]
    pub input: Value,
    pub response_path: String,
    #[serde(default)]
    pub pagination: Option<PaginationDef>,
    /// Field set on every child, referencing the parent
    #[serde(default)]
    pub parent_field: Option<String>,
}

/// Resource kind definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub service: String,
    /// Absent for kinds only reachable through a parent's child listing
    #[serde(default)]
    pub list_operation: Option<String>,
    #[serde(default)]
    pub list_params: Value,
    pub response_path: String,
    #[serde(default)]
    pub pagination: Option<PaginationDef>,
    /// Identity template, e.g. `{arn}` or `{name}/{region}`
    pub identity: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub references: Vec<ReferenceDef>,
    #[serde(default)]
    pub describes: HashMap<String, DescribeDef>,
    #[serde(default)]
    pub children: HashMap<String, ChildDef>,
    #[serde(default)]
    pub join: Option<JoinDef>,
    /// Attributes accepted by lookups; empty accepts any mapped field
    #[serde(default)]
    pub lookup_attributes: Vec<String>,
}

impl ResourceDef {
    /// Whether this kind is fetched once instead of per region
    pub fn is_global(&self) -> bool {
        get_service(&self.service).is_some_and(|s| s.is_global)
    }

    /// Whether the kind can be listed on its own
    pub fn is_listed(&self) -> bool {
        self.list_operation.is_some()
    }

    /// The describe group and field definition backing a derived field
    pub fn describe_for_field(&self, name: &str) -> Option<(&str, &DescribeDef, &FieldDef)> {
        self.describes.iter().find_map(|(group, def)| {
            def.fields
                .iter()
                .find(|f| f.name == name)
                .map(|field| (group.as_str(), def, field))
        })
    }

    pub fn accepts_lookup(&self, attribute: &str) -> bool {
        if self.lookup_attributes.is_empty() {
            return attribute == "region"
                || self.fields.iter().any(|f| f.name == attribute)
                || self.references.iter().any(|r| r.field == attribute);
        }
        self.lookup_attributes.iter().any(|a| a == attribute)
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub services: HashMap<String, ServiceDef>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global catalog loaded from JSON
static CATALOG: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource catalog (loads from embedded JSON on first access)
pub fn get_catalog() -> &'static ResourceConfig {
    CATALOG.get_or_init(|| {
        let mut final_config = ResourceConfig {
            services: HashMap::new(),
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.services.extend(partial.services);
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by kind
pub fn get_resource(kind: &str) -> Option<&'static ResourceDef> {
    get_catalog().resources.get(kind)
}

/// Get a service definition by name
pub fn get_service(name: &str) -> Option<&'static ServiceDef> {
    get_catalog().services.get(name)
}

/// Get all resource kinds, sorted
pub fn get_all_resource_kinds() -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = get_catalog()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    kinds.sort_unstable();
    kinds
}
