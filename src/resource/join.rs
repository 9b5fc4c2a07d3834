//! Status join
//!
//! Some kinds need a second listing to be complete, e.g. configuration
//! recorders and their recording status. The secondary records are indexed by
//! `key/region` once per region and merged into each primary record; a primary
//! record without a secondary entry gets the join's default fields.

use super::catalog::JoinDef;
use super::fetcher::{extract_json_value, fetch_all_pages};
use super::mapping::map_fields;
use super::node::FieldValue;
use crate::error::Result;
use crate::provider::ApiClient;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// `name/region` key shared by both sides of the join
pub fn join_key(name: &str, region: &str) -> String {
    format!("{}/{}", name, region)
}

#[derive(Debug, Clone)]
pub struct StatusMap {
    region: String,
    entries: HashMap<String, BTreeMap<String, FieldValue>>,
    defaults: BTreeMap<String, FieldValue>,
}

impl StatusMap {
    /// Index already-fetched secondary records
    pub fn from_records(join: &JoinDef, region: &str, records: &[Value]) -> Self {
        let entries = records
            .iter()
            .filter_map(|record| {
                let key = extract_json_value(record, &join.key_field)?.as_str()?;
                Some((join_key(key, region), map_fields(&join.fields, record)))
            })
            .collect();

        let defaults = join
            .fields
            .iter()
            .map(|f| (f.name.clone(), FieldValue::from(f.default.clone())))
            .collect();

        Self {
            region: region.to_string(),
            entries,
            defaults,
        }
    }

    /// Run the secondary listing for one region and index it
    pub async fn build(client: Arc<dyn ApiClient>, join: &JoinDef, region: &str) -> Result<Self> {
        let records = fetch_all_pages(client, &join.operation, &Value::Null, &join.response_path, None)
            .await?;
        tracing::debug!(
            "join {}: {} status records in {}",
            join.operation,
            records.len(),
            region
        );
        Ok(Self::from_records(join, region, &records))
    }

    /// Fields to merge into the primary record named `name`
    pub fn fields_for(&self, name: &str) -> BTreeMap<String, FieldValue> {
        self.entries
            .get(&join_key(name, &self.region))
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
