//! Resource nodes
//!
//! A node is one discovered remote entity. Its identity is rendered from its
//! own fields when it is built and never changes afterwards. Links to other
//! nodes are [`NodeRef`]s, resolved through the session when followed.

use super::describe::{ChildCache, DescribeCache};
use crate::provider::Region;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Weak link to another node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeRef {
    pub kind: String,
    pub id: String,
}

impl NodeRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// A field of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Nil,
    Data(Value),
    Ref(NodeRef),
}

impl FieldValue {
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            FieldValue::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ref_node(&self) -> Option<&NodeRef> {
        match self {
            FieldValue::Ref(node_ref) => Some(node_ref),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, FieldValue::Nil)
    }
}

impl From<Option<Value>> for FieldValue {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(Value::Null) | None => FieldValue::Nil,
            Some(v) => FieldValue::Data(v),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Node {
    kind: String,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<Region>,
    fields: BTreeMap<String, FieldValue>,
    #[serde(skip)]
    describes: DescribeCache,
    #[serde(skip)]
    children: ChildCache,
}

impl Node {
    pub fn new(
        kind: impl Into<String>,
        id: impl Into<String>,
        region: Option<Region>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            region,
            fields,
            describes: DescribeCache::new(),
            children: ChildCache::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(FieldValue::as_data)
            .and_then(|v| v.as_str())
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(&self.kind, &self.id)
    }

    pub fn describes(&self) -> &DescribeCache {
        &self.describes
    }

    pub fn children(&self) -> &ChildCache {
        &self.children
    }

    /// Whether `attribute` holds `value`; references match on the target identity
    pub fn attribute_matches(&self, attribute: &str, value: &Value) -> bool {
        if attribute == "region" {
            return self.region.as_ref().map(Region::as_str) == value.as_str();
        }
        match self.fields.get(attribute) {
            Some(FieldValue::Data(data)) => data == value,
            Some(FieldValue::Ref(node_ref)) => value.as_str() == Some(node_ref.id.as_str()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log_group() -> Node {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Data(json!("app")));
        fields.insert(
            "kmsKey".to_string(),
            FieldValue::Ref(NodeRef::new("aws.kms.key", "arn:key/1")),
        );
        fields.insert("retentionInDays".to_string(), FieldValue::Data(json!(30)));
        Node::new(
            "aws.cloudwatch.loggroup",
            "arn:log-group:app",
            Some(Region::from("us-east-1")),
            fields,
        )
    }

    #[test]
    fn test_attribute_matches() {
        let node = log_group();
        assert!(node.attribute_matches("name", &json!("app")));
        assert!(node.attribute_matches("retentionInDays", &json!(30)));
        assert!(node.attribute_matches("kmsKey", &json!("arn:key/1")));
        assert!(node.attribute_matches("region", &json!("us-east-1")));
        assert!(!node.attribute_matches("name", &json!("other")));
        assert!(!node.attribute_matches("missing", &json!("app")));
    }

    #[test]
    fn test_serializes_refs_by_identity() {
        let value = serde_json::to_value(log_group()).unwrap();
        assert_eq!(value["id"], "arn:log-group:app");
        assert_eq!(value["region"], "us-east-1");
        assert_eq!(
            value["fields"]["kmsKey"],
            json!({"kind": "aws.kms.key", "id": "arn:key/1"})
        );
        assert!(value.get("describes").is_none());
        assert!(value.get("children").is_none());
    }

    #[test]
    fn test_field_value_from_option() {
        assert!(FieldValue::from(None).is_nil());
        assert!(FieldValue::from(Some(Value::Null)).is_nil());
        assert_eq!(FieldValue::from(Some(json!(1))), FieldValue::Data(json!(1)));
    }
}
