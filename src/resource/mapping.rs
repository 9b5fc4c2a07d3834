//! Record mapping
//!
//! Turns raw provider records into node fields according to the catalog,
//! and renders identity and describe-input templates from those fields.

use super::catalog::{FieldDef, FieldFormat, ResourceDef};
use super::fetcher::extract_json_value;
use super::node::{FieldValue, Node, NodeRef};
use crate::error::{InventoryError, Result};
use crate::provider::Region;
use chrono::{DateTime, SecondsFormat};
use serde_json::Value;
use std::collections::BTreeMap;

/// Map one field definition against a record
pub fn map_field(def: &FieldDef, record: &Value) -> FieldValue {
    match extract_json_value(record, &def.json_path) {
        Some(value) => FieldValue::Data(format_value(def.format, value)),
        None => FieldValue::from(def.default.clone()),
    }
}

pub fn map_fields(defs: &[FieldDef], record: &Value) -> BTreeMap<String, FieldValue> {
    defs.iter()
        .map(|def| (def.name.clone(), map_field(def, record)))
        .collect()
}

/// All fields of a primary listing record, including references and region
pub fn map_record(
    def: &ResourceDef,
    record: &Value,
    region: Option<&Region>,
) -> BTreeMap<String, FieldValue> {
    let mut fields = map_fields(&def.fields, record);

    for reference in &def.references {
        let target = extract_json_value(record, &reference.json_path)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        let value = match target {
            Some(id) => FieldValue::Ref(NodeRef::new(&reference.kind, id)),
            None => FieldValue::Nil,
        };
        fields.insert(reference.field.clone(), value);
    }

    if let Some(region) = region {
        fields.insert(
            "region".to_string(),
            FieldValue::Data(Value::String(region.to_string())),
        );
    }

    fields
}

/// Epoch seconds become RFC 3339; anything else passes through
fn format_value(format: FieldFormat, value: &Value) -> Value {
    match format {
        FieldFormat::Raw => value.clone(),
        FieldFormat::Timestamp => match value.as_f64() {
            Some(epoch) => {
                let secs = epoch.trunc() as i64;
                let nanos = (epoch.fract() * 1e9) as u32;
                DateTime::from_timestamp(secs, nanos)
                    .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
                    .unwrap_or_else(|| value.clone())
            }
            None => value.clone(),
        },
    }
}

/// Text form of a field for template rendering
fn field_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Data(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        FieldValue::Data(Value::Number(n)) => Some(n.to_string()),
        FieldValue::Data(Value::Bool(b)) => Some(b.to_string()),
        FieldValue::Ref(node_ref) => Some(node_ref.id.clone()),
        _ => None,
    }
}

/// Fill `{name}` placeholders; returns the first placeholder that could not be filled
///
/// `{name?}` renders as empty text when the field is missing.
fn render_template<F>(template: &str, lookup: F) -> std::result::Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 1..start + len];
        let (name, optional) = match name.strip_suffix('?') {
            Some(name) => (name, true),
            None => (name, false),
        };
        match lookup(name) {
            Some(text) => out.push_str(&text),
            None if optional => {}
            None => return Err(name.to_string()),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Render a kind's identity from its fields
pub fn render_identity(
    kind: &str,
    template: &str,
    fields: &BTreeMap<String, FieldValue>,
) -> Result<String> {
    render_template(template, |name| fields.get(name).and_then(field_text)).map_err(|field| {
        InventoryError::MissingIdentity {
            kind: kind.to_string(),
            field,
        }
    })
}

/// Render a describe-input template from a node's fields
pub fn render_input(template: &Value, node: &Node) -> Result<Value> {
    match template {
        Value::String(s) => {
            let rendered = render_template(s, |name| node.field(name).and_then(field_text))
                .map_err(|field| InventoryError::MissingIdentity {
                    kind: node.kind().to_string(),
                    field,
                })?;
            Ok(Value::String(rendered))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_input(item, node))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::new();
            for (key, value) in map {
                rendered.insert(key.clone(), render_input(value, node)?);
            }
            Ok(Value::Object(rendered))
        }
        Value::Null => Ok(Value::Object(serde_json::Map::new())),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::catalog::get_resource;
    use serde_json::json;

    #[test]
    fn test_map_record_for_log_group() {
        let def = get_resource("aws.cloudwatch.loggroup").unwrap();
        let record = json!({
            "arn": "arn:aws:logs:us-east-1:1:log-group:app:*",
            "logGroupName": "app",
            "kmsKeyId": "arn:aws:kms:us-east-1:1:key/abc"
        });

        let fields = map_record(def, &record, Some(&Region::from("us-east-1")));

        assert_eq!(fields["name"], FieldValue::Data(json!("app")));
        assert_eq!(fields["retentionInDays"], FieldValue::Data(json!(0)));
        assert_eq!(fields["region"], FieldValue::Data(json!("us-east-1")));
        assert_eq!(
            fields["kmsKey"],
            FieldValue::Ref(NodeRef::new("aws.kms.key", "arn:aws:kms:us-east-1:1:key/abc"))
        );
        assert!(fields["createdAt"].is_nil());
    }

    #[test]
    fn test_missing_reference_is_nil() {
        let def = get_resource("aws.cloudwatch.loggroup").unwrap();
        let fields = map_record(def, &json!({"arn": "a", "logGroupName": "n"}), None);
        assert!(fields["kmsKey"].is_nil());
        assert!(!fields.contains_key("region"));
    }

    #[test]
    fn test_timestamp_format() {
        let def = FieldDef {
            name: "createdAt".into(),
            json_path: "CreationDate".into(),
            default: None,
            format: FieldFormat::Timestamp,
        };
        let value = map_field(&def, &json!({"CreationDate": 1700000000.0}));
        assert_eq!(value, FieldValue::Data(json!("2023-11-14T22:13:20Z")));

        let passthrough = map_field(&def, &json!({"CreationDate": "2023-01-01"}));
        assert_eq!(passthrough, FieldValue::Data(json!("2023-01-01")));
    }

    #[test]
    fn test_render_composite_identity() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Data(json!("default")));
        fields.insert("region".to_string(), FieldValue::Data(json!("eu-west-1")));

        let id = render_identity("aws.config.recorder", "{name}/{region}", &fields).unwrap();
        assert_eq!(id, "default/eu-west-1");
    }

    #[test]
    fn test_render_identity_with_optional_part() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "hostedZone".to_string(),
            FieldValue::Ref(NodeRef::new("aws.route53.hostedzone", "/hostedzone/Z1")),
        );
        fields.insert("name".to_string(), FieldValue::Data(json!("www.example.com.")));
        fields.insert("type".to_string(), FieldValue::Data(json!("A")));
        let template = "{hostedZone}/{name}/{type}/{setIdentifier?}";

        let plain = render_identity("aws.route53.record", template, &fields).unwrap();
        assert_eq!(plain, "/hostedzone/Z1/www.example.com./A/");

        fields.insert("setIdentifier".to_string(), FieldValue::Data(json!("blue")));
        let weighted = render_identity("aws.route53.record", template, &fields).unwrap();
        assert_eq!(weighted, "/hostedzone/Z1/www.example.com./A/blue");
    }

    #[test]
    fn test_render_identity_reports_missing_field() {
        let fields = BTreeMap::new();
        let err = render_identity("aws.kms.key", "{arn}", &fields).unwrap_err();
        assert!(
            matches!(err, InventoryError::MissingIdentity { ref field, .. } if field == "arn")
        );
    }

    #[test]
    fn test_render_input_from_node() {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), FieldValue::Data(json!("/hostedzone/Z1")));
        let node = Node::new("aws.route53.hostedzone", "/hostedzone/Z1", None, fields);

        let input = render_input(&json!({"Id": "{id}", "MaxItems": 10}), &node).unwrap();
        assert_eq!(input, json!({"Id": "/hostedzone/Z1", "MaxItems": 10}));
    }
}
