//! Query session
//!
//! A [`Session`] owns everything discovered while answering one query: the
//! node registry, the per-kind collections and the region list. Collections
//! are fetched at most once per session; failed fetches are not remembered, so
//! a later call retries them.

use crate::error::{InventoryError, Result};
use crate::provider::{
    region_label, AccessDenialClassifier, AwsAccessDenial, ClientFactory, Region, RegionCatalog,
};
use crate::resource::catalog::{get_resource, ResourceDef};
use crate::resource::fanout::fan_out;
use crate::resource::fetcher::{extract_json_value, paginate};
use crate::resource::join::StatusMap;
use crate::resource::mapping::{map_field, map_record, render_identity, render_input};
use crate::resource::node::{FieldValue, Node, NodeRef};
use crate::resource::registry::NodeRegistry;
use futures::TryStreamExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Default number of regions fetched concurrently
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Upper bound on concurrently running region jobs
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// The ways a caller can ask for a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRequest {
    /// Every identifying field is known; build (or reuse) the node directly
    ///
    /// The node is provisional until a listing discovers the same identity.
    ByFullSpec(BTreeMap<String, Value>),
    /// Find an already-discoverable node by its identity
    ByIdentityLookup(String),
    /// Find the single node whose attribute holds a value
    ByAttributeLookup { attribute: String, value: Value },
}

type Collection = Arc<OnceCell<Vec<Arc<Node>>>>;

struct SessionInner {
    id: Uuid,
    regions: Arc<dyn RegionCatalog>,
    clients: Arc<dyn ClientFactory>,
    classifier: Arc<dyn AccessDenialClassifier>,
    settings: FetchSettings,
    registry: NodeRegistry,
    region_list: OnceCell<Vec<Region>>,
    collections: Mutex<HashMap<String, Collection>>,
}

/// Cheaply cloneable handle to one query session
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub struct SessionBuilder {
    regions: Arc<dyn RegionCatalog>,
    clients: Arc<dyn ClientFactory>,
    classifier: Arc<dyn AccessDenialClassifier>,
    settings: FetchSettings,
}

impl SessionBuilder {
    pub fn classifier(mut self, classifier: Arc<dyn AccessDenialClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.settings.concurrency = limit.max(1);
        self
    }

    pub fn build(self) -> Session {
        let id = Uuid::new_v4();
        tracing::info!(
            "session {} started (concurrency {})",
            id,
            self.settings.concurrency
        );
        Session {
            inner: Arc::new(SessionInner {
                id,
                regions: self.regions,
                clients: self.clients,
                classifier: self.classifier,
                settings: self.settings,
                registry: NodeRegistry::new(),
                region_list: OnceCell::new(),
                collections: Mutex::new(HashMap::new()),
            }),
        }
    }
}

fn lookup_error_value(value: &Value) -> String {
    value
        .as_str()
        .map(|s| s.to_string())
        .unwrap_or_else(|| value.to_string())
}

impl Session {
    pub fn builder(regions: Arc<dyn RegionCatalog>, clients: Arc<dyn ClientFactory>) -> SessionBuilder {
        SessionBuilder {
            regions,
            clients,
            classifier: Arc::new(AwsAccessDenial),
            settings: FetchSettings::default(),
        }
    }

    pub fn new(regions: Arc<dyn RegionCatalog>, clients: Arc<dyn ClientFactory>) -> Self {
        Self::builder(regions, clients).build()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn settings(&self) -> FetchSettings {
        self.inner.settings
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    /// Regions of the account, read once per session
    pub async fn regions(&self) -> Result<Vec<Region>> {
        let regions = self
            .inner
            .region_list
            .get_or_try_init(|| async {
                let regions = self
                    .inner
                    .regions
                    .regions()
                    .await
                    .map_err(InventoryError::Regions)?;
                tracing::info!("session {}: {} regions", self.inner.id, regions.len());
                Ok::<_, InventoryError>(regions)
            })
            .await?;
        Ok(regions.clone())
    }

    fn collection(&self, kind: &str) -> Collection {
        self.inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind.to_string())
            .or_default()
            .clone()
    }

    /// Every node of `kind` across all regions
    pub async fn fetch_all(&self, kind: &str) -> Result<Vec<Arc<Node>>> {
        let def = get_resource(kind).ok_or_else(|| InventoryError::UnknownKind(kind.to_string()))?;
        let Some(operation) = def.list_operation.as_deref() else {
            return Err(InventoryError::InvalidInput(format!(
                "{} can only be listed through its parent",
                kind
            )));
        };
        let cell = self.collection(kind);
        let nodes = cell
            .get_or_try_init(|| self.fetch_kind(kind, def, operation))
            .await?;
        Ok(nodes.clone())
    }

    async fn fetch_kind(
        &self,
        kind: &str,
        def: &'static ResourceDef,
        operation: &'static str,
    ) -> Result<Vec<Arc<Node>>> {
        let regions = if def.is_global() {
            Ok(vec![None])
        } else {
            self.regions()
                .await
                .map(|regions| regions.into_iter().map(Some).collect())
        };

        let session = self.clone();
        let owned_kind = kind.to_string();
        let nodes = fan_out(
            regions,
            kind,
            self.inner.settings.concurrency,
            self.inner.classifier.clone(),
            move |region| {
                let session = session.clone();
                let kind = owned_kind.clone();
                async move { session.fetch_region(&kind, def, operation, region).await }
            },
        )
        .await?;

        // Regions can report the same entity; keep its first occurrence
        let mut seen = HashSet::new();
        let nodes: Vec<Arc<Node>> = nodes
            .into_iter()
            .filter(|node| seen.insert(node.id().to_string()))
            .collect();

        tracing::info!("{}: {} nodes", kind, nodes.len());
        Ok(nodes)
    }

    async fn fetch_region(
        &self,
        kind: &str,
        def: &ResourceDef,
        operation: &str,
        region: Option<Region>,
    ) -> Result<Vec<Arc<Node>>> {
        let label = region_label(region.as_ref()).to_string();
        let client = self.inner.clients.client(&def.service, region.as_ref())?;

        let status = match def.join {
            Some(ref join) => Some((join, StatusMap::build(client.clone(), join, &label).await?)),
            None => None,
        };

        let stream = paginate(
            client,
            operation.to_string(),
            def.list_params.clone(),
            def.response_path.clone(),
            def.pagination.clone(),
        );
        futures::pin_mut!(stream);

        let mut nodes = Vec::new();
        while let Some(record) = stream.try_next().await? {
            let mut fields = map_record(def, &record, region.as_ref());
            if let Some((join, status)) = &status {
                let key = fields
                    .get(&join.record_key)
                    .and_then(FieldValue::as_data)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                fields.extend(status.fields_for(&key));
            }

            nodes.push(self.register(kind, def, fields, region.clone())?);
        }

        tracing::debug!("{} in {}: {} records", kind, label, nodes.len());
        Ok(nodes)
    }

    /// Register a discovered record, replacing a provisional node of the same identity
    fn register(
        &self,
        kind: &str,
        def: &ResourceDef,
        fields: BTreeMap<String, FieldValue>,
        region: Option<Region>,
    ) -> Result<Arc<Node>> {
        let identity = render_identity(kind, &def.identity, &fields)?;
        self.inner.registry.resolve_provisional(kind, &identity, || {
            Ok(Node::new(kind, identity.as_str(), region, fields))
        })
    }

    /// The node of `kind` with the given identity
    ///
    /// A provisional node is only returned when listing the kind does not
    /// discover the identity.
    pub async fn resolve(&self, kind: &str, identity: &str) -> Result<Arc<Node>> {
        let def = get_resource(kind).ok_or_else(|| InventoryError::UnknownKind(kind.to_string()))?;
        if identity.is_empty() {
            return Err(InventoryError::InvalidInput(format!(
                "an identity is required to resolve {}",
                kind
            )));
        }

        if let Some(node) = self.inner.registry.get_discovered(kind, identity) {
            return Ok(node);
        }

        if def.is_listed() {
            self.fetch_all(kind).await?;
        }
        self.inner
            .registry
            .get(kind, identity)
            .ok_or_else(|| InventoryError::NotFound {
                kind: kind.to_string(),
                attribute: "identity".to_string(),
                value: identity.to_string(),
            })
    }

    /// The single node of `kind` whose `attribute` holds `value`
    ///
    /// Arguments are checked before anything is fetched.
    pub async fn lookup_by_attribute(
        &self,
        kind: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<Arc<Node>> {
        let def = get_resource(kind).ok_or_else(|| InventoryError::UnknownKind(kind.to_string()))?;

        if attribute.is_empty() {
            return Err(InventoryError::InvalidInput(format!(
                "a lookup attribute is required for {}",
                kind
            )));
        }
        match value {
            Value::Null => {
                return Err(InventoryError::InvalidInput(format!(
                    "{} lookup by {} requires a value",
                    kind, attribute
                )))
            }
            Value::String(s) if s.is_empty() => {
                return Err(InventoryError::InvalidInput(format!(
                    "{} lookup by {} requires a non-empty value",
                    kind, attribute
                )))
            }
            Value::Array(_) | Value::Object(_) => {
                return Err(InventoryError::InvalidInput(format!(
                    "{} lookup by {} requires a scalar value",
                    kind, attribute
                )))
            }
            _ => {}
        }
        if !def.accepts_lookup(attribute) {
            return Err(InventoryError::InvalidInput(format!(
                "{} cannot be looked up by {}",
                kind, attribute
            )));
        }

        let nodes = self.fetch_all(kind).await?;
        let mut matches: Vec<Arc<Node>> = nodes
            .into_iter()
            .filter(|node| node.attribute_matches(attribute, value))
            .collect();

        match matches.len() {
            0 => Err(InventoryError::NotFound {
                kind: kind.to_string(),
                attribute: attribute.to_string(),
                value: lookup_error_value(value),
            }),
            1 => Ok(matches.remove(0)),
            count => Err(InventoryError::Ambiguous {
                kind: kind.to_string(),
                attribute: attribute.to_string(),
                value: lookup_error_value(value),
                count,
            }),
        }
    }

    /// Dispatch a node request
    pub async fn request(&self, kind: &str, request: NodeRequest) -> Result<Arc<Node>> {
        match request {
            NodeRequest::ByIdentityLookup(identity) => self.resolve(kind, &identity).await,
            NodeRequest::ByAttributeLookup { attribute, value } => {
                self.lookup_by_attribute(kind, &attribute, &value).await
            }
            NodeRequest::ByFullSpec(values) => self.construct(kind, values),
        }
    }

    /// Build a provisional node from caller-supplied values, reusing an existing one with the same identity
    fn construct(&self, kind: &str, values: BTreeMap<String, Value>) -> Result<Arc<Node>> {
        let def = get_resource(kind).ok_or_else(|| InventoryError::UnknownKind(kind.to_string()))?;

        let mut fields = BTreeMap::new();
        let mut region = None;
        for (name, value) in values {
            if name == "region" {
                let Some(text) = value.as_str() else {
                    return Err(InventoryError::InvalidInput(format!(
                        "region of {} must be a string",
                        kind
                    )));
                };
                region = Some(Region::from(text));
                fields.insert(name, FieldValue::Data(value));
            } else if let Some(reference) = def.references.iter().find(|r| r.field == name) {
                let field = match value {
                    Value::Null => FieldValue::Nil,
                    Value::String(id) if !id.is_empty() => {
                        FieldValue::Ref(NodeRef::new(&reference.kind, id))
                    }
                    _ => {
                        return Err(InventoryError::InvalidInput(format!(
                            "{}.{} must be an identity string",
                            kind, name
                        )))
                    }
                };
                fields.insert(name, field);
            } else if def.fields.iter().any(|f| f.name == name) {
                fields.insert(name, FieldValue::from(Some(value)));
            } else {
                return Err(InventoryError::InvalidInput(format!(
                    "{} has no field '{}'",
                    kind, name
                )));
            }
        }

        let identity = render_identity(kind, &def.identity, &fields)?;
        self.inner.registry.resolve_provisional(kind, &identity, || {
            Ok(Node::new(kind, identity.as_str(), region, fields))
        })
    }

    /// Value of a field, fetching its describe group on first use
    pub async fn field(&self, node: &Node, name: &str) -> Result<FieldValue> {
        if let Some(value) = node.field(name) {
            return Ok(value.clone());
        }

        let def = get_resource(node.kind())
            .ok_or_else(|| InventoryError::UnknownKind(node.kind().to_string()))?;
        let Some((group, describe, field)) = def.describe_for_field(name) else {
            return Err(InventoryError::InvalidInput(format!(
                "{} has no field '{}'",
                node.kind(),
                name
            )));
        };

        let Some(response) = self.describe(node, group).await? else {
            return Ok(FieldValue::Nil);
        };
        Ok(match extract_json_value(&response, &describe.response_path) {
            Some(body) => map_field(field, body),
            None => FieldValue::from(field.default.clone()),
        })
    }

    /// Raw response of a describe group; `None` when the call was denied
    pub async fn describe(&self, node: &Node, group: &str) -> Result<Option<Value>> {
        let def = get_resource(node.kind())
            .ok_or_else(|| InventoryError::UnknownKind(node.kind().to_string()))?;
        let describe = def.describes.get(group).ok_or_else(|| {
            InventoryError::InvalidInput(format!("{} has no describe group '{}'", node.kind(), group))
        })?;

        node.describes()
            .get_or_fetch(group, || async {
                let input = render_input(&describe.input, node)?;
                let client = self.inner.clients.client(&def.service, node.region())?;
                match client.call(&describe.operation, &input).await {
                    Ok(response) => Ok(Some(response)),
                    Err(err) if self.inner.classifier.is_access_denied(&err) => {
                        tracing::warn!(
                            region = %region_label(node.region()),
                            kind = %node.kind(),
                            id = %node.id(),
                            "{} denied, treating as empty",
                            describe.operation
                        );
                        Ok(None)
                    }
                    Err(err) => Err(err.into()),
                }
            })
            .await
    }

    /// Nodes listed under `node` by its child collection `name`
    ///
    /// The listing runs at most once per node. A denied listing yields no
    /// children and is not retried.
    pub async fn children(&self, node: &Node, name: &str) -> Result<Vec<Arc<Node>>> {
        let def = get_resource(node.kind())
            .ok_or_else(|| InventoryError::UnknownKind(node.kind().to_string()))?;
        let child = def.children.get(name).ok_or_else(|| {
            InventoryError::InvalidInput(format!(
                "{} has no child collection '{}'",
                node.kind(),
                name
            ))
        })?;
        let child_def = get_resource(&child.kind)
            .ok_or_else(|| InventoryError::UnknownKind(child.kind.clone()))?;

        let refs = node
            .children()
            .get_or_fetch(name, || async {
                let input = render_input(&child.input, node)?;
                let client = self.inner.clients.client(&child_def.service, node.region())?;
                let stream = paginate(
                    client,
                    child.operation.clone(),
                    input,
                    child.response_path.clone(),
                    child.pagination.clone(),
                );
                futures::pin_mut!(stream);

                let mut refs = Vec::new();
                loop {
                    let record = match stream.try_next().await {
                        Ok(Some(record)) => record,
                        Ok(None) => break,
                        Err(InventoryError::Api(err)) if self.inner.classifier.is_access_denied(&err) => {
                            tracing::warn!(
                                region = %region_label(node.region()),
                                kind = %node.kind(),
                                id = %node.id(),
                                "{} denied, no {} listed",
                                child.operation,
                                name
                            );
                            return Ok(Vec::new());
                        }
                        Err(err) => return Err(err),
                    };

                    let mut fields = map_record(child_def, &record, node.region());
                    if let Some(ref field) = child.parent_field {
                        fields.insert(field.clone(), FieldValue::Ref(node.node_ref()));
                    }
                    let listed = self.register(&child.kind, child_def, fields, node.region().cloned())?;
                    refs.push(listed.node_ref());
                }

                tracing::debug!("{} {}: {} {}", node.kind(), node.id(), refs.len(), name);
                Ok(refs)
            })
            .await?;

        refs.iter()
            .map(|r| {
                self.inner
                    .registry
                    .get(&r.kind, &r.id)
                    .ok_or_else(|| InventoryError::NotFound {
                        kind: r.kind.clone(),
                        attribute: "identity".to_string(),
                        value: r.id.clone(),
                    })
            })
            .collect()
    }

    /// Resolve a reference field; `None` when the reference is empty
    pub async fn follow(&self, node: &Node, field: &str) -> Result<Option<Arc<Node>>> {
        match node.field(field) {
            Some(FieldValue::Ref(target)) => self.resolve(&target.kind, &target.id).await.map(Some),
            Some(FieldValue::Nil) => Ok(None),
            Some(FieldValue::Data(_)) => Err(InventoryError::InvalidInput(format!(
                "{}.{} is not a reference",
                node.kind(),
                field
            ))),
            None => Err(InventoryError::InvalidInput(format!(
                "{} has no field '{}'",
                node.kind(),
                field
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{MemoryProvider, Snapshot};
    use serde_json::json;

    fn session(snapshot: Snapshot) -> (Session, MemoryProvider) {
        let provider = MemoryProvider::new(snapshot);
        let session = Session::new(Arc::new(provider.clone()), Arc::new(provider.clone()));
        (session, provider)
    }

    fn two_keys() -> Snapshot {
        Snapshot::new().with_regions(["us-east-1"]).respond(
            "kms",
            Some("us-east-1"),
            "ListKeys",
            json!({"Limit": 100}),
            json!({
                "Keys": [
                    {"KeyId": "k1", "KeyArn": "arn:aws:kms:us-east-1:1:key/k1"},
                    {"KeyId": "k2", "KeyArn": "arn:aws:kms:us-east-1:1:key/k2"}
                ],
                "Truncated": false
            }),
        )
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let (session, _) = session(Snapshot::new());
        let err = session.fetch_all("aws.nope").await.unwrap_err();
        assert!(matches!(err, InventoryError::UnknownKind(_)));
    }

    #[tokio::test]
    async fn test_collection_is_fetched_once() {
        let (session, provider) = session(two_keys());

        let first = session.fetch_all("aws.kms.key").await.unwrap();
        let second = session.fetch_all("aws.kms.key").await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(provider.calls("kms", "ListKeys"), 1);
    }

    #[tokio::test]
    async fn test_invalid_lookup_makes_no_calls() {
        let (session, provider) = session(two_keys());

        for value in [Value::Null, json!(""), json!(["a"])] {
            let err = session
                .lookup_by_attribute("aws.kms.key", "arn", &value)
                .await
                .unwrap_err();
            assert!(matches!(err, InventoryError::InvalidInput(_)), "{:?}", value);
        }
        let err = session
            .lookup_by_attribute("aws.kms.key", "keyState", &json!("Enabled"))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
        let err = session.resolve("aws.kms.key", "").await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));

        assert!(provider.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_fetches_then_reports_not_found() {
        let (session, _) = session(two_keys());

        let node = session
            .resolve("aws.kms.key", "arn:aws:kms:us-east-1:1:key/k2")
            .await
            .unwrap();
        assert_eq!(node.str_field("id"), Some("k2"));

        let err = session
            .resolve("aws.kms.key", "arn:aws:kms:us-east-1:1:key/zz")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_full_spec_reuses_discovered_node() {
        let (session, provider) = session(two_keys());
        let discovered = session.fetch_all("aws.kms.key").await.unwrap();

        let mut values = BTreeMap::new();
        values.insert("arn".to_string(), json!("arn:aws:kms:us-east-1:1:key/k1"));
        values.insert("id".to_string(), json!("k1"));
        let built = session
            .request("aws.kms.key", NodeRequest::ByFullSpec(values))
            .await
            .unwrap();

        assert!(discovered.iter().any(|n| Arc::ptr_eq(n, &built)));
        assert_eq!(provider.calls("kms", "ListKeys"), 1);
    }

    #[tokio::test]
    async fn test_discovery_replaces_full_spec_node() {
        let snapshot = Snapshot::new().with_regions(["us-east-1"]).respond(
            "logs",
            Some("us-east-1"),
            "DescribeLogGroups",
            json!({}),
            json!({"logGroups": [{"arn": "arn:lg:app", "logGroupName": "app", "retentionInDays": 30}]}),
        );
        let (session, _) = session(snapshot);

        let mut values = BTreeMap::new();
        values.insert("arn".to_string(), json!("arn:lg:app"));
        let built = session
            .request("aws.cloudwatch.loggroup", NodeRequest::ByFullSpec(values))
            .await
            .unwrap();
        assert!(built.region().is_none());
        assert!(session.registry().is_provisional("aws.cloudwatch.loggroup", "arn:lg:app"));

        let nodes = session.fetch_all("aws.cloudwatch.loggroup").await.unwrap();
        assert_eq!(nodes.len(), 1);
        let discovered = &nodes[0];
        assert_eq!(discovered.region().map(Region::as_str), Some("us-east-1"));
        assert_eq!(discovered.field("retentionInDays"), Some(&FieldValue::Data(json!(30))));
        assert_eq!(discovered.str_field("name"), Some("app"));

        let resolved = session.resolve("aws.cloudwatch.loggroup", "arn:lg:app").await.unwrap();
        assert!(Arc::ptr_eq(&resolved, discovered));
        assert!(!session.registry().is_provisional("aws.cloudwatch.loggroup", "arn:lg:app"));
    }

    #[tokio::test]
    async fn test_resolve_prefers_listing_over_full_spec_node() {
        let (session, provider) = session(two_keys());

        let mut values = BTreeMap::new();
        values.insert("arn".to_string(), json!("arn:aws:kms:us-east-1:1:key/k1"));
        let built = session
            .request("aws.kms.key", NodeRequest::ByFullSpec(values))
            .await
            .unwrap();

        let resolved = session
            .resolve("aws.kms.key", "arn:aws:kms:us-east-1:1:key/k1")
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&built, &resolved));
        assert_eq!(resolved.str_field("id"), Some("k1"));
        assert_eq!(provider.calls("kms", "ListKeys"), 1);
    }

    #[tokio::test]
    async fn test_undiscovered_full_spec_node_still_resolves() {
        let (session, _) = session(two_keys());

        let mut values = BTreeMap::new();
        values.insert("arn".to_string(), json!("arn:aws:kms:eu-west-1:1:key/k9"));
        values.insert("region".to_string(), json!("eu-west-1"));
        let built = session
            .request("aws.kms.key", NodeRequest::ByFullSpec(values))
            .await
            .unwrap();

        let resolved = session
            .resolve("aws.kms.key", "arn:aws:kms:eu-west-1:1:key/k9")
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&built, &resolved));
        assert_eq!(resolved.region().map(Region::as_str), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_child_only_kind_cannot_be_listed() {
        let (session, provider) = session(Snapshot::new());

        let err = session.fetch_all("aws.route53.record").await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
        let err = session.resolve("aws.route53.record", "/hostedzone/Z1/a./A/").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(provider.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_full_spec_rejects_unknown_fields_and_missing_identity() {
        let (session, provider) = session(Snapshot::new());

        let mut unknown = BTreeMap::new();
        unknown.insert("colour".to_string(), json!("blue"));
        let err = session
            .request("aws.kms.key", NodeRequest::ByFullSpec(unknown))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));

        let mut partial = BTreeMap::new();
        partial.insert("id".to_string(), json!("k1"));
        let err = session
            .request("aws.kms.key", NodeRequest::ByFullSpec(partial))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::MissingIdentity { .. }));

        assert!(provider.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let (session, provider) = session(
            Snapshot::new().with_regions(["us-east-1"]).fail(
                "kms",
                Some("us-east-1"),
                "ListKeys",
                json!({"Limit": 100}),
                Some(500),
                "InternalFailure",
            ),
        );

        assert!(session.fetch_all("aws.kms.key").await.is_err());
        assert!(session.fetch_all("aws.kms.key").await.is_err());
        assert_eq!(provider.calls("kms", "ListKeys"), 2);
    }

    #[tokio::test]
    async fn test_field_errors() {
        let (session, _) = session(two_keys());
        let node = session
            .resolve("aws.kms.key", "arn:aws:kms:us-east-1:1:key/k1")
            .await
            .unwrap();

        let err = session.field(&node, "colour").await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
        let err = session.follow(&node, "id").await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
        let err = session.children(&node, "grants").await.unwrap_err();
        assert!(matches!(err, InventoryError::InvalidInput(_)));
    }
}
