//! Configuration aggregate
//!
//! [`MetaConfig`] is the in-memory union of every configuration document of a
//! stream. Each document is routed by kind:
//!
//! - `ClusterConfiguration`, `InitConfiguration`, `StaticClusterConfiguration`
//!   and provider `*ClusterConfiguration` documents become field maps
//! - `ModuleConfig` documents become [`ModuleConfig`] records, in order
//! - anything else is passed through as a resource
//!
//! Configuration documents are validated strictly and normalized with schema
//! defaults. Resources are validated only when a schema happens to exist.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::document::{self, Document, DocumentClass, INIT_CONFIGURATION_KIND};
use crate::error::{CoreError, Result, ValidationErrors};
use crate::index::SchemaIndex;
use crate::prepare::{
    MASTER_NODE_GROUP_NAME, MasterNodeGroupSpec, NodeGroupSpec, PreparatorRegistry,
    STATIC_CLUSTER_TYPE,
};
use crate::store::SchemaStore;

/// `apiVersion` of the synthesized `InitConfiguration`
pub const INIT_CONFIGURATION_VERSION: &str = "deckhouse.io/v1";

/// Document used when a stream carries no `InitConfiguration`
pub const DEFAULT_INIT_CONFIGURATION: &str = "apiVersion: deckhouse.io/v1\nkind: InitConfiguration\n";

/// Top-level fields of one configuration document
pub type ConfigFields = IndexMap<String, JsonValue>;

/// Enabled flag, version and settings of one pluggable module
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    pub version: i64,
    pub settings: Map<String, JsonValue>,
}

#[derive(Deserialize)]
struct ModuleConfigDocument {
    #[serde(default)]
    metadata: ModuleConfigMetadata,
    #[serde(default)]
    spec: ModuleConfigSpec,
}

#[derive(Default, Deserialize)]
struct ModuleConfigMetadata {
    #[serde(default)]
    name: String,
}

#[derive(Default, Deserialize)]
struct ModuleConfigSpec {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    settings: Option<Map<String, JsonValue>>,
}

impl ModuleConfig {
    fn from_value(value: JsonValue) -> std::result::Result<Self, String> {
        let document: ModuleConfigDocument =
            serde_json::from_value(value).map_err(|e| e.to_string())?;

        let name = document.metadata.name.trim().to_string();
        if name.is_empty() {
            return Err("ModuleConfig must define metadata.name".to_string());
        }

        Ok(Self {
            name,
            enabled: document.spec.enabled,
            version: document.spec.version.unwrap_or_default(),
            settings: document.spec.settings.unwrap_or_default(),
        })
    }
}

/// Parsed and prepared cluster configuration
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaConfig {
    #[serde(skip)]
    pub cluster_type: String,
    #[serde(skip)]
    pub layout: String,
    /// Provider name in lower case
    #[serde(skip)]
    pub provider_name: String,
    /// Provider name as written in `cloud.provider`
    #[serde(skip)]
    pub original_provider_name: String,
    #[serde(skip)]
    pub cluster_prefix: String,
    #[serde(skip)]
    pub cluster_dns_address: String,
    #[serde(skip)]
    pub master_node_group: MasterNodeGroupSpec,
    #[serde(skip)]
    pub node_groups: Vec<NodeGroupSpec>,

    #[serde(rename = "clusterConfiguration")]
    pub cluster_config: ConfigFields,
    #[serde(skip)]
    pub init_cluster_config: ConfigFields,
    #[serde(
        rename = "providerClusterConfiguration",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub provider_cluster_config: ConfigFields,
    #[serde(
        rename = "staticClusterConfiguration",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub static_cluster_config: ConfigFields,

    #[serde(skip)]
    pub module_configs: Vec<ModuleConfig>,
    /// Documents outside the configuration contract, in input order
    #[serde(skip)]
    pub resources: Vec<Document>,
}

impl MetaConfig {
    /// Split, route, validate and prepare a configuration stream
    pub fn parse(store: &SchemaStore, text: &str, preparators: &PreparatorRegistry) -> Result<Self> {
        let documents = document::split(text);
        let mut meta = Self::from_documents(store, &documents)?;
        meta.prepare(preparators)?;
        Ok(meta)
    }

    /// Route already split documents into an aggregate without preparing it
    ///
    /// Structural violations of every document are collected and reported
    /// together. Malformed documents and missing configuration schemas abort
    /// at once.
    pub fn from_documents(store: &SchemaStore, documents: &[Document]) -> Result<Self> {
        let mut meta = Self::default();
        let mut violations = ValidationErrors::default();
        let mut has_init = false;

        for doc in documents {
            let index = doc.schema_index()?;
            let class = DocumentClass::of(&index.kind);
            tracing::debug!(position = doc.position, %index, ?class, "routing document");

            match class {
                DocumentClass::Resource => meta.route_resource(store, doc, &index, &mut violations)?,
                DocumentClass::ModuleConfig => {
                    meta.route_module_config(store, doc, &index, &mut violations)?
                }
                class => {
                    has_init |= class == DocumentClass::InitConfiguration;
                    let Some(fields) = normalize(store, doc, &index, &mut violations)? else {
                        continue;
                    };
                    match class {
                        DocumentClass::InitConfiguration => meta.init_cluster_config = fields,
                        DocumentClass::ClusterConfiguration => meta.cluster_config = fields,
                        DocumentClass::StaticClusterConfiguration => {
                            meta.static_cluster_config = fields
                        }
                        _ => {
                            if !meta.provider_cluster_config.is_empty() {
                                tracing::warn!(
                                    position = doc.position,
                                    %index,
                                    "provider cluster configuration defined more than once, using the last one"
                                );
                            }
                            meta.provider_cluster_config = fields;
                        }
                    }
                }
            }
        }

        if !has_init {
            meta.synthesize_init_configuration(store, documents.len(), &mut violations)?;
        }

        if !violations.is_empty() {
            return Err(CoreError::StructuralValidationFailed(violations));
        }
        Ok(meta)
    }

    fn route_resource(
        &mut self,
        store: &SchemaStore,
        doc: &Document,
        index: &SchemaIndex,
        violations: &mut ValidationErrors,
    ) -> Result<()> {
        if store.contains(index) {
            normalize(store, doc, index, violations)?;
        } else {
            tracing::debug!(position = doc.position, %index, "no schema for resource, passing through");
        }
        self.resources.push(doc.clone());
        Ok(())
    }

    fn route_module_config(
        &mut self,
        store: &SchemaStore,
        doc: &Document,
        index: &SchemaIndex,
        violations: &mut ValidationErrors,
    ) -> Result<()> {
        let Some(fields) = normalize(store, doc, index, violations)? else {
            return Ok(());
        };

        let value = JsonValue::Object(fields.into_iter().collect());
        let mut module = ModuleConfig::from_value(value)
            .map_err(|reason| CoreError::malformed(doc.position, reason, &doc.content))?;

        if store.has_module_catalog() && !store.has_module(&module.name) {
            tracing::debug!(module = %module.name, "unknown module, keeping ModuleConfig as a resource");
            self.resources.push(doc.clone());
            return Ok(());
        }

        if !module.settings.is_empty() {
            let mut settings = JsonValue::Object(std::mem::take(&mut module.settings));
            match store
                .validate_module_settings(index, &module.name, &mut settings)
                .map_err(|e| e.at_position(doc.position))
            {
                Ok(()) => {}
                Err(CoreError::StructuralValidationFailed(errors)) => violations.extend(errors),
                Err(e) => return Err(e),
            }
            if let JsonValue::Object(settings) = settings {
                module.settings = settings;
            }
        }

        self.module_configs.push(module);
        Ok(())
    }

    fn synthesize_init_configuration(
        &mut self,
        store: &SchemaStore,
        position: usize,
        violations: &mut ValidationErrors,
    ) -> Result<()> {
        let index = SchemaIndex::new(INIT_CONFIGURATION_KIND, INIT_CONFIGURATION_VERSION);
        if !store.contains(&index) {
            tracing::debug!("no InitConfiguration schema, leaving init configuration empty");
            return Ok(());
        }

        let doc = Document::new(position, DEFAULT_INIT_CONFIGURATION);
        if let Some(fields) = normalize(store, &doc, &index, violations)? {
            self.init_cluster_config = fields;
        }
        Ok(())
    }

    pub fn is_static(&self) -> bool {
        self.cluster_type == STATIC_CLUSTER_TYPE
    }

    /// `ClusterConfiguration` as YAML, empty when absent
    pub fn cluster_config_yaml(&self) -> Result<String> {
        fields_yaml(&self.cluster_config)
    }

    pub fn provider_cluster_config_yaml(&self) -> Result<String> {
        fields_yaml(&self.provider_cluster_config)
    }

    pub fn static_cluster_config_yaml(&self) -> Result<String> {
        fields_yaml(&self.static_cluster_config)
    }

    /// Pass-through resources joined into one stream
    pub fn resources_yaml(&self) -> String {
        document::join(&self.resources)
    }

    /// Configured replicas of a node group, `0` when unknown
    pub fn replicas_by_node_group(&self, name: &str) -> i64 {
        if name == MASTER_NODE_GROUP_NAME {
            return self.master_node_group.replicas;
        }
        self.node_groups
            .iter()
            .find(|group| group.name == name)
            .map_or(0, |group| group.replicas)
    }

    /// Raw provider definition of a non-master node group
    pub fn find_node_group(&self, name: &str) -> Option<&JsonValue> {
        let position = self.node_groups.iter().position(|group| group.name == name)?;
        self.provider_cluster_config
            .get("nodeGroups")
            .and_then(JsonValue::as_array)
            .and_then(|groups| groups.get(position))
    }

    /// `internalNetworkCIDRs` of the static cluster configuration
    pub fn internal_network_cidrs(&self) -> Vec<String> {
        self.static_cluster_config
            .get("internalNetworkCIDRs")
            .and_then(JsonValue::as_array)
            .map(|cidrs| {
                cidrs
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn module_config(&self, name: &str) -> Option<&ModuleConfig> {
        self.module_configs.iter().find(|module| module.name == name)
    }

    /// `NodeGroup` resource for a node group ordered from the provider
    pub fn node_group_manifest(&self, group: &NodeGroupSpec) -> JsonValue {
        serde_json::json!({
            "apiVersion": "deckhouse.io/v1",
            "kind": "NodeGroup",
            "metadata": {"name": group.name},
            "spec": {
                "nodeType": "CloudPermanent",
                "disruptions": {"approvalMode": "Manual"},
                "nodeTemplate": group.node_template.clone().unwrap_or_else(|| JsonValue::Object(Map::new())),
            }
        })
    }

    /// Name of the infrastructure state cache for this cluster
    pub fn cache_path(&self) -> String {
        format!("{}-{}-terraform-state-cache", self.cluster_prefix, self.provider_name)
    }

    /// Serialized configuration consumed by the installer
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn fields_yaml(fields: &ConfigFields) -> Result<String> {
    if fields.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_yaml::to_string(fields)?)
}

/// Validate one configuration document and return its normalized fields
///
/// Structural violations are collected into `violations` and yield `None`;
/// every other failure is returned.
fn normalize(
    store: &SchemaStore,
    doc: &Document,
    index: &SchemaIndex,
    violations: &mut ValidationErrors,
) -> Result<Option<ConfigFields>> {
    let mut content = doc.content.clone();
    match store
        .validate_with_index(index, &mut content)
        .map_err(|e| e.at_position(doc.position))
    {
        Ok(()) => {}
        Err(CoreError::StructuralValidationFailed(errors)) => {
            violations.extend(errors);
            return Ok(None);
        }
        Err(e) => return Err(e),
    }

    match serde_json::from_str::<JsonValue>(&content)? {
        JsonValue::Object(map) => Ok(Some(map.into_iter().collect())),
        other => Err(CoreError::malformed(
            doc.position,
            format!("{} document must be a mapping, got {other}", index.kind),
            &doc.content,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const CLUSTER: &str = r#"
kind: ClusterConfiguration
apiVersions:
  - apiVersion: deckhouse.io/v1
    openAPISpec:
      type: object
      required: [clusterType, serviceSubnetCIDR]
      properties:
        clusterType:
          type: string
        serviceSubnetCIDR:
          type: string
        clusterDomain:
          type: string
          default: cluster.local
"#;

    const INIT: &str = r#"
kind: InitConfiguration
apiVersions:
  - apiVersion: deckhouse.io/v1
    openAPISpec:
      type: object
      properties:
        deckhouse:
          type: object
          default: {}
          properties:
            releaseChannel:
              type: string
              default: Stable
"#;

    const MODULE: &str = r#"
kind: ModuleConfig
apiVersions:
  - apiVersion: deckhouse.io/v1alpha1
    openAPISpec:
      type: object
      properties:
        spec:
          type: object
          properties:
            enabled:
              type: boolean
            version:
              type: integer
            settings:
              type: object
"#;

    fn store() -> SchemaStore {
        let mut store = SchemaStore::new();
        for descriptor in [CLUSTER, INIT, MODULE] {
            store.upload_descriptor(descriptor).unwrap();
        }
        store
    }

    const STATIC_CLUSTER: &str = "apiVersion: deckhouse.io/v1\nkind: ClusterConfiguration\nclusterType: Static\nserviceSubnetCIDR: 10.111.0.0/16\n";

    #[test]
    fn test_routes_and_synthesizes_init() {
        let meta = MetaConfig::from_documents(&store(), &document::split(STATIC_CLUSTER)).unwrap();

        assert_eq!(meta.cluster_config["clusterType"], "Static");
        assert_eq!(meta.cluster_config["clusterDomain"], "cluster.local");
        assert_eq!(meta.init_cluster_config["kind"], INIT_CONFIGURATION_KIND);
        assert_eq!(meta.init_cluster_config["deckhouse"]["releaseChannel"], "Stable");
        assert!(meta.resources.is_empty());
    }

    #[test]
    fn test_no_init_schema_leaves_init_empty() {
        let mut store = SchemaStore::new();
        store.upload_descriptor(CLUSTER).unwrap();
        let meta = MetaConfig::from_documents(&store, &document::split(STATIC_CLUSTER)).unwrap();
        assert!(meta.init_cluster_config.is_empty());
    }

    #[test]
    fn test_module_configs_keep_order() {
        let text = format!(
            "{STATIC_CLUSTER}---\napiVersion: deckhouse.io/v1alpha1\nkind: ModuleConfig\nmetadata:\n  name: global\nspec:\n  version: 1\n  settings:\n    highAvailability: false\n---\napiVersion: deckhouse.io/v1alpha1\nkind: ModuleConfig\nmetadata:\n  name: common\nspec:\n  enabled: false\n"
        );
        let meta = MetaConfig::from_documents(&store(), &document::split(&text)).unwrap();

        let names: Vec<_> = meta.module_configs.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["global", "common"]);

        let global = meta.module_config("global").unwrap();
        assert_eq!(global.version, 1);
        assert_eq!(global.enabled, None);
        assert_eq!(global.settings["highAvailability"], false);

        let common = meta.module_config("common").unwrap();
        assert_eq!(common.enabled, Some(false));
        assert!(common.settings.is_empty());
    }

    #[test]
    fn test_module_config_without_name_is_malformed() {
        let text = format!("{STATIC_CLUSTER}---\napiVersion: deckhouse.io/v1alpha1\nkind: ModuleConfig\nspec:\n  enabled: true\n");
        let err = MetaConfig::from_documents(&store(), &document::split(&text)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDocument);
    }

    #[test]
    fn test_resources_pass_through() {
        let text = format!(
            "{STATIC_CLUSTER}---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: d8-release-data\n---\napiVersion: deckhouse.io/v1\nkind: NodeGroup\nmetadata:\n  name: system\nspec:\n  subnet: '{{{{ .zone }}}}'\n"
        );
        let meta = MetaConfig::from_documents(&store(), &document::split(&text)).unwrap();

        assert_eq!(meta.resources.len(), 2);
        let resources = document::split(&meta.resources_yaml());
        assert_eq!(resources[0].schema_index().unwrap().kind, "ConfigMap");
        assert!(resources[1].content.contains("'{{ .zone }}'"));
    }

    #[test]
    fn test_structural_failures_are_aggregated() {
        let text = "apiVersion: deckhouse.io/v1\nkind: ClusterConfiguration\nclusterType: 1\nserviceSubnetCIDR: 10.111.0.0/16\n---\napiVersion: deckhouse.io/v1alpha1\nkind: ModuleConfig\nmetadata:\n  name: global\nspec:\n  version: x\n";
        let err = MetaConfig::from_documents(&store(), &document::split(text)).unwrap_err();
        match err {
            CoreError::StructuralValidationFailed(errors) => {
                assert_eq!(errors.documents.len(), 2);
                assert_eq!(errors.documents[0].position, 0);
                assert_eq!(errors.documents[1].position, 1);
                assert_eq!(errors.documents[1].name, "global");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_kind_without_schema_is_fatal() {
        let text = "apiVersion: deckhouse.io/v1\nkind: OpenStackClusterConfiguration\nlayout: Standard\n";
        let err = MetaConfig::from_documents(&store(), &document::split(text)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);
    }

    #[test]
    fn test_empty_stream() {
        let meta = MetaConfig::from_documents(&store(), &[]).unwrap();
        assert!(meta.cluster_config.is_empty());
        assert_eq!(meta.cluster_config_yaml().unwrap(), "");
        assert!(!meta.init_cluster_config.is_empty());
    }

    #[test]
    fn test_output_contract() {
        let meta = MetaConfig::from_documents(&store(), &document::split(STATIC_CLUSTER)).unwrap();
        let json: JsonValue = serde_json::from_str(&meta.to_json().unwrap()).unwrap();
        assert_eq!(json["clusterConfiguration"]["clusterType"], "Static");
        assert!(json.get("providerClusterConfiguration").is_none());
        assert!(json.get("staticClusterConfiguration").is_none());
    }
}
