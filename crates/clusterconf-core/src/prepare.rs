//! Derived fields and provider hooks
//!
//! After routing, [`MetaConfig::prepare`] reads the fields the installer
//! needs directly (cluster type, DNS address, layout, provider, node groups)
//! and hands the aggregate to the preparator registered for its provider.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{CoreError, Result};
use crate::meta::{ConfigFields, MetaConfig};

pub const CLOUD_CLUSTER_TYPE: &str = "Cloud";
pub const STATIC_CLUSTER_TYPE: &str = "Static";
pub const MASTER_NODE_GROUP_NAME: &str = "master";

/// Offset of the cluster DNS service inside the service subnet
const DNS_ADDRESS_OFFSET: u32 = 10;

/// Smallest number of host bits that leaves room for the DNS address
const MIN_HOST_BITS: u32 = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterNodeGroupSpec {
    #[serde(default)]
    pub replicas: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_class: Option<JsonValue>,
}

/// Provider-ordered node group other than the masters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSpec {
    pub name: String,
    #[serde(default)]
    pub replicas: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_template: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CloudSpec {
    #[serde(default)]
    provider: String,
    #[serde(default)]
    prefix: String,
}

/// Provider-specific validation and post-processing
///
/// Both hooks default to doing nothing.
pub trait ProviderPreparator: Send + Sync {
    fn validate(&self, _meta: &MetaConfig) -> Result<()> {
        Ok(())
    }

    fn prepare(&self, _meta: &mut MetaConfig) -> Result<()> {
        Ok(())
    }
}

/// Preparator used for providers without a registered one
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreparator;

impl ProviderPreparator for NoopPreparator {}

/// Preparators keyed by lower-case provider name
#[derive(Default)]
pub struct PreparatorRegistry {
    preparators: HashMap<String, Box<dyn ProviderPreparator>>,
}

impl PreparatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        provider: &str,
        preparator: impl ProviderPreparator + 'static,
    ) -> &mut Self {
        self.preparators
            .insert(provider.to_lowercase(), Box::new(preparator));
        self
    }

    /// Preparator for `provider`, falling back to [`NoopPreparator`]
    pub fn get(&self, provider: &str) -> &dyn ProviderPreparator {
        match self.preparators.get(&provider.to_lowercase()) {
            Some(preparator) => preparator.as_ref(),
            None => &NoopPreparator,
        }
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.preparators.contains_key(&provider.to_lowercase())
    }
}

impl fmt::Debug for PreparatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<_> = self.preparators.keys().collect();
        providers.sort();
        f.debug_struct("PreparatorRegistry")
            .field("providers", &providers)
            .finish()
    }
}

impl MetaConfig {
    /// Compute derived fields, then run the provider's validate and prepare hooks
    pub fn prepare(&mut self, preparators: &PreparatorRegistry) -> Result<()> {
        if !self.cluster_config.is_empty() {
            self.cluster_type = field(&self.cluster_config, "clusterType", "cluster configuration")?;
            let service_subnet: String =
                field(&self.cluster_config, "serviceSubnetCIDR", "cluster configuration")?;
            self.cluster_dns_address = cluster_dns_address(&service_subnet);
        }

        if self.cluster_type == CLOUD_CLUSTER_TYPE && !self.provider_cluster_config.is_empty() {
            let layout: String = field(
                &self.provider_cluster_config,
                "layout",
                "provider cluster configuration",
            )?;
            self.layout = to_kebab_case(&layout);

            let cloud: CloudSpec = field(&self.cluster_config, "cloud", "cluster configuration")?;
            self.provider_name = cloud.provider.to_lowercase();
            self.original_provider_name = cloud.provider;
            self.cluster_prefix = cloud.prefix;

            self.master_node_group = field(
                &self.provider_cluster_config,
                "masterNodeGroup",
                "provider cluster configuration",
            )?;

            self.node_groups = match self.provider_cluster_config.get("nodeGroups") {
                Some(_) => field(
                    &self.provider_cluster_config,
                    "nodeGroups",
                    "provider cluster configuration",
                )?,
                None => Vec::new(),
            };
        }

        tracing::debug!(
            cluster_type = %self.cluster_type,
            provider = %self.provider_name,
            layout = %self.layout,
            "prepared cluster configuration"
        );

        let preparator = preparators.get(&self.provider_name);
        preparator.validate(self)?;
        preparator.prepare(self)
    }
}

fn field<T: DeserializeOwned>(fields: &ConfigFields, name: &str, section: &str) -> Result<T> {
    let value = fields
        .get(name)
        .ok_or_else(|| CoreError::invalid_config(format!("{section} does not define '{name}'")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| CoreError::invalid_config(format!("unable to read '{name}' from {section}: {e}")))
}

/// Address of the cluster DNS service: the 10th address of the service subnet
///
/// Returns an empty string when `cidr` does not parse or the subnet is too
/// small to hold the address.
pub fn cluster_dns_address(cidr: &str) -> String {
    let Some((address, prefix)) = cidr.trim().split_once('/') else {
        tracing::debug!(cidr, "serviceSubnetCIDR is not a valid CIDR");
        return String::new();
    };
    let (Ok(address), Ok(prefix)) = (address.parse::<IpAddr>(), prefix.parse::<u32>()) else {
        tracing::debug!(cidr, "serviceSubnetCIDR is not a valid CIDR");
        return String::new();
    };

    match address {
        IpAddr::V4(ip) => {
            if prefix > 32 || 32 - prefix < MIN_HOST_BITS {
                return String::new();
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            Ipv4Addr::from((u32::from(ip) & mask) + DNS_ADDRESS_OFFSET).to_string()
        }
        IpAddr::V6(ip) => {
            if prefix > 128 || 128 - prefix < MIN_HOST_BITS {
                return String::new();
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            Ipv6Addr::from((u128::from(ip) & mask) + u128::from(DNS_ADDRESS_OFFSET)).to_string()
        }
    }
}

/// Convert a PascalCase layout name to kebab-case (`WithoutNAT` -> `without-nat`)
pub fn to_kebab_case(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | ' ' | '-' | '.') {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }

        if c.is_uppercase() && i > 0 && !out.is_empty() && !out.ends_with('-') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                out.push('-');
            }
        }
        out.extend(c.to_lowercase());
    }

    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cluster_dns_address() {
        assert_eq!(cluster_dns_address("10.111.0.0/16"), "10.111.0.10");
        assert_eq!(cluster_dns_address("10.222.5.7/24"), "10.222.5.10");
        assert_eq!(cluster_dns_address("192.168.1.16/28"), "192.168.1.26");
        assert_eq!(cluster_dns_address("fd00::/112"), "fd00::a");
    }

    #[test]
    fn test_cluster_dns_address_rejects_small_or_invalid() {
        assert_eq!(cluster_dns_address("10.0.0.0/29"), "");
        assert_eq!(cluster_dns_address("10.0.0.0/32"), "");
        assert_eq!(cluster_dns_address("10.0.0.0/33"), "");
        assert_eq!(cluster_dns_address("10.0.0.0"), "");
        assert_eq!(cluster_dns_address("not-a-cidr/16"), "");
        assert_eq!(cluster_dns_address(""), "");
    }

    #[test]
    fn test_to_kebab_case() {
        assert_eq!(to_kebab_case("WithoutNAT"), "without-nat");
        assert_eq!(to_kebab_case("Standard"), "standard");
        assert_eq!(to_kebab_case("WithNATInstance"), "with-nat-instance");
        assert_eq!(to_kebab_case("StandardWithNoRouter"), "standard-with-no-router");
        assert_eq!(to_kebab_case("already-kebab"), "already-kebab");
        assert_eq!(to_kebab_case("Simple_Layout"), "simple-layout");
    }

    fn fields(value: JsonValue) -> ConfigFields {
        match value {
            JsonValue::Object(map) => map.into_iter().collect(),
            _ => unreachable!(),
        }
    }

    fn cloud_meta() -> MetaConfig {
        MetaConfig {
            cluster_config: fields(json!({
                "clusterType": "Cloud",
                "serviceSubnetCIDR": "10.111.0.0/16",
                "cloud": {"provider": "Yandex", "prefix": "prod"}
            })),
            provider_cluster_config: fields(json!({
                "layout": "WithoutNAT",
                "masterNodeGroup": {"replicas": 3, "zones": ["a", "b"]},
                "nodeGroups": [
                    {"name": "front", "replicas": 2, "nodeTemplate": {"labels": {"role": "front"}}}
                ]
            })),
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_cloud_cluster() {
        let mut meta = cloud_meta();
        meta.prepare(&PreparatorRegistry::new()).unwrap();

        assert_eq!(meta.cluster_type, CLOUD_CLUSTER_TYPE);
        assert_eq!(meta.cluster_dns_address, "10.111.0.10");
        assert_eq!(meta.layout, "without-nat");
        assert_eq!(meta.provider_name, "yandex");
        assert_eq!(meta.original_provider_name, "Yandex");
        assert_eq!(meta.cluster_prefix, "prod");
        assert_eq!(meta.master_node_group.replicas, 3);
        assert_eq!(meta.replicas_by_node_group(MASTER_NODE_GROUP_NAME), 3);
        assert_eq!(meta.replicas_by_node_group("front"), 2);
        assert_eq!(meta.replicas_by_node_group("missing"), 0);
        assert_eq!(
            meta.find_node_group("front").unwrap()["nodeTemplate"]["labels"]["role"],
            "front"
        );
        assert_eq!(meta.cache_path(), "prod-yandex-terraform-state-cache");

        let manifest = meta.node_group_manifest(&meta.node_groups[0]);
        assert_eq!(manifest["spec"]["nodeType"], "CloudPermanent");
        assert_eq!(manifest["metadata"]["name"], "front");
    }

    #[test]
    fn test_prepare_static_cluster_skips_provider_fields() {
        let mut meta = MetaConfig {
            cluster_config: fields(json!({"clusterType": "Static", "serviceSubnetCIDR": "10.111.0.0/16"})),
            static_cluster_config: fields(json!({"internalNetworkCIDRs": ["192.168.0.0/24"]})),
            ..Default::default()
        };
        meta.prepare(&PreparatorRegistry::new()).unwrap();

        assert!(meta.is_static());
        assert_eq!(meta.layout, "");
        assert_eq!(meta.provider_name, "");
        assert_eq!(meta.internal_network_cidrs(), vec!["192.168.0.0/24".to_string()]);
    }

    #[test]
    fn test_prepare_requires_cluster_type() {
        let mut meta = MetaConfig {
            cluster_config: fields(json!({"serviceSubnetCIDR": "10.111.0.0/16"})),
            ..Default::default()
        };
        let err = meta.prepare(&PreparatorRegistry::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(err.to_string().contains("clusterType"));
    }

    #[test]
    fn test_prepare_empty_configuration() {
        let mut meta = MetaConfig::default();
        meta.prepare(&PreparatorRegistry::new()).unwrap();
        assert_eq!(meta.cluster_type, "");
    }

    struct CountingPreparator {
        calls: Arc<AtomicUsize>,
    }

    impl ProviderPreparator for CountingPreparator {
        fn validate(&self, meta: &MetaConfig) -> Result<()> {
            if meta.master_node_group.replicas > 5 {
                return Err(CoreError::invalid_config("too many masters"));
            }
            Ok(())
        }

        fn prepare(&self, meta: &mut MetaConfig) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            meta.cluster_prefix = format!("{}-yc", meta.cluster_prefix);
            Ok(())
        }
    }

    #[test]
    fn test_provider_preparator_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = PreparatorRegistry::new();
        registry.register(
            "Yandex",
            CountingPreparator {
                calls: Arc::clone(&calls),
            },
        );
        assert!(registry.contains("yandex"));

        let mut meta = cloud_meta();
        meta.prepare(&registry).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(meta.cluster_prefix, "prod-yc");
    }

    #[test]
    fn test_provider_validate_rejects() {
        let mut registry = PreparatorRegistry::new();
        registry.register(
            "yandex",
            CountingPreparator {
                calls: Arc::new(AtomicUsize::new(0)),
            },
        );

        let mut meta = cloud_meta();
        meta.provider_cluster_config["masterNodeGroup"] = json!({"replicas": 7});
        let err = meta.prepare(&registry).unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: too many masters");
    }
}
