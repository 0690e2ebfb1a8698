//! Change safety checks against the shared fixtures tree

use clusterconf_core::{
    ChangeValidator, CoreError, ErrorKind, OperationPhase, RuleKind, SchemaStore,
    validate_cluster_settings_changes,
};
use std::path::PathBuf;

fn fixtures_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures"))
}

fn store() -> SchemaStore {
    SchemaStore::from_paths([fixtures_path().join("schemas")]).expect("fixture schemas load")
}

fn config(name: &str) -> String {
    std::fs::read_to_string(fixtures_path().join("configs").join(name)).unwrap()
}

fn compare(old: &str, new: &str) -> clusterconf_core::error::Result<()> {
    let store = store();
    ChangeValidator::new(&store).compare(OperationPhase::AllNodes, old, new)
}

fn rule_failure(err: CoreError) -> (String, RuleKind) {
    match err {
        CoreError::ValidationRuleFailed { path, rule, .. } => (path, rule),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unchanged_configuration_is_safe() {
    let cloud = config("cloud.yaml");
    compare(&cloud, &cloud).unwrap();
}

#[test]
fn test_base_infra_accepts_anything() {
    let store = store();
    for (old, new) in [
        (config("cloud.yaml"), config("cloud-pod-subnet.yaml")),
        (config("cloud.yaml"), config("cloud-single-master.yaml")),
        (String::new(), config("static.yaml")),
        (config("malformed.yaml"), "{{ not yaml".to_string()),
    ] {
        validate_cluster_settings_changes(&store, OperationPhase::BaseInfra, &old, &new).unwrap();
    }
}

#[test]
fn test_scale_masters_down_to_one_is_rejected() {
    let old = config("cloud.yaml");
    let new = old.replace("  replicas: 3\n", "  replicas: 1\n");

    let (path, rule) = rule_failure(compare(&old, &new).unwrap_err());
    assert_eq!(path, "masterNodeGroup.replicas");
    assert_eq!(rule, RuleKind::UpdateReplicas);
}

#[test]
fn test_scale_masters_down_to_two_is_allowed() {
    let old = config("cloud.yaml");
    let new = old.replace("  replicas: 3\n", "  replicas: 2\n");
    compare(&old, &new).unwrap();
}

#[test]
fn test_scale_masters_up_is_allowed() {
    let old = config("cloud.yaml").replace("  replicas: 3\n", "  replicas: 1\n");
    let new = config("cloud.yaml");
    compare(&old, &new).unwrap();
}

#[test]
fn test_zero_masters_are_rejected_even_when_unchanged() {
    let config = config("cloud.yaml").replace("  replicas: 3\n", "  replicas: 0\n");

    let (path, rule) = rule_failure(compare(&config, &config).unwrap_err());
    assert_eq!(path, "masterNodeGroup.replicas");
    assert_eq!(rule, RuleKind::UpdateReplicas);
}

#[test]
fn test_delete_zone_with_single_master_is_rejected() {
    let old = config("cloud.yaml").replace("  replicas: 3\n", "  replicas: 1\n");
    let new = config("cloud-single-master.yaml");

    let (path, rule) = rule_failure(compare(&old, &new).unwrap_err());
    assert_eq!(path, "(root)");
    assert_eq!(rule, RuleKind::DeleteZones);
}

#[test]
fn test_delete_zone_with_three_masters_is_allowed() {
    let old = config("cloud.yaml");
    let new = old.replace("- ru-central1-b\n", "");
    assert_ne!(old, new);
    compare(&old, &new).unwrap();
}

#[test]
fn test_immutable_field_change_is_rejected() {
    let err = compare(&config("cloud.yaml"), &config("cloud-pod-subnet.yaml")).unwrap_err();
    match err {
        CoreError::UnsafeFieldChanged { index, path } => {
            assert_eq!(index.kind, "ClusterConfiguration");
            assert_eq!(path, "podSubnetCIDR");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_nested_immutable_field_change_is_rejected() {
    let old = config("cloud.yaml");
    let new = old.replacen("imageID: fd80bm0rh4rkepi5ksdi", "imageID: fd8new", 1);

    match compare(&old, &new).unwrap_err() {
        CoreError::UnsafeFieldChanged { path, .. } => {
            assert_eq!(path, "masterNodeGroup.instanceClass.imageID");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_node_group_items_are_not_walked() {
    let old = config("cloud.yaml");
    let new = old.replace(
        "  nodeTemplate:\n    labels:\n      role: front\n",
        "  nodeTemplate:\n    labels:\n      role: back\n",
    );
    assert_ne!(old, new);
    compare(&old, &new).unwrap();
}

#[test]
fn test_added_configuration_document_is_rejected() {
    let old = config("cloud.yaml");
    let new = format!(
        "{old}---\napiVersion: deckhouse.io/v1\nkind: StaticClusterConfiguration\ninternalNetworkCIDRs: [192.168.0.0/24]\n"
    );
    assert_eq!(
        compare(&old, &new).unwrap_err().kind(),
        ErrorKind::ConfigAmountChanged
    );
}

#[test]
fn test_replaced_configuration_document_is_rejected() {
    let old = format!(
        "{}---\napiVersion: deckhouse.io/v1\nkind: StaticClusterConfiguration\n",
        config("cloud.yaml")
    );
    let new = format!(
        "{}---\napiVersion: deckhouse.io/v1alpha1\nkind: ModuleConfig\nmetadata:\n  name: global\n",
        config("cloud.yaml")
    );

    match compare(&old, &new).unwrap_err() {
        CoreError::AdditionalConfig { index } => assert_eq!(index.kind, "ModuleConfig"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_resources_never_affect_safety() {
    let old = config("cloud.yaml");
    let without_resources: String = old.split("---").take(2).collect::<Vec<_>>().join("---");
    let changed_resource = old.replace("nodeType: CloudEphemeral", "nodeType: CloudPermanent");
    let more_resources = format!("{old}---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: extra\n");

    for new in [without_resources, changed_resource, more_resources] {
        compare(&old, &new).unwrap();
    }
}

#[test]
fn test_module_configs_collapse_by_index() {
    let base = config("cloud.yaml");
    let global = "---\napiVersion: deckhouse.io/v1alpha1\nkind: ModuleConfig\nmetadata:\n  name: global\nspec:\n  version: 1\n";
    let common = "---\napiVersion: deckhouse.io/v1alpha1\nkind: ModuleConfig\nmetadata:\n  name: common\nspec:\n  version: 1\n";

    let old = format!("{base}{global}");
    let new = format!("{base}{global}{common}");
    compare(&old, &new).unwrap();
}

#[test]
fn test_malformed_old_configuration_fails() {
    assert_eq!(
        compare(&config("malformed.yaml"), &config("cloud.yaml"))
            .unwrap_err()
            .kind(),
        ErrorKind::MalformedDocument
    );
}

#[test]
fn test_every_non_bypass_phase_is_checked() {
    let store = store();
    let old = config("cloud.yaml");
    let new = config("cloud-pod-subnet.yaml");

    for phase in OperationPhase::ALL {
        let result = validate_cluster_settings_changes(&store, phase, &old, &new);
        assert_eq!(result.is_ok(), phase.bypasses_change_safety(), "phase {phase}");
    }
}
