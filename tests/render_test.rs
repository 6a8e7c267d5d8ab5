//! Integration tests for rendering configuration snapshots read from disk
//!
//! Each test writes a YAML snapshot the way an operator loop would serialize
//! it, loads it through `LogStorageConfig::from_yaml_file` and checks the
//! reconcile output.

use std::io::Write;

use logstorage_operator::controller::{self, LifecyclePhase, LogStorageConfig, Stage};
use logstorage_operator::crd::LicenseType;
use logstorage_operator::Error;

fn write_snapshot(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(yaml.as_bytes()).expect("write snapshot");
    file
}

const STANDALONE: &str = r#"
logStorage:
  apiVersion: operator.tigera.io/v1
  kind: LogStorage
  metadata:
    name: tigera-secure
    finalizers:
      - tigera.io/eck-cleanup
  spec:
    nodes:
      count: 1
    retention:
      flows: 14
installation:
  registry: quay.io/
license: basic
pullSecrets:
  - metadata:
      name: tigera-pull-secret
elasticsearchSecrets:
  - metadata:
      name: tigera-secure-elasticsearch-cert
      namespace: tigera-operator
kibanaCertSecret:
  metadata:
    name: tigera-secure-kibana-cert
    namespace: tigera-operator
esService:
  metadata:
    name: tigera-secure-es-http
    namespace: tigera-elasticsearch
  spec:
    type: ExternalName
    externalName: tigera-guardian.tigera-guardian.svc.cluster.local
"#;

#[test]
fn test_standalone_snapshot_renders_stack() {
    let file = write_snapshot(STANDALONE);
    let cfg = LogStorageConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(cfg.license, LicenseType::Basic);
    assert_eq!(cfg.cluster_domain, "cluster.local");

    let rec = controller::reconcile(&cfg).unwrap();
    assert_eq!(rec.phase, LifecyclePhase::Provisioning);
    assert_eq!(rec.finalizers, vec!["tigera.io/eck-cleanup".to_string()]);

    let kinds: Vec<&str> = rec.to_create.iter().map(|m| m.kind()).collect();
    let es = kinds.iter().position(|k| *k == "Elasticsearch").unwrap();
    let kb = kinds.iter().position(|k| *k == "Kibana").unwrap();
    let operator = kinds.iter().position(|k| *k == "StatefulSet").unwrap();
    assert!(operator < es);
    assert!(es < kb);
    assert_eq!(kinds[0], "Namespace");

    let elasticsearch = rec.to_create[es].as_elasticsearch().unwrap();
    assert_eq!(elasticsearch.spec.node_sets.len(), 1);

    // Curator is not rendered until both children report ready
    assert!(!kinds.contains(&"CronJob"));

    assert_eq!(rec.to_delete.len(), 1);
    assert_eq!(rec.to_delete[0].name(), "tigera-secure-es-http");
}

#[test]
fn test_included_stages_follow_snapshot() {
    let file = write_snapshot(STANDALONE);
    let cfg = LogStorageConfig::from_yaml_file(file.path()).unwrap();
    let stages = controller::included_stages(&cfg);
    assert_eq!(stages.first(), Some(&Stage::EckOperatorNamespace));
    assert!(!stages.contains(&Stage::Curator));
    assert!(!stages.contains(&Stage::ManagedNamespace));
}

#[test]
fn test_managed_snapshot_renders_gateway() {
    let file = write_snapshot(
        r#"
logStorage:
  apiVersion: operator.tigera.io/v1
  kind: LogStorage
  metadata:
    name: tigera-secure
  spec: {}
federation: Managed
clusterDomain: example.internal
"#,
    );
    let cfg = LogStorageConfig::from_yaml_file(file.path()).unwrap();
    let rec = controller::reconcile(&cfg).unwrap();

    let names: Vec<&str> = rec.to_create.iter().map(|m| m.name()).collect();
    assert_eq!(names, vec!["tigera-elasticsearch", "tigera-secure-es-gateway-http"]);
    let svc = rec.to_create[1].as_service().unwrap();
    assert_eq!(
        svc.spec.as_ref().unwrap().external_name.as_deref(),
        Some("tigera-guardian.tigera-guardian.svc.example.internal")
    );
}

#[test]
fn test_managed_snapshot_without_log_storage() {
    let file = write_snapshot("federation: Managed\n");
    let cfg = LogStorageConfig::from_yaml_file(file.path()).unwrap();
    assert!(cfg.log_storage.is_none());

    let rec = controller::reconcile(&cfg).unwrap();
    assert_eq!(rec.phase, LifecyclePhase::Provisioning);
    assert!(rec.finalizers.is_empty());

    let ids: Vec<String> = rec.to_create.iter().map(|m| m.id().to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "Namespace/tigera-elasticsearch",
            "Service/tigera-elasticsearch/tigera-secure-es-gateway-http",
        ]
    );
    assert!(rec.to_delete.is_empty());
}

#[test]
fn test_deleting_snapshot_tears_down_children() {
    let file = write_snapshot(
        r#"
logStorage:
  apiVersion: operator.tigera.io/v1
  kind: LogStorage
  metadata:
    name: tigera-secure
    deletionTimestamp: "2024-05-01T12:00:00Z"
    finalizers:
      - tigera.io/eck-cleanup
  spec: {}
elasticsearch:
  apiVersion: elasticsearch.k8s.elastic.co/v1
  kind: Elasticsearch
  metadata:
    name: tigera-secure
    namespace: tigera-elasticsearch
  spec:
    version: 7.17.18
kibana:
  apiVersion: kibana.k8s.elastic.co/v1
  kind: Kibana
  metadata:
    name: tigera-secure
    namespace: tigera-kibana
    deletionTimestamp: "2024-05-01T12:00:00Z"
  spec:
    version: 7.17.18
    count: 1
"#,
    );
    let cfg = LogStorageConfig::from_yaml_file(file.path()).unwrap();
    let rec = controller::reconcile(&cfg).unwrap();

    assert!(rec.to_create.is_empty());
    assert_eq!(rec.to_delete.len(), 1);
    assert_eq!(rec.to_delete[0].kind(), "Elasticsearch");
    assert!(!rec.finalizer_removable());
}

#[test]
fn test_invalid_snapshot_is_rejected() {
    let file = write_snapshot(
        r#"
logStorage:
  apiVersion: operator.tigera.io/v1
  kind: LogStorage
  metadata:
    name: tigera-secure
  spec:
    nodes:
      count: -1
"#,
    );
    let cfg = LogStorageConfig::from_yaml_file(file.path()).unwrap();
    match controller::reconcile(&cfg) {
        Err(Error::ValidationError(errors)) => {
            assert_eq!(errors[0].field, "spec.nodes.count");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_malformed_snapshot_fails_to_load() {
    let file = write_snapshot("logStorage: [not, a, resource]\n");
    assert!(matches!(
        LogStorageConfig::from_yaml_file(file.path()),
        Err(Error::YamlError(_))
    ));
}
