//! Unit tests for the LogStorage lifecycle state machine.

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use crate::controller::config::{FederationRole, LogStorageConfig};
    use crate::controller::constants::LOG_STORAGE_FINALIZER;
    use crate::controller::lifecycle::{
        has_finalizer, is_being_deleted, reconcile, with_finalizer, without_finalizer, ChildRef,
        LifecyclePhase,
    };
    use crate::controller::manifest::Manifest;
    use crate::crd::{
        Elasticsearch, ElasticsearchSpec, Kibana, KibanaSpec, LogStorage, LogStorageSpec, Nodes,
    };
    use crate::error::Error;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn deletion_time() -> Time {
        Time(chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc))
    }

    fn log_storage(deleting: bool) -> LogStorage {
        let mut ls = LogStorage::new(
            "tigera-secure",
            LogStorageSpec {
                nodes: Some(Nodes {
                    count: 1,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        ls.metadata.finalizers = Some(vec![LOG_STORAGE_FINALIZER.to_string()]);
        if deleting {
            ls.metadata.deletion_timestamp = Some(deletion_time());
        }
        ls
    }

    fn elasticsearch(deleting: bool) -> Elasticsearch {
        let mut es = Elasticsearch::new("tigera-secure", ElasticsearchSpec::default());
        es.metadata.namespace = Some("tigera-elasticsearch".to_string());
        if deleting {
            es.metadata.deletion_timestamp = Some(deletion_time());
        }
        es
    }

    fn kibana(deleting: bool) -> Kibana {
        let mut kb = Kibana::new("tigera-secure", KibanaSpec::default());
        kb.metadata.namespace = Some("tigera-kibana".to_string());
        if deleting {
            kb.metadata.deletion_timestamp = Some(deletion_time());
        }
        kb
    }

    fn snapshot(
        parent_deleting: bool,
        es: Option<Elasticsearch>,
        kb: Option<Kibana>,
    ) -> LogStorageConfig {
        LogStorageConfig {
            log_storage: Some(log_storage(parent_deleting)),
            elasticsearch: es,
            kibana: kb,
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    #[test]
    fn test_provisioning_renders_full_stack() {
        let cfg = snapshot(false, Some(elasticsearch(false)), Some(kibana(false)));
        let rec = reconcile(&cfg).unwrap();
        assert_eq!(rec.phase, LifecyclePhase::Provisioning);
        assert!(!rec.to_create.is_empty());
        assert!(rec.to_delete.is_empty());
        assert!(!rec.finalizer_removable());
    }

    #[test]
    fn test_terminating_deletes_children() {
        let cfg = snapshot(true, Some(elasticsearch(false)), Some(kibana(false)));
        let rec = reconcile(&cfg).unwrap();

        assert!(rec.to_create.is_empty());
        assert_eq!(
            rec.to_delete,
            vec![
                Manifest::from(elasticsearch(false)),
                Manifest::from(kibana(false)),
            ]
        );
        assert_eq!(rec.finalizers, vec![LOG_STORAGE_FINALIZER.to_string()]);
        assert!(!rec.finalizer_removable());

        match rec.phase {
            LifecyclePhase::Terminating { pending } => {
                assert_eq!(
                    pending,
                    vec![
                        ChildRef {
                            kind: "Elasticsearch",
                            name: "tigera-secure".to_string(),
                            namespace: Some("tigera-elasticsearch".to_string()),
                        },
                        ChildRef {
                            kind: "Kibana",
                            name: "tigera-secure".to_string(),
                            namespace: Some("tigera-kibana".to_string()),
                        },
                    ]
                );
            }
            other => panic!("unexpected phase: {other:?}"),
        }
    }

    #[test]
    fn test_terminating_deletes_only_live_children() {
        let cfg = snapshot(true, Some(elasticsearch(true)), Some(kibana(false)));
        let rec = reconcile(&cfg).unwrap();
        assert_eq!(rec.to_delete, vec![Manifest::from(kibana(false))]);
    }

    #[test]
    fn test_idle_while_children_are_deleted() {
        let cfg = snapshot(true, Some(elasticsearch(true)), Some(kibana(true)));
        let rec = reconcile(&cfg).unwrap();
        assert_eq!(rec.phase, LifecyclePhase::AwaitingChildRemoval);
        assert!(rec.to_create.is_empty());
        assert!(rec.to_delete.is_empty());
        assert_eq!(rec.finalizers, vec![LOG_STORAGE_FINALIZER.to_string()]);
        assert!(!rec.finalizer_removable());
    }

    #[test]
    fn test_released_once_children_are_gone() {
        let cfg = snapshot(true, None, None);
        let rec = reconcile(&cfg).unwrap();
        assert_eq!(rec.phase, LifecyclePhase::Released);
        assert!(rec.to_create.is_empty());
        assert!(rec.to_delete.is_empty());
        assert!(rec.finalizer_removable());
    }

    #[test]
    fn test_teardown_ignores_invalid_spec() {
        let mut cfg = snapshot(true, Some(elasticsearch(false)), None);
        if let Some(ls) = cfg.log_storage.as_mut() {
            ls.spec.nodes = Some(Nodes {
                count: -1,
                ..Default::default()
            });
        }
        let rec = reconcile(&cfg).unwrap();
        assert_eq!(rec.to_delete.len(), 1);
    }

    #[test]
    fn test_missing_log_storage_is_an_error() {
        let cfg = LogStorageConfig::default();
        assert!(matches!(reconcile(&cfg), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_managed_cluster_provisions_without_log_storage() {
        let cfg = LogStorageConfig {
            federation: FederationRole::Managed,
            ..Default::default()
        };
        let rec = reconcile(&cfg).unwrap();
        assert_eq!(rec.phase, LifecyclePhase::Provisioning);
        assert_eq!(rec.to_create.len(), 2);
        assert!(rec.to_delete.is_empty());
        assert!(rec.finalizers.is_empty());
    }

    // -----------------------------------------------------------------------
    // Finalizers
    // -----------------------------------------------------------------------

    #[test]
    fn test_finalizer_helpers() {
        let ls = log_storage(true);
        assert!(is_being_deleted(&ls));
        assert!(has_finalizer(&ls));
        assert!(!is_being_deleted(&log_storage(false)));

        let others = vec!["foregroundDeletion".to_string()];
        let added = with_finalizer(&others);
        assert_eq!(added, vec!["foregroundDeletion", LOG_STORAGE_FINALIZER]);
        assert_eq!(with_finalizer(&added), added);
        assert_eq!(without_finalizer(&added), others);
    }
}
