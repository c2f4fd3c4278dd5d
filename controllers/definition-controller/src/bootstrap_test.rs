//! Unit tests for bootstrap

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::test_utils::*;
    use cluster_client::MockClusterClient;
    use cluster_client::mock::{MockFailure, MockOperation};
    use serde_json::json;

    const SOURCE: (&str, &str) = ("main.rhai", "fn reconcile(request) { #{ apply: [] } }");

    fn widget_crd(versions: serde_json::Value) -> Value {
        json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "widgets.example.com"},
            "spec": {
                "group": "example.com",
                "names": {"kind": "Widget", "plural": "widgets"},
                "scope": "Namespaced",
                "versions": versions
            }
        })
    }

    fn legacy_definition(name: &str) -> Value {
        let mut definition = create_test_definition(name, &[SOURCE], &[], json!([]));
        let spec = definition["spec"].as_object_mut().unwrap();
        spec.remove("for");
        spec.insert("crdName".to_string(), json!("widgets.example.com"));
        definition
    }

    async fn resolve(mock: &MockClusterClient, definition: &Value) -> Result<Option<ResourceType>, ControllerError> {
        resolve_main_type(mock, &parse_definition(definition.clone()).unwrap()).await
    }

    #[tokio::test]
    async fn test_main_type_from_for() {
        let mock = create_test_cluster();
        let definition = create_test_definition("widgets", &[SOURCE], &[], json!([]));
        assert_eq!(resolve(&mock, &definition).await.unwrap(), Some(widget_type()));
    }

    #[tokio::test]
    async fn test_legacy_crd_name_uses_storage_version() {
        let mock = create_test_cluster();
        mock.insert(widget_crd(json!([
            {"name": "v1beta1", "served": true, "storage": false},
            {"name": "v1", "served": true, "storage": true}
        ])));

        let resolved = resolve(&mock, &legacy_definition("widgets")).await.unwrap();
        assert_eq!(resolved, Some(widget_type()));
    }

    #[tokio::test]
    async fn test_legacy_crd_without_storage_version_is_invalid() {
        let mock = create_test_cluster();
        mock.insert(widget_crd(json!([{"name": "v1", "served": true, "storage": false}])));

        let err = resolve(&mock, &legacy_definition("widgets")).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidDefinition(ref name, _) if name == "widgets"));
    }

    #[tokio::test]
    async fn test_legacy_crd_missing_means_no_main_type() {
        let mock = create_test_cluster();
        assert_eq!(resolve(&mock, &legacy_definition("widgets")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_definition_without_main_type_selector_is_invalid() {
        let mock = create_test_cluster();
        let mut definition = create_test_definition("widgets", &[SOURCE], &[], json!([]));
        definition["spec"].as_object_mut().unwrap().remove("for");

        assert!(matches!(
            resolve(&mock, &definition).await.unwrap_err(),
            ControllerError::InvalidDefinition(_, _)
        ));
    }

    #[tokio::test]
    async fn test_supported_and_watched_sets() {
        let mock = create_test_cluster();
        mock.insert(create_test_definition(
            "widgets",
            &[SOURCE],
            &[
                ("v1", "Service", true),
                ("v1", "ConfigMap", false),
                ("apps/v1", "Deployment", true),
                ("v1", "Service", true),
            ],
            json!([]),
        ));

        let Bootstrap { controllers, registry } = bootstrap(&mock, DEFINITION_NAMESPACE).await.unwrap();
        assert_eq!(controllers.len(), 1);
        let info = &controllers[0];
        assert_eq!(info.main_type, widget_type());
        assert_eq!(info.main.plural, "widgets");

        let supported: Vec<_> = info.supported().into_keys().collect();
        assert_eq!(supported, vec![ResourceType::config_map().key(), service_type().key()]);

        let watched: Vec<_> = info.watched().into_iter().map(|(ty, _)| ty.clone()).collect();
        assert_eq!(watched, vec![service_type()]);

        assert_eq!(info.unsupported(), vec![deployment_type()]);
        assert!(info.supported_type(&deployment_type()).is_none());
        assert_eq!(registry.get("widgets").unwrap().unsupported, vec![deployment_type()]);
    }

    #[tokio::test]
    async fn test_unusable_definitions_are_skipped() {
        let mock = create_test_cluster();
        mock.insert(create_test_definition("widgets", &[SOURCE], &[], json!([])));

        let mut gadgets = create_test_definition("gadgets", &[SOURCE], &[], json!([]));
        gadgets["spec"]["for"] = json!({"apiVersion": "example.com/v1", "kind": "Gadget"});
        mock.insert(gadgets);

        let mut malformed = create_test_definition("malformed", &[SOURCE], &[], json!([]));
        malformed["spec"]["dependencies"] = json!("not-a-list");
        mock.insert(malformed);

        let mut invalid = create_test_definition("invalid", &[SOURCE], &[], json!([]));
        invalid["spec"].as_object_mut().unwrap().remove("for");
        mock.insert(invalid);

        let Bootstrap { controllers, registry } = bootstrap(&mock, DEFINITION_NAMESPACE).await.unwrap();
        let names: Vec<_> = controllers.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["widgets"]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("gadgets").is_none());
    }

    #[tokio::test]
    async fn test_list_error_aborts_bootstrap() {
        let mock = create_test_cluster();
        mock.insert(create_test_definition("widgets", &[SOURCE], &[("v1", "Service", true)], json!([])));
        mock.fail_on(MockOperation::List, service_type(), MockFailure::Timeout);

        let err = bootstrap(&mock, DEFINITION_NAMESPACE).await.unwrap_err();
        assert!(matches!(err, ControllerError::Cluster(ref e) if !e.is_not_found()));
    }

    #[tokio::test]
    async fn test_not_found_on_list_means_unsupported() {
        let mock = create_test_cluster();
        mock.insert(create_test_definition("widgets", &[SOURCE], &[("v1", "Service", true)], json!([])));
        mock.fail_on(MockOperation::List, service_type(), MockFailure::NotFound);

        let Bootstrap { controllers, .. } = bootstrap(&mock, DEFINITION_NAMESPACE).await.unwrap();
        assert_eq!(controllers[0].unsupported(), vec![service_type()]);
        assert!(controllers[0].watched().is_empty());
    }
}
