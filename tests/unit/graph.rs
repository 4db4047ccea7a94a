//! Unit tests for staged object graph commits

use component_operator::client::{MemoryClient, Operation};
use component_operator::crd::{Component, ComponentPhase, ComponentStatus};
use component_operator::graph::{Dag, GraphClient, ObjectAction};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::common::*;

fn config_map(name: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_status_and_spec_vertices_are_distinct() {
    let graph = GraphClient::new();
    let mut dag = Dag::new();
    let comp = ComponentBuilder::new("mycluster", "mysql", NAMESPACE).build();
    let mut modified = comp.clone();
    modified
        .annotations_mut()
        .insert("a".to_string(), "b".to_string());

    let spec = graph.update(&mut dag, &comp, &modified).unwrap();
    let status = graph.status(&mut dag, &comp, &modified).unwrap();
    assert_ne!(spec, status);
    assert_eq!(dag.len(), 2);
    assert_eq!(dag.vertex(status).unwrap().action, ObjectAction::Status);
}

#[test]
fn test_delete_overrides_earlier_intents() {
    let graph = GraphClient::new();
    let mut dag = Dag::new();
    let obj = config_map("a");
    graph.create(&mut dag, &obj).unwrap();
    graph.delete(&mut dag, &obj).unwrap();
    graph.patch(&mut dag, &obj, &obj).unwrap();

    assert_eq!(dag.len(), 1);
    assert_eq!(dag.vertex(0).unwrap().action, ObjectAction::Delete);
}

#[tokio::test]
async fn test_commit_stops_at_first_failure() {
    let client = MemoryClient::new();
    seed(&client, &[config_map("taken")]);
    let graph = GraphClient::new();
    let mut dag = Dag::new();
    graph.create(&mut dag, &config_map("first")).unwrap();
    graph.create(&mut dag, &config_map("taken")).unwrap();
    graph.create(&mut dag, &config_map("last")).unwrap();

    let err = dag.commit(&client).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(client.object::<ConfigMap>(NAMESPACE, "first").is_some());
    assert!(client.object::<ConfigMap>(NAMESPACE, "last").is_none());
    assert_eq!(client.operations().len(), 1);
}

#[tokio::test]
async fn test_stale_update_conflicts() {
    let client = MemoryClient::new();
    let stored = client.insert(&config_map("a")).unwrap();
    // someone else writes in between
    client.insert(&stored).unwrap();

    let graph = GraphClient::new();
    let mut dag = Dag::new();
    let mut modified = stored.clone();
    modified.data = Some([("k".to_string(), "v".to_string())].into());
    graph.update(&mut dag, &stored, &modified).unwrap();

    assert!(dag.commit(&client).await.unwrap_err().is_conflict());
}

#[tokio::test]
async fn test_status_commit_leaves_spec_untouched() {
    let client = MemoryClient::new();
    let stored = client
        .insert(&ComponentBuilder::new("mycluster", "mysql", NAMESPACE).build())
        .unwrap();

    let mut modified: Component = stored.clone();
    modified.spec.replicas = 9;
    modified.status = Some(ComponentStatus {
        phase: ComponentPhase::Running,
        ..Default::default()
    });
    let mut dag = Dag::new();
    GraphClient::new()
        .status(&mut dag, &stored, &modified)
        .unwrap();
    dag.commit(&client).await.unwrap();

    let current: Component = client.object(NAMESPACE, "mycluster-mysql").unwrap();
    assert_eq!(current.phase(), Some(&ComponentPhase::Running));
    assert_eq!(current.spec.replicas, 1);
    assert!(matches!(client.operations()[0], Operation::PatchStatus(_)));
}
