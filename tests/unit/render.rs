//! Unit tests for action Job rendering

use component_operator::client::MemoryClient;
use component_operator::component::SynthesizedComponent;
use component_operator::crd::{Cluster, Component, ComponentPhase};
use component_operator::lifecycle::render::{
    ACTION_CONTAINER_NAME, COMPONENT_DELETING_LIST, COMPONENT_IS_SCALING_IN, COMPONENT_LIST,
    COMPONENT_POD_IP_LIST, COMPONENT_POD_NAME_LIST, COMPONENT_UNDELETED_LIST,
    CLUSTER_POD_NAME_LIST,
};
use component_operator::lifecycle::{ActionContext, LifecycleActionType, render_action_job};
use component_operator::resources::common::COMPONENT_SCALE_IN_ANNOTATION_KEY;
use component_operator::{Error, FINALIZER};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Container, EnvVar, Toleration};

use crate::common::*;

fn container(job: &Job) -> &Container {
    &job.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
}

fn env_value<'a>(envs: &'a [EnvVar], name: &str) -> Option<&'a str> {
    envs.iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.as_deref())
}

fn mysql(cluster: &Cluster) -> ComponentBuilder {
    ComponentBuilder::new(&cluster.metadata.name.clone().unwrap(), "mysql", NAMESPACE)
        .with_replicas(2)
        .with_phase(ComponentPhase::Running)
}

async fn render(
    client: &MemoryClient,
    cluster: &Cluster,
    comp: &Component,
    action_type: LifecycleActionType,
    tolerations: &[Toleration],
) -> Result<Job, Error> {
    let synth = SynthesizedComponent::build(cluster, comp)?;
    let ctx = ActionContext {
        cluster,
        synth: &synth,
        action_type,
        data_plane_tolerations: tolerations,
    };
    render_action_job(client, &ctx).await
}

mod job_shape_tests {
    use super::*;

    #[tokio::test]
    async fn test_job_named_and_labelled_after_action() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster)
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        seed(&client, &[PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build()]);

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();

        assert_eq!(
            job.metadata.name.as_deref(),
            Some("kb-post-provision-job-mycluster-mysql")
        );
        assert_eq!(job.metadata.namespace.as_deref(), Some(NAMESPACE));
        let labels = job.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get("kubeblocks.io/post-provision-job"),
            Some(&"kb-post-provision-job".to_string())
        );
        assert_eq!(
            labels.get("app.kubernetes.io/instance"),
            Some(&"mycluster".to_string())
        );

        let c = container(&job);
        assert_eq!(c.name, ACTION_CONTAINER_NAME);
        assert_eq!(c.image.as_deref(), Some("busybox:1.36"));
        assert_eq!(c.command, Some(vec!["/scripts/init.sh".to_string()]));
        assert_eq!(c.image_pull_policy.as_deref(), Some("IfNotPresent"));

        let pod_spec = job.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(job.spec.as_ref().unwrap().backoff_limit, Some(2));
    }

    #[tokio::test]
    async fn test_retry_policy_sets_backoff_limit() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let mut action = exec_action(&["/scripts/init.sh"]);
        action.retry_policy = Some(component_operator::crd::RetryPolicy {
            max_retries: 7,
            retry_interval: 10,
        });
        let comp = mysql(&cluster).with_post_provision(action).build();
        seed(&client, &[PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build()]);

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();
        assert_eq!(job.spec.unwrap().backoff_limit, Some(7));
    }

    #[tokio::test]
    async fn test_only_script_volumes_are_mounted() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster)
            .with_script("scripts")
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        let pod = PodBuilder::new("mycluster", "mysql", 0, NAMESPACE)
            .with_volume("data")
            .with_volume("scripts")
            .build();
        seed(&client, &[pod]);

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();

        let pod_spec = job.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let volumes = pod_spec.volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "scripts");
        let mounts = container(&job).volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_path, "/scripts/scripts");
    }

    #[tokio::test]
    async fn test_cluster_then_data_plane_tolerations() {
        let client = MemoryClient::new();
        let cluster = ClusterBuilder::new("mycluster", NAMESPACE)
            .with_component("mysql", 1)
            .with_toleration("dedicated")
            .build();
        let comp = mysql(&cluster)
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        seed(&client, &[PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build()]);
        let data_plane = [Toleration {
            key: Some("kb-data".to_string()),
            operator: Some("Exists".to_string()),
            ..Default::default()
        }];

        let job = render(
            &client,
            &cluster,
            &comp,
            LifecycleActionType::PostProvision,
            &data_plane,
        )
        .await
        .unwrap();

        let tolerations = job
            .spec
            .unwrap()
            .template
            .spec
            .unwrap()
            .tolerations
            .unwrap();
        let keys: Vec<_> = tolerations.iter().map(|t| t.key.clone().unwrap()).collect();
        assert_eq!(keys, vec!["dedicated", "kb-data"]);
    }
}

mod env_tests {
    use super::*;

    #[tokio::test]
    async fn test_action_env_wins_over_pod_env() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let mut action = exec_action(&["/scripts/init.sh"]);
        action.env = vec![plain_env("MODE", "action")];
        let comp = mysql(&cluster).with_post_provision(action).build();
        let pod = PodBuilder::new("mycluster", "mysql", 0, NAMESPACE)
            .with_env("MODE", "pod")
            .with_env("MYSQL_PORT", "3306")
            .build();
        seed(&client, &[comp.clone()]);
        seed(&client, &[pod]);

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();
        let envs = container(&job).env.clone().unwrap();

        assert_eq!(env_value(&envs, "MODE"), Some("action"));
        assert_eq!(env_value(&envs, "MYSQL_PORT"), Some("3306"));
        assert_eq!(envs.iter().filter(|e| e.name == "MODE").count(), 1);
    }

    #[tokio::test]
    async fn test_pod_env_wins_over_generated_env() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster)
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        let pod = PodBuilder::new("mycluster", "mysql", 0, NAMESPACE)
            .with_env(COMPONENT_POD_NAME_LIST, "overridden")
            .build();
        seed(&client, &[comp.clone()]);
        seed(&client, &[pod]);

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();
        let envs = container(&job).env.clone().unwrap();
        assert_eq!(env_value(&envs, COMPONENT_POD_NAME_LIST), Some("overridden"));
    }

    #[tokio::test]
    async fn test_component_pod_lists() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster)
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        seed(&client, &[comp.clone()]);
        seed(
            &client,
            &[
                PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build(),
                PodBuilder::new("mycluster", "mysql", 1, NAMESPACE).build(),
            ],
        );

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();
        let envs = container(&job).env.clone().unwrap();

        assert_eq!(
            env_value(&envs, COMPONENT_POD_NAME_LIST),
            Some("mycluster-mysql-0,mycluster-mysql-1")
        );
        assert_eq!(env_value(&envs, COMPONENT_POD_IP_LIST), Some("10.0.0.1,10.0.0.2"));
        assert!(env_value(&envs, COMPONENT_IS_SCALING_IN).is_none());
    }

    #[tokio::test]
    async fn test_cluster_lists_skip_components_without_pods() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster)
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        let proxy = ComponentBuilder::new("mycluster", "proxy", NAMESPACE)
            .with_finalizer(FINALIZER)
            .deleting()
            .build();
        let idle = ComponentBuilder::new("mycluster", "idle", NAMESPACE).build();
        seed(&client, &[comp.clone(), proxy, idle]);
        seed(
            &client,
            &[
                PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build(),
                PodBuilder::new("mycluster", "proxy", 0, NAMESPACE).build(),
            ],
        );

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();
        let envs = container(&job).env.clone().unwrap();

        assert_eq!(env_value(&envs, COMPONENT_LIST), Some("mysql,proxy"));
        assert_eq!(env_value(&envs, COMPONENT_DELETING_LIST), Some("proxy"));
        assert_eq!(env_value(&envs, COMPONENT_UNDELETED_LIST), Some("mysql"));
        assert_eq!(
            env_value(&envs, CLUSTER_POD_NAME_LIST),
            Some("mycluster-mysql-0,mycluster-proxy-0")
        );
    }

    #[tokio::test]
    async fn test_scale_in_flag_passed_through() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster)
            .with_annotation(COMPONENT_SCALE_IN_ANNOTATION_KEY, "true")
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        seed(&client, &[comp.clone()]);
        seed(&client, &[PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build()]);

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();
        let envs = container(&job).env.clone().unwrap();
        assert_eq!(env_value(&envs, COMPONENT_IS_SCALING_IN), Some("true"));
    }

    #[tokio::test]
    async fn test_no_generated_env_without_topology() {
        let client = MemoryClient::new();
        let cluster = ClusterBuilder::new("mycluster", NAMESPACE).build();
        let comp = mysql(&cluster)
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();
        seed(&client, &[PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build()]);

        let job = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap();
        assert!(container(&job).env.is_none());
    }
}

mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_pods_is_not_found() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster)
            .with_post_provision(exec_action(&["/scripts/init.sh"]))
            .build();

        let err = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_handler_without_exec_is_unsupported() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let mut action = exec_action(&[]);
        action.exec = None;
        let comp = mysql(&cluster).with_post_provision(action).build();
        seed(&client, &[PodBuilder::new("mycluster", "mysql", 0, NAMESPACE).build()]);

        let err = render(&client, &cluster, &comp, LifecycleActionType::PostProvision, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction(_)));
    }

    #[tokio::test]
    async fn test_undeclared_action_is_not_defined() {
        let client = MemoryClient::new();
        let cluster = create_test_cluster("mycluster", NAMESPACE);
        let comp = mysql(&cluster).build();

        let err = render(&client, &cluster, &comp, LifecycleActionType::PreTerminate, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ActionNotDefined(_)));
    }
}
