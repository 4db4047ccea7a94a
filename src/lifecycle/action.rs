use std::collections::BTreeMap;

use crate::controller::error::{Error, Result};
use crate::crd::{Action, ComponentLifecycleActions};
use crate::resources::common::component_labels;

/// Lifecycle hooks a component can declare
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleActionType {
    PostProvision,
    PreTerminate,
    Switchover,
    MemberJoin,
    MemberLeave,
    DataDump,
    DataLoad,
    RoleProbe,
}

/// Naming of the Job that runs an action and of its done marker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobActionSpec {
    pub done_key: &'static str,
    pub job_prefix: &'static str,
    pub job_label_key: &'static str,
    pub job_label_value: &'static str,
}

const JOB_ACTIONS: &[(LifecycleActionType, JobActionSpec)] = &[
    (
        LifecycleActionType::PostProvision,
        JobActionSpec {
            done_key: "kubeblocks.io/post-provision-done",
            job_prefix: "kb-post-provision-job",
            job_label_key: "kubeblocks.io/post-provision-job",
            job_label_value: "kb-post-provision-job",
        },
    ),
    (
        LifecycleActionType::PreTerminate,
        JobActionSpec {
            done_key: "kubeblocks.io/pre-terminate-done",
            job_prefix: "kb-pre-terminate-job",
            job_label_key: "kubeblocks.io/pre-terminate-job",
            job_label_value: "kb-pre-terminate-job",
        },
    ),
];

impl LifecycleActionType {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleActionType::PostProvision => "postProvision",
            LifecycleActionType::PreTerminate => "preTerminate",
            LifecycleActionType::Switchover => "switchover",
            LifecycleActionType::MemberJoin => "memberJoin",
            LifecycleActionType::MemberLeave => "memberLeave",
            LifecycleActionType::DataDump => "dataDump",
            LifecycleActionType::DataLoad => "dataLoad",
            LifecycleActionType::RoleProbe => "roleProbe",
        }
    }

    /// Job naming for kinds that run as a Job
    pub fn job_spec(&self) -> Result<&'static JobActionSpec> {
        JOB_ACTIONS
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, spec)| spec)
            .ok_or_else(|| {
                Error::UnsupportedAction(format!("{self} can not be executed as a job"))
            })
    }

    /// The custom handler declared for this action, if any.
    ///
    /// Switchover resolves to its candidate-less handler.
    pub fn handler<'a>(&self, actions: &'a ComponentLifecycleActions) -> Option<&'a Action> {
        let handler = match self {
            LifecycleActionType::PostProvision => actions.post_provision.as_ref(),
            LifecycleActionType::PreTerminate => actions.pre_terminate.as_ref(),
            LifecycleActionType::MemberJoin => actions.member_join.as_ref(),
            LifecycleActionType::MemberLeave => actions.member_leave.as_ref(),
            LifecycleActionType::DataDump => actions.data_dump.as_ref(),
            LifecycleActionType::DataLoad => actions.data_load.as_ref(),
            LifecycleActionType::RoleProbe => actions.role_probe.as_ref().map(|p| &p.handler),
            LifecycleActionType::Switchover => {
                return actions
                    .switchover
                    .as_ref()
                    .and_then(|s| s.without_candidate.as_ref());
            }
        };
        handler.and_then(|h| h.custom_handler.as_ref())
    }

    /// `<prefix>-<cluster>-<component>`
    pub fn job_name(&self, full_comp_name: &str) -> Result<String> {
        Ok(format!("{}-{}", self.job_spec()?.job_prefix, full_comp_name))
    }

    /// Component labels plus the action marker label
    pub fn job_labels(&self, cluster_name: &str, comp_name: &str) -> Result<BTreeMap<String, String>> {
        let spec = self.job_spec()?;
        let mut labels = component_labels(cluster_name, comp_name);
        labels.insert(
            spec.job_label_key.to_string(),
            spec.job_label_value.to_string(),
        );
        Ok(labels)
    }
}

impl std::fmt::Display for LifecycleActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
