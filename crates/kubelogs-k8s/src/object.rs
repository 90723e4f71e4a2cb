use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};

use crate::error::Error;

/// Resource kinds a log target can name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
    Job,
    ReplicationController,
    Service,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::ReplicaSet => "ReplicaSet",
            Self::Job => "Job",
            Self::ReplicationController => "ReplicationController",
            Self::Service => "Service",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    /// Accepts kind names, plurals and the usual kubectl short names,
    /// optionally qualified with an API group (`deployments.apps`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let name = lower.split('.').next().unwrap_or_default();
        match name {
            "po" | "pod" | "pods" => Ok(Self::Pod),
            "deploy" | "deployment" | "deployments" => Ok(Self::Deployment),
            "sts" | "statefulset" | "statefulsets" => Ok(Self::StatefulSet),
            "ds" | "daemonset" | "daemonsets" => Ok(Self::DaemonSet),
            "rs" | "replicaset" | "replicasets" => Ok(Self::ReplicaSet),
            "job" | "jobs" => Ok(Self::Job),
            "rc" | "replicationcontroller" | "replicationcontrollers" => {
                Ok(Self::ReplicationController)
            }
            "svc" | "service" | "services" => Ok(Self::Service),
            _ => Err(Error::UnsupportedSelector {
                kind: s.to_string(),
            }),
        }
    }
}

/// An object resolved from a log target
///
/// Pods and pod lists are expanded directly; every other variant is reduced
/// to a namespace and label selector first.
#[derive(Clone, Debug)]
pub enum LogObject {
    Pod(Box<Pod>),
    PodList(Vec<Pod>),
    Deployment(Box<Deployment>),
    StatefulSet(Box<StatefulSet>),
    DaemonSet(Box<DaemonSet>),
    ReplicaSet(Box<ReplicaSet>),
    Job(Box<Job>),
    ReplicationController(Box<ReplicationController>),
    Service(Box<Service>),
    /// Any kind without a known pod selector shape
    Other {
        kind: String,
        namespace: String,
        name: String,
    },
}

impl LogObject {
    pub fn kind(&self) -> &str {
        match self {
            Self::Pod(_) => "Pod",
            Self::PodList(_) => "PodList",
            Self::Deployment(_) => "Deployment",
            Self::StatefulSet(_) => "StatefulSet",
            Self::DaemonSet(_) => "DaemonSet",
            Self::ReplicaSet(_) => "ReplicaSet",
            Self::Job(_) => "Job",
            Self::ReplicationController(_) => "ReplicationController",
            Self::Service(_) => "Service",
            Self::Other { kind, .. } => kind,
        }
    }
}

impl From<Pod> for LogObject {
    fn from(pod: Pod) -> Self {
        Self::Pod(Box::new(pod))
    }
}

impl From<Vec<Pod>> for LogObject {
    fn from(pods: Vec<Pod>) -> Self {
        Self::PodList(pods)
    }
}
