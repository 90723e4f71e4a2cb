//! Shared types for kubelogs
//!
//! This crate contains data structures used across multiple kubelogs crates.
//! Nothing in here talks to a cluster; the `kubelogs-k8s` crate builds these
//! values out of API objects.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Pod Types
// ============================================================================

/// Pod lifecycle phase as reported in `status.phase`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Immutable view of a pod taken at selection time.
///
/// Only the fields the pod ordering policies look at are captured here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: String,
    /// Node the pod is scheduled on, `None` while unassigned
    pub node_name: Option<String>,
    pub phase: PodPhase,
    /// Whether the `Ready` condition is currently true
    pub ready: bool,
    /// Last transition time of a true `Ready` condition
    pub ready_since: Option<DateTime<Utc>>,
    /// Highest restart count over the pod's containers
    pub max_restarts: i32,
    pub created: Option<DateTime<Utc>>,
}

impl PodSnapshot {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            node_name: None,
            phase: PodPhase::Unknown,
            ready: false,
            ready_since: None,
            max_restarts: 0,
            created: None,
        }
    }

    /// A pod counts as assigned once it carries a non-empty node name
    pub fn is_assigned(&self) -> bool {
        self.node_name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

// ============================================================================
// Container Types
// ============================================================================

/// The slot a container was declared in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContainerRole {
    Init,
    Main,
    Ephemeral,
}

impl ContainerRole {
    /// Name of the pod spec field holding containers of this role
    pub fn spec_field(&self) -> &'static str {
        match self {
            Self::Init => "initContainers",
            Self::Main => "containers",
            Self::Ephemeral => "ephemeralContainers",
        }
    }
}

/// Reference to one declared container of one pod
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerRef {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub role: ContainerRole,
}

impl ContainerRef {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
        role: ContainerRole,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
            role,
        }
    }

    /// Field path such as `spec.containers{app}`
    pub fn field_path(&self) -> String {
        format!("spec.{}{{{}}}", self.role.spec_field(), self.container)
    }

    /// Label put in front of every line when prefixing is on
    pub fn prefix(&self) -> String {
        format!("[pod/{}/{}] ", self.pod, self.container)
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/pod/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// What to select when a pod is targeted without naming a container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultContainers {
    /// Every init, regular and ephemeral container
    #[default]
    All,
    /// The first declared regular container
    First,
}

// ============================================================================
// Log Types
// ============================================================================

/// Severity of a record, ordered from least to most severe
///
/// `Unknown` covers levels that could not be recognised and is never
/// filtered out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl LogLevel {
    /// Parse log level from common formats
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" | "trc" => Self::Trace,
            "debug" | "dbg" => Self::Debug,
            "info" | "inf" | "information" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Whether a record at this level passes a `min` threshold
    pub fn is_at_least(self, min: LogLevel) -> bool {
        self == Self::Unknown || self >= min
    }
}

/// Structured view of a single streamed log line
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    /// `None` when the line carried no parseable timestamp
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Option<String>,
    pub source: Option<String>,
    pub message: String,
}

impl Record {
    /// Records without a timestamp are parse failures and get dropped
    pub fn has_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }

    pub fn severity(&self) -> LogLevel {
        self.level
            .as_deref()
            .map(LogLevel::parse)
            .unwrap_or(LogLevel::Unknown)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timestamp = self
            .timestamp
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        write!(
            f,
            "{} {} {} {}",
            timestamp,
            self.level.as_deref().unwrap_or_default(),
            self.source.as_deref().unwrap_or_default(),
            self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_field_path_per_role() {
        let init = ContainerRef::new("ns", "web-0", "migrate", ContainerRole::Init);
        let main = ContainerRef::new("ns", "web-0", "app", ContainerRole::Main);
        let ephem = ContainerRef::new("ns", "web-0", "debugger", ContainerRole::Ephemeral);

        assert_eq!(init.field_path(), "spec.initContainers{migrate}");
        assert_eq!(main.field_path(), "spec.containers{app}");
        assert_eq!(ephem.field_path(), "spec.ephemeralContainers{debugger}");
    }

    #[test]
    fn test_same_name_different_role_is_distinct() {
        let a = ContainerRef::new("ns", "p", "shared", ContainerRole::Init);
        let b = ContainerRef::new("ns", "p", "shared", ContainerRole::Main);
        assert_ne!(a, b);
        assert_ne!(a.field_path(), b.field_path());
    }

    #[test]
    fn test_prefix_format() {
        let r = ContainerRef::new("default", "nginx-7d9", "nginx", ContainerRole::Main);
        assert_eq!(r.prefix(), "[pod/nginx-7d9/nginx] ");
    }

    #[test]
    fn test_pod_phase_from_str() {
        assert_eq!(PodPhase::from("Running"), PodPhase::Running);
        assert_eq!(PodPhase::from("Pending"), PodPhase::Pending);
        assert_eq!(PodPhase::from("Bogus"), PodPhase::Unknown);
    }

    #[test]
    fn test_empty_node_name_is_unassigned() {
        let mut pod = PodSnapshot::new("p", "ns");
        assert!(!pod.is_assigned());
        pod.node_name = Some(String::new());
        assert!(!pod.is_assigned());
        pod.node_name = Some("node-a".to_string());
        assert!(pod.is_assigned());
    }

    #[test]
    fn test_record_display() {
        let record = Record {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            level: Some("INFO".to_string()),
            source: Some("main".to_string()),
            message: "hello world".to_string(),
        };
        assert_eq!(record.to_string(), "2024-01-01T00:00:00Z INFO main hello world");
        assert_eq!(record.severity(), LogLevel::Info);
    }

    #[test]
    fn test_level_threshold() {
        assert!(LogLevel::Error.is_at_least(LogLevel::Warn));
        assert!(LogLevel::Warn.is_at_least(LogLevel::Warn));
        assert!(!LogLevel::Debug.is_at_least(LogLevel::Info));
        assert!(LogLevel::Unknown.is_at_least(LogLevel::Fatal));

        let plain = Record {
            message: "no level".to_string(),
            ..Default::default()
        };
        assert_eq!(plain.severity(), LogLevel::Unknown);
        assert_eq!(LogLevel::parse(" WARNING "), LogLevel::Warn);
    }

    #[test]
    fn test_default_containers_deserialize() {
        let all: DefaultContainers = serde_json::from_str("\"all\"").unwrap();
        let first: DefaultContainers = serde_json::from_str("\"first\"").unwrap();
        assert_eq!(all, DefaultContainers::All);
        assert_eq!(first, DefaultContainers::First);
    }
}
