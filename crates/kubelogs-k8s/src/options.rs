use chrono::{DateTime, Utc};
use kube::api::LogParams;

/// Per-container log request options
///
/// Every resolved source owns its own copy; only `container` differs between
/// the sources of one pod.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub container: Option<String>,
    pub follow: bool,
    pub previous: bool,
    pub timestamps: bool,
    pub since_time: Option<DateTime<Utc>>,
    pub since_seconds: Option<i64>,
    /// `None` streams the whole log
    pub tail_lines: Option<i64>,
    pub limit_bytes: Option<i64>,
}

impl LogOptions {
    /// Copy of these options bound to another container
    pub fn for_container(&self, container: &str) -> Self {
        Self {
            container: Some(container.to_string()),
            ..self.clone()
        }
    }

    pub(crate) fn to_log_params(&self) -> LogParams {
        LogParams {
            container: self.container.clone(),
            follow: self.follow,
            limit_bytes: self.limit_bytes,
            previous: self.previous,
            since_seconds: self.since_seconds,
            since_time: self.since_time,
            tail_lines: self.tail_lines,
            timestamps: self.timestamps,
            ..Default::default()
        }
    }
}
