use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use kubelogs_k8s::{Error, LogOptions, ResourceProvider, Result};
use kubelogs_types::DefaultContainers;

use crate::resolver::{LogTargetResolver, Target};
use crate::sink::LogSink;
use crate::stream::{AggregateOptions, StreamAggregator};

/// Lines per pod when a selector target does not set a tail
const SELECTOR_DEFAULT_TAIL: i64 = 10;

const DEFAULT_MAX_FOLLOW_CONCURRENCY: usize = 5;

const DEFAULT_POD_RUNNING_TIMEOUT: Duration = Duration::from_secs(20);

/// Everything a user can ask for in one logs invocation
#[derive(Clone, Debug)]
pub struct LogsRequest {
    pub target: Target,
    pub container: Option<String>,
    /// `None` leaves the choice to `default_containers`
    pub all_containers: Option<bool>,
    pub default_containers: DefaultContainers,
    pub follow: bool,
    pub previous: bool,
    pub timestamps: bool,
    /// RFC3339, with or without fractional seconds
    pub since_time: Option<String>,
    pub since: Option<Duration>,
    /// Zero or negative streams the whole log
    pub tail: Option<i64>,
    pub limit_bytes: Option<i64>,
    pub prefix: bool,
    pub ignore_errors: bool,
    /// Zero falls back to the default of 5
    pub max_follow_concurrency: usize,
    /// Zero falls back to the default of 20 seconds
    pub pod_running_timeout: Duration,
}

impl LogsRequest {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            container: None,
            all_containers: None,
            default_containers: DefaultContainers::default(),
            follow: false,
            previous: false,
            timestamps: false,
            since_time: None,
            since: None,
            tail: None,
            limit_bytes: None,
            prefix: false,
            ignore_errors: false,
            max_follow_concurrency: DEFAULT_MAX_FOLLOW_CONCURRENCY,
            pod_running_timeout: DEFAULT_POD_RUNNING_TIMEOUT,
        }
    }

    /// Per-container options shared by every resolved source
    pub fn log_options(&self) -> Result<LogOptions> {
        if self.all_containers == Some(true) && self.container.is_some() {
            return Err(Error::InvalidOptions(
                "--all-containers=true should not be specified with container name".to_string(),
            ));
        }

        let since_time = self
            .since_time
            .as_deref()
            .map(parse_since_time)
            .transpose()?;
        let since_seconds = self.since.filter(|d| !d.is_zero()).map(ceil_seconds);
        if since_time.is_some() && since_seconds.is_some() {
            return Err(Error::InvalidOptions(
                "at most one of since-time or since may be specified".to_string(),
            ));
        }

        let tail_lines = match self.tail {
            Some(lines) if lines > 0 => Some(lines),
            _ if self.target.is_selector() => Some(SELECTOR_DEFAULT_TAIL),
            _ => None,
        };

        Ok(LogOptions {
            container: self.container.clone(),
            follow: self.follow,
            previous: self.previous,
            timestamps: self.timestamps,
            since_time,
            since_seconds,
            tail_lines,
            limit_bytes: self.limit_bytes.filter(|n| *n > 0),
        })
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            follow: self.follow,
            max_concurrency: match self.max_follow_concurrency {
                0 => DEFAULT_MAX_FOLLOW_CONCURRENCY,
                max => max,
            },
            prefix: self.prefix,
            ignore_errors: self.ignore_errors,
        }
    }

    /// How long to wait for a workload's pod, never zero
    pub fn pod_timeout(&self) -> Duration {
        if self.pod_running_timeout.is_zero() {
            DEFAULT_POD_RUNNING_TIMEOUT
        } else {
            self.pod_running_timeout
        }
    }
}

fn parse_since_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidOptions(format!("invalid since-time {:?}: {}", value, e)))
}

fn ceil_seconds(duration: Duration) -> i64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Resolve the request's target and stream every source into `sink`
pub async fn stream_logs<S: LogSink>(
    provider: Arc<dyn ResourceProvider>,
    request: &LogsRequest,
    sink: &mut S,
    cancel: &CancellationToken,
) -> Result<()> {
    let options = request.log_options()?;
    let resolver = LogTargetResolver::new(provider)
        .with_pod_timeout(request.pod_timeout())
        .with_default_containers(request.default_containers);

    let sources = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        sources = resolver.resolve_target(
            &request.target,
            &options,
            request.all_containers,
            cancel,
        ) => sources?,
    };
    tracing::debug!(count = sources.len(), "resolved log sources");

    StreamAggregator::new(request.aggregate_options())
        .run(&sources, sink, cancel)
        .await
}
