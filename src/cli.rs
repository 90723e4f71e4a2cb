use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;

use kubelogs_logs::{LogLevel, LogsRequest, Target};

use crate::config::Config;

/// Kubelogs - print the logs of the containers behind a pod, workload or selector
#[derive(Parser, Debug)]
#[command(name = "kubelogs")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pod name or KIND/NAME (deploy/web, sts/db, job/migrate, svc/api, ...)
    #[arg(value_name = "TARGET")]
    pub target: Option<String>,

    /// Namespace (defaults to the kubeconfig namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Container to print logs for
    #[arg(short, long)]
    pub container: Option<String>,

    /// Label selector instead of a target name
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    /// Print logs of every container in the pod
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub all_containers: Option<bool>,

    /// Keep streaming new lines
    #[arg(short, long)]
    pub follow: bool,

    /// Print the logs of the previous container instance
    #[arg(short, long)]
    pub previous: bool,

    /// Include server timestamps on every line
    #[arg(long)]
    pub timestamps: bool,

    /// Only return logs newer than a relative duration like 5s, 2m or 3h
    #[arg(long, value_parser = humantime::parse_duration)]
    pub since: Option<Duration>,

    /// Only return logs after an RFC3339 date
    #[arg(long, value_name = "RFC3339", conflicts_with = "since")]
    pub since_time: Option<String>,

    /// Lines of recent log to display, negative for all
    #[arg(long, allow_negative_numbers = true)]
    pub tail: Option<i64>,

    /// Maximum bytes of logs to return
    #[arg(long)]
    pub limit_bytes: Option<i64>,

    /// Maximum number of concurrent logs to follow
    #[arg(long)]
    pub max_log_requests: Option<usize>,

    /// Prefix each line with the pod and container name
    #[arg(long)]
    pub prefix: bool,

    /// Keep going when one of the streams fails
    #[arg(long)]
    pub ignore_errors: bool,

    /// How long to wait for a pod of a workload to show up
    #[arg(long, value_parser = humantime::parse_duration)]
    pub pod_running_timeout: Option<Duration>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Print parsed records instead of raw lines
    #[arg(long)]
    pub records: bool,

    /// Print records as JSON, one per line
    #[arg(long, requires = "records")]
    pub json: bool,

    /// Only print records at this level or above (trace, debug, info, warn, error, fatal)
    #[arg(long, value_name = "LEVEL", requires = "records", value_parser = parse_level)]
    pub min_level: Option<LogLevel>,
}

impl Args {
    pub fn target(&self, namespace: String) -> Result<Target> {
        match (&self.target, &self.selector) {
            (Some(_), Some(_)) => bail!("only one of TARGET or --selector can be given"),
            (None, None) => bail!("TARGET or --selector is required"),
            (Some(name), None) => Ok(Target::name(namespace, name.as_str())),
            (None, Some(selector)) => Ok(Target::selector(namespace, selector.as_str())),
        }
    }

    /// Build the request, falling back to `config` for unset flags
    pub fn request(&self, target: Target, config: &Config) -> LogsRequest {
        let mut request = LogsRequest::new(target);
        request.container = self.container.clone();
        request.all_containers = self.all_containers;
        request.default_containers = config.default_containers;
        request.follow = self.follow;
        request.previous = self.previous;
        request.timestamps = self.timestamps || config.timestamps;
        request.since_time = self.since_time.clone();
        request.since = self.since;
        request.tail = self.tail;
        request.limit_bytes = self.limit_bytes;
        request.prefix = self.prefix || config.prefix;
        request.ignore_errors = self.ignore_errors || config.ignore_errors;
        request.max_follow_concurrency =
            self.max_log_requests.unwrap_or(config.max_log_requests);
        request.pod_running_timeout = self
            .pod_running_timeout
            .unwrap_or_else(|| config.pod_running_timeout());
        request
    }
}

fn parse_level(value: &str) -> Result<LogLevel> {
    match LogLevel::parse(value) {
        LogLevel::Unknown => bail!("unknown log level {:?}", value),
        level => Ok(level),
    }
}
