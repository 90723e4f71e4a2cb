use std::pin::Pin;

use async_trait::async_trait;
use futures::io::AsyncBufRead;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Pod;

use crate::error::Result;
use crate::object::{LogObject, ObjectKind};
use crate::options::LogOptions;

/// An open container log stream
pub type LogStream = Pin<Box<dyn AsyncBufRead + Send>>;

/// Stream of pod watch events
pub type PodEventStream = BoxStream<'static, Result<PodEvent>>;

/// Pods matching a selector together with the list's resource version
#[derive(Clone, Debug, Default)]
pub struct PodList {
    pub items: Vec<Pod>,
    pub resource_version: String,
}

/// A change observed on a pod watch
#[derive(Clone, Debug)]
pub enum PodEvent {
    Added(Pod),
    Modified(Pod),
    Deleted(Pod),
    Bookmark,
    /// The server reported an error on the watch
    Error(String),
}

/// The cluster capabilities the log engine needs.
///
/// Authentication, discovery and caching all live behind this trait; the
/// resolver and aggregator only ever see these four calls.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Fetch one named object of the given kind
    async fn get_object(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<LogObject>;

    /// List pods in `namespace` matching a label `selector`
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<PodList>;

    /// Watch pods matching `selector`, starting after `resource_version`
    async fn watch_pods(
        &self,
        namespace: &str,
        selector: &str,
        resource_version: &str,
    ) -> Result<PodEventStream>;

    /// Open the log stream of one container
    async fn open_log_stream(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> Result<LogStream>;
}
