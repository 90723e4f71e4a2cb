use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;

use kubelogs_k8s::{
    BoxError, Error, LogObject, LogOptions, LogStream, ObjectKind, PodExt, ResourceProvider,
    Result, selector_for_object,
};
use kubelogs_types::{ContainerRef, DefaultContainers};

use crate::waiter::PodWaiter;

const DEFAULT_POD_TIMEOUT: Duration = Duration::from_secs(20);

/// What to fetch logs for: a named resource or a label selector
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Target {
    pub namespace: String,
    /// Pod name or `kind/name`
    pub name: Option<String>,
    pub selector: Option<String>,
}

impl Target {
    pub fn name(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: Some(name.into()),
            selector: None,
        }
    }

    pub fn selector(namespace: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: None,
            selector: Some(selector.into()),
        }
    }

    pub fn is_selector(&self) -> bool {
        self.selector.is_some()
    }
}

/// One container whose log stream can be opened
#[derive(Clone)]
pub struct LogSource {
    reference: ContainerRef,
    options: LogOptions,
    provider: Arc<dyn ResourceProvider>,
}

impl LogSource {
    pub fn reference(&self) -> &ContainerRef {
        &self.reference
    }

    pub fn options(&self) -> &LogOptions {
        &self.options
    }

    pub fn field_path(&self) -> String {
        self.reference.field_path()
    }

    /// Open the container log; failures carry the source identity
    pub async fn open(&self) -> Result<LogStream> {
        self.provider
            .open_log_stream(&self.reference.namespace, &self.reference.pod, &self.options)
            .await
            .map_err(|err| match err {
                Error::Cancelled | Error::Stream { .. } => err,
                other => self.stream_error(other),
            })
    }

    pub(crate) fn stream_error(&self, source: impl Into<BoxError>) -> Error {
        Error::Stream {
            namespace: self.reference.namespace.clone(),
            pod: self.reference.pod.clone(),
            container: self.reference.container.clone(),
            source: source.into(),
        }
    }
}

impl fmt::Debug for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSource")
            .field("reference", &self.reference)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Turns targets into the concrete set of container log sources
pub struct LogTargetResolver {
    provider: Arc<dyn ResourceProvider>,
    pod_timeout: Duration,
    default_containers: DefaultContainers,
}

impl LogTargetResolver {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            pod_timeout: DEFAULT_POD_TIMEOUT,
            default_containers: DefaultContainers::default(),
        }
    }

    /// How long to wait for a workload's pod to appear
    pub fn with_pod_timeout(mut self, timeout: Duration) -> Self {
        self.pod_timeout = timeout;
        self
    }

    /// What to pick when no container is named and all-containers is unset
    pub fn with_default_containers(mut self, default: DefaultContainers) -> Self {
        self.default_containers = default;
        self
    }

    /// Materialise `target` and resolve it to log sources
    pub async fn resolve_target(
        &self,
        target: &Target,
        options: &LogOptions,
        all_containers: Option<bool>,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogSource>> {
        let object = self.materialize(target).await?;
        self.resolve(&object, options, all_containers, cancel).await
    }

    /// Fetch the object a target names, or list the pods its selector matches
    pub async fn materialize(&self, target: &Target) -> Result<LogObject> {
        let namespace = target.namespace.as_str();
        match (target.name.as_deref(), target.selector.as_deref()) {
            (Some(_), Some(_)) => Err(Error::InvalidTarget(
                "only one of a resource name or a selector can be given".to_string(),
            )),
            (None, None) => Err(Error::InvalidTarget(
                "a resource name or a selector is required".to_string(),
            )),
            (None, Some(selector)) => {
                let list = self.provider.list_pods(namespace, selector).await?;
                if list.items.is_empty() {
                    return Err(Error::NotFound(format!(
                        "no resources found in {} namespace",
                        namespace
                    )));
                }
                Ok(LogObject::PodList(list.items))
            }
            (Some(name), None) => {
                let (kind, name) = parse_resource_name(name)?;
                tracing::debug!(%kind, name, namespace, "fetching target object");
                self.provider.get_object(kind, namespace, name).await
            }
        }
    }

    /// Resolve an already fetched object to log sources.
    ///
    /// Any failure fails the whole call. The result never holds two sources
    /// for the same container and is never empty.
    pub async fn resolve(
        &self,
        object: &LogObject,
        options: &LogOptions,
        all_containers: Option<bool>,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogSource>> {
        let mut sources = Vec::new();
        match object {
            LogObject::Pod(pod) => sources.extend(self.resolve_pod(pod, options, all_containers)?),
            LogObject::PodList(pods) => {
                for pod in pods {
                    sources.extend(self.resolve_pod(pod, options, all_containers)?);
                }
            }
            other => {
                let (namespace, selector) = selector_for_object(other)?;
                let found = PodWaiter::new(self.provider.as_ref())
                    .wait_for_pod(&namespace, &selector, self.pod_timeout, cancel)
                    .await?;
                sources.extend(self.resolve_pod(&found.pod, options, all_containers)?);
            }
        }

        let mut seen = HashSet::new();
        sources.retain(|s| {
            seen.insert((
                s.reference.namespace.clone(),
                s.reference.pod.clone(),
                s.field_path(),
            ))
        });

        if sources.is_empty() {
            return Err(Error::NotFound(format!(
                "no containers to stream logs from for {}",
                object.kind()
            )));
        }
        Ok(sources)
    }

    fn resolve_pod(
        &self,
        pod: &Pod,
        options: &LogOptions,
        all_containers: Option<bool>,
    ) -> Result<Vec<LogSource>> {
        let all = all_containers.unwrap_or_else(|| {
            options.container.is_none() && self.default_containers == DefaultContainers::All
        });

        let references = if all {
            pod.container_refs()
        } else {
            let reference = match options.container.as_deref() {
                Some(name) => pod.find_container(name),
                None => {
                    let first = pod.first_container();
                    match &first {
                        Some(first) if pod.container_refs().len() > 1 => tracing::info!(
                            "Defaulted container {:?} out of: {}",
                            first.container,
                            pod.container_names()
                        ),
                        _ => {}
                    }
                    first
                }
            };
            let reference = reference.ok_or_else(|| Error::InvalidContainer {
                pod: pod.name().to_string(),
                container: options.container.clone().unwrap_or_default(),
            })?;
            vec![reference]
        };

        Ok(references
            .into_iter()
            .map(|reference| LogSource {
                options: options.for_container(&reference.container),
                reference,
                provider: Arc::clone(&self.provider),
            })
            .collect())
    }
}

/// Split `kind/name`; a bare name is a pod
fn parse_resource_name(name: &str) -> Result<(ObjectKind, &str)> {
    let (kind, name) = match name.split_once('/') {
        Some((kind, name)) => (kind.parse::<ObjectKind>()?, name),
        None => (ObjectKind::Pod, name),
    };
    if name.is_empty() || name.contains('/') {
        return Err(Error::InvalidTarget(format!(
            "resource name {:?} is not of the form NAME or KIND/NAME",
            name
        )));
    }
    Ok((kind, name))
}
