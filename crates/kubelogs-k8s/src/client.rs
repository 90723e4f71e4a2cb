//! `kube`-backed resource provider

use std::fmt::Debug;

use async_trait::async_trait;
use futures::{AsyncReadExt, StreamExt, TryStreamExt};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use kube::Api;
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};
use crate::object::{LogObject, ObjectKind};
use crate::options::LogOptions;
use crate::provider::{LogStream, PodEvent, PodEventStream, PodList, ResourceProvider};

/// Chunks buffered between a log connection and its reader
const LOG_CHUNK_BUFFER: usize = 16;

/// Watch events buffered between a watch connection and its reader
const EVENT_BUFFER: usize = 16;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Resource provider talking to a real cluster
#[derive(Clone)]
pub struct KubeProvider {
    client: kube::Client,
    default_namespace: String,
}

impl KubeProvider {
    /// Connect using the named kubeconfig context, or the inferred
    /// configuration (in-cluster or current context) when none is given
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(name) => {
                let kubeconfig = Kubeconfig::read()?;
                kube::Config::from_custom_kubeconfig(
                    kubeconfig,
                    &KubeConfigOptions {
                        context: Some(name.to_string()),
                        ..Default::default()
                    },
                )
                .await?
            }
            None => kube::Config::infer().await?,
        };

        let default_namespace = config.default_namespace.clone();
        let client = kube::Client::try_from(config)?;
        tracing::debug!(namespace = %default_namespace, "connected to cluster");

        Ok(Self {
            client,
            default_namespace,
        })
    }

    /// Namespace of the active context
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    async fn get_namespaced<K>(&self, namespace: &str, name: &str) -> Result<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}

fn pod_event(event: WatchEvent<Pod>) -> PodEvent {
    match event {
        WatchEvent::Added(pod) => PodEvent::Added(pod),
        WatchEvent::Modified(pod) => PodEvent::Modified(pod),
        WatchEvent::Deleted(pod) => PodEvent::Deleted(pod),
        WatchEvent::Bookmark(_) => PodEvent::Bookmark,
        WatchEvent::Error(err) => PodEvent::Error(err.message),
    }
}

#[async_trait]
impl ResourceProvider for KubeProvider {
    async fn get_object(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<LogObject> {
        let object = match kind {
            ObjectKind::Pod => {
                LogObject::Pod(Box::new(self.get_namespaced::<Pod>(namespace, name).await?))
            }
            ObjectKind::Deployment => LogObject::Deployment(Box::new(
                self.get_namespaced::<Deployment>(namespace, name).await?,
            )),
            ObjectKind::StatefulSet => LogObject::StatefulSet(Box::new(
                self.get_namespaced::<StatefulSet>(namespace, name).await?,
            )),
            ObjectKind::DaemonSet => LogObject::DaemonSet(Box::new(
                self.get_namespaced::<DaemonSet>(namespace, name).await?,
            )),
            ObjectKind::ReplicaSet => LogObject::ReplicaSet(Box::new(
                self.get_namespaced::<ReplicaSet>(namespace, name).await?,
            )),
            ObjectKind::Job => {
                LogObject::Job(Box::new(self.get_namespaced::<Job>(namespace, name).await?))
            }
            ObjectKind::ReplicationController => LogObject::ReplicationController(Box::new(
                self.get_namespaced::<ReplicationController>(namespace, name)
                    .await?,
            )),
            ObjectKind::Service => LogObject::Service(Box::new(
                self.get_namespaced::<Service>(namespace, name).await?,
            )),
        };
        Ok(object)
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<PodList> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(selector)).await?;

        Ok(PodList {
            items: list.items,
            resource_version: list.metadata.resource_version.unwrap_or_default(),
        })
    }

    async fn watch_pods(
        &self,
        namespace: &str,
        selector: &str,
        resource_version: &str,
    ) -> Result<PodEventStream> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = WatchParams::default().labels(selector);
        let version = resource_version.to_string();

        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        // The watch borrows its Api, so the connection lives in its own task
        // and is dropped as soon as the receiving side goes away.
        tokio::spawn(async move {
            let events = match pods.watch(&params, &version).await {
                Ok(events) => {
                    let _ = ready_tx.send(Ok(()));
                    events
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let mut events = std::pin::pin!(events);

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => return,
                    next = events.next() => next,
                };
                let Some(event) = next else {
                    return;
                };
                if tx.send(event.map(pod_event).map_err(Error::from)).await.is_err() {
                    return;
                }
            }
        });

        ready_rx
            .await
            .map_err(|_| Error::Watch("watch task exited before it started".to_string()))??;
        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn open_log_stream(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> Result<LogStream> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = options.to_log_params();
        let pod_name = pod.to_string();

        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(LOG_CHUNK_BUFFER);

        tracing::debug!(
            namespace,
            pod,
            container = ?options.container,
            follow = options.follow,
            "opening log stream"
        );

        tokio::spawn(async move {
            let reader = match pods.log_stream(&pod_name, &params).await {
                Ok(reader) => {
                    let _ = ready_tx.send(Ok(()));
                    reader
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let mut reader = std::pin::pin!(reader);
            let mut buf = vec![0u8; READ_CHUNK_SIZE];

            loop {
                let read = tokio::select! {
                    _ = tx.closed() => return,
                    read = reader.read(&mut buf) => read,
                };
                match read {
                    Ok(0) => return,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
        });

        ready_rx.await.map_err(|_| Error::Stream {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: options.container.clone().unwrap_or_default(),
            source: "log connection closed before it was established".into(),
        })??;
        Ok(Box::pin(ReceiverStream::new(rx).into_async_read()))
    }
}
