//! In-memory resource provider for tests

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Container, EphemeralContainer, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use kubelogs_k8s::{
    Error, LogObject, LogOptions, LogStream, ObjectKind, PodEvent, PodEventStream, PodExt,
    PodList, ResourceProvider, Result,
};

/// Scripted body of one container log
#[derive(Clone)]
pub(crate) enum FakeLog {
    /// Ends after the given bytes
    Complete(Vec<u8>),
    /// Emits the bytes, then fails with the message
    FailsAfter(Vec<u8>, String),
    /// Opening the stream fails
    OpenFails(String),
    /// Emits the bytes, then stays open forever
    Endless(Vec<u8>),
    /// Emits `{label}{n}` lines on a clock: the first after `start`, the
    /// rest every `every`. Fails with "connection reset" one tick after
    /// `fails_after` lines, otherwise never ends.
    Ticking {
        label: String,
        start: Duration,
        every: Duration,
        fails_after: Option<usize>,
    },
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    pods: Mutex<Vec<Pod>>,
    objects: Mutex<HashMap<(ObjectKind, String), LogObject>>,
    logs: Mutex<HashMap<(String, String), FakeLog>>,
    watch: Mutex<Option<mpsc::Receiver<PodEvent>>>,
    opened: Mutex<Vec<(String, LogOptions)>>,
    live_streams: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_pod(&self, pod: Pod) {
        self.pods.lock().push(pod);
    }

    pub(crate) fn add_object(&self, kind: ObjectKind, name: &str, object: LogObject) {
        self.objects.lock().insert((kind, name.to_string()), object);
    }

    pub(crate) fn set_log(&self, pod: &str, container: &str, log: FakeLog) {
        self.logs
            .lock()
            .insert((pod.to_string(), container.to_string()), log);
    }

    /// Events sent on the returned channel show up on the next watch
    pub(crate) fn watch_channel(&self) -> mpsc::Sender<PodEvent> {
        let (tx, rx) = mpsc::channel(8);
        *self.watch.lock() = Some(rx);
        tx
    }

    /// `(pod, options)` of every stream opened so far
    pub(crate) fn opened(&self) -> Vec<(String, LogOptions)> {
        self.opened.lock().clone()
    }

    pub(crate) fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    let empty = BTreeMap::new();
    let labels = pod.metadata.labels.as_ref().unwrap_or(&empty);
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
            None => labels.contains_key(term),
        })
}

/// Keeps the live stream counter up to date
struct Tracked<S> {
    inner: S,
    live: Arc<AtomicUsize>,
}

impl<S> Tracked<S> {
    fn new(inner: S, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { inner, live }
    }
}

impl<S: Stream + Unpin> Stream for Tracked<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for Tracked<S> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

type ChunkStream = BoxStream<'static, io::Result<Vec<u8>>>;

#[async_trait]
impl ResourceProvider for FakeProvider {
    async fn get_object(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<LogObject> {
        if kind == ObjectKind::Pod {
            return self
                .pods
                .lock()
                .iter()
                .find(|p| p.name() == name && p.namespace() == namespace)
                .cloned()
                .map(LogObject::from)
                .ok_or_else(|| Error::NotFound(format!("pods \"{}\" not found", name)));
        }
        self.objects
            .lock()
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} \"{}\" not found", kind, name)))
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<PodList> {
        let items = self
            .pods
            .lock()
            .iter()
            .filter(|p| p.namespace() == namespace && matches_selector(p, selector))
            .cloned()
            .collect();
        Ok(PodList {
            items,
            resource_version: "42".to_string(),
        })
    }

    async fn watch_pods(
        &self,
        _namespace: &str,
        _selector: &str,
        _resource_version: &str,
    ) -> Result<PodEventStream> {
        match self.watch.lock().take() {
            Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (Ok(event), rx))
            })
            .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn open_log_stream(
        &self,
        _namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> Result<LogStream> {
        self.opened.lock().push((pod.to_string(), options.clone()));
        let container = options.container.clone().unwrap_or_default();
        let log = self
            .logs
            .lock()
            .get(&(pod.to_string(), container))
            .cloned()
            .unwrap_or(FakeLog::Complete(Vec::new()));

        let chunks: ChunkStream = match log {
            FakeLog::Complete(bytes) => stream::iter(vec![Ok(bytes)]).boxed(),
            FakeLog::FailsAfter(bytes, message) => {
                stream::iter(vec![Ok(bytes), Err(io::Error::other(message))]).boxed()
            }
            FakeLog::OpenFails(message) => return Err(Error::NotFound(message)),
            FakeLog::Endless(bytes) => stream::iter(vec![Ok(bytes)])
                .chain(stream::pending())
                .boxed(),
            FakeLog::Ticking {
                label,
                start,
                every,
                fails_after,
            } => stream::unfold((0usize, false), move |(n, failed)| {
                let label = label.clone();
                async move {
                    if failed {
                        return None;
                    }
                    tokio::time::sleep(if n == 0 { start } else { every }).await;
                    if fails_after == Some(n) {
                        let err = io::Error::other("connection reset");
                        return Some((Err(err), (n, true)));
                    }
                    Some((Ok(format!("{label}{n}\n").into_bytes()), (n + 1, false)))
                }
            })
            .boxed(),
        };

        let tracked = Tracked::new(chunks, Arc::clone(&self.live_streams));
        Ok(Box::pin(tracked.into_async_read()))
    }
}

/// Pod with the given regular containers, running on a node
pub(crate) fn pod(name: &str, containers: &[&str]) -> Pod {
    pod_with(name, &[], containers, &[])
}

pub(crate) fn pod_with(name: &str, init: &[&str], containers: &[&str], ephemeral: &[&str]) -> Pod {
    let container = |n: &&str| Container {
        name: n.to_string(),
        ..Default::default()
    };
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), "shop".to_string())])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            init_containers: (!init.is_empty()).then(|| init.iter().map(container).collect()),
            containers: containers.iter().map(container).collect(),
            ephemeral_containers: (!ephemeral.is_empty()).then(|| {
                ephemeral
                    .iter()
                    .map(|n| EphemeralContainer {
                        name: n.to_string(),
                        ..Default::default()
                    })
                    .collect()
            }),
            node_name: Some("node-a".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}
