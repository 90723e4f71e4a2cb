use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;

use kubelogs_k8s::{Error, PodEvent, PodEventStream, PodExt, ResourceProvider, Result};
use kubelogs_types::PodSnapshot;

use crate::ordering::PodOrdering;

/// The pod picked for a selector
#[derive(Clone, Debug)]
pub struct PodMatch {
    pub pod: Pod,
    /// How many pods matched the selector when it was listed
    pub total: usize,
}

impl PodMatch {
    pub fn snapshot(&self) -> PodSnapshot {
        self.pod.snapshot()
    }
}

/// Finds one pod for a selector, waiting for it to show up if needed
pub struct PodWaiter<'a> {
    provider: &'a dyn ResourceProvider,
}

impl<'a> PodWaiter<'a> {
    pub fn new(provider: &'a dyn ResourceProvider) -> Self {
        Self { provider }
    }

    /// Return the best pod for logging among those matching `selector`.
    ///
    /// When nothing matches yet, watches from the listed resource version
    /// until a pod is added or modified. A zero `timeout` waits without limit.
    pub async fn wait_for_pod(
        &self,
        namespace: &str,
        selector: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<PodMatch> {
        let list = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            list = self.provider.list_pods(namespace, selector) => list?,
        };

        if !list.items.is_empty() {
            let total = list.items.len();
            let mut ranked: Vec<(PodSnapshot, Pod)> = list
                .items
                .into_iter()
                .map(|pod| (pod.snapshot(), pod))
                .collect();
            ranked.sort_by(|a, b| PodOrdering::BestForLogging.compare(&a.0, &b.0));

            let Some((_, pod)) = ranked.into_iter().next() else {
                return Err(Error::NotFound(format!(
                    "no pods found for selector {:?} in namespace {}",
                    selector, namespace
                )));
            };
            if total > 1 {
                tracing::info!("Found {} pods, using pod/{}", total, pod.name());
            }
            return Ok(PodMatch { pod, total });
        }

        tracing::debug!(namespace, selector, ?timeout, "no pods yet, watching");
        let mut events = self
            .provider
            .watch_pods(namespace, selector, &list.resource_version)
            .await?;

        let pod = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            pod = with_optional_timeout(
                timeout,
                first_pod(&mut events, namespace, selector),
            ) => pod,
        };

        match pod {
            Some(pod) => Ok(PodMatch { pod: pod?, total: 1 }),
            None => Err(Error::NotFound(format!(
                "timed out after {:?} waiting for a pod matching {:?} in namespace {}",
                timeout, selector, namespace
            ))),
        }
    }
}

/// First pod the watch reports as added or modified
async fn first_pod(events: &mut PodEventStream, namespace: &str, selector: &str) -> Result<Pod> {
    while let Some(event) = events.next().await {
        match event? {
            PodEvent::Added(pod) | PodEvent::Modified(pod) => return Ok(pod),
            PodEvent::Error(message) => return Err(Error::Watch(message)),
            PodEvent::Deleted(_) | PodEvent::Bookmark => {}
        }
    }
    Err(Error::NotFound(format!(
        "watch for pods matching {:?} in namespace {} closed before one appeared",
        selector, namespace
    )))
}

async fn with_optional_timeout<F: Future>(timeout: Duration, fut: F) -> Option<F::Output> {
    if timeout.is_zero() {
        Some(fut.await)
    } else {
        tokio::time::timeout(timeout, fut).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, pod};
    use k8s_openapi::api::core::v1::PodStatus;
    use tokio::time::Instant;

    fn with_phase(mut pod: Pod, phase: &str, restarts: i32) -> Pod {
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: Some(vec![k8s_openapi::api::core::v1::ContainerStatus {
                name: "app".to_string(),
                restart_count: restarts,
                ..Default::default()
            }]),
            ..Default::default()
        });
        pod
    }

    #[tokio::test]
    async fn test_returns_best_existing_pod() {
        let provider = FakeProvider::new();
        provider.add_pod(with_phase(pod("pending", &["app"]), "Pending", 0));
        provider.add_pod(with_phase(pod("running", &["app"]), "Running", 0));
        provider.add_pod(with_phase(pod("crashy", &["app"]), "Running", 5));

        let found = PodWaiter::new(&provider)
            .wait_for_pod("default", "app=shop", Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.pod.name(), "crashy");
        assert_eq!(found.total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_not_found() {
        let provider = FakeProvider::new();
        let started = Instant::now();

        let err = PodWaiter::new(&provider)
            .wait_for_pod("default", "app=shop", Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err:?}");
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_added_pod() {
        let provider = FakeProvider::new();
        let events = provider.watch_channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            events.send(PodEvent::Bookmark).await.unwrap();
            events.send(PodEvent::Deleted(pod("old", &["app"]))).await.unwrap();
            events.send(PodEvent::Added(pod("new", &["app"]))).await.unwrap();
        });

        let found = PodWaiter::new(&provider)
            .wait_for_pod("default", "app=shop", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found.pod.name(), "new");
        assert_eq!(found.total, 1);
    }

    #[tokio::test]
    async fn test_watch_error_event() {
        let provider = FakeProvider::new();
        let events = provider.watch_channel();
        events
            .send(PodEvent::Error("too old resource version".to_string()))
            .await
            .unwrap();

        let err = PodWaiter::new(&provider)
            .wait_for_pod("default", "app=shop", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Watch(msg) if msg.contains("too old")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let provider = FakeProvider::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = PodWaiter::new(&provider)
            .wait_for_pod("default", "app=shop", Duration::ZERO, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
