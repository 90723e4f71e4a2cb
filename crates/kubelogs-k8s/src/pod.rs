use k8s_openapi::api::core::v1::Pod;
use kubelogs_types::{ContainerRef, ContainerRole, PodPhase, PodSnapshot};

/// Helpers for reading the bits of a pod the log engine cares about
pub trait PodExt {
    fn name(&self) -> &str;

    fn namespace(&self) -> &str;

    /// Snapshot used by the ordering policies
    fn snapshot(&self) -> PodSnapshot;

    /// Every declared container: init, then regular, then ephemeral
    fn container_refs(&self) -> Vec<ContainerRef>;

    /// First declared regular container
    fn first_container(&self) -> Option<ContainerRef>;

    /// Look a container up by name, regular containers first
    fn find_container(&self, name: &str) -> Option<ContainerRef>;

    /// Comma separated list of container names for diagnostics
    fn container_names(&self) -> String;
}

impl PodExt for Pod {
    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    fn snapshot(&self) -> PodSnapshot {
        let mut snapshot = PodSnapshot::new(self.name(), self.namespace());
        snapshot.node_name = self.spec.as_ref().and_then(|s| s.node_name.clone());
        snapshot.created = self.metadata.creation_timestamp.as_ref().map(|t| t.0);

        if let Some(status) = &self.status {
            snapshot.phase = status
                .phase
                .as_deref()
                .map(PodPhase::from)
                .unwrap_or(PodPhase::Unknown);

            let ready = status
                .conditions
                .iter()
                .flatten()
                .find(|c| c.type_ == "Ready" && c.status == "True");
            snapshot.ready = ready.is_some();
            snapshot.ready_since = ready.and_then(|c| c.last_transition_time.as_ref().map(|t| t.0));

            snapshot.max_restarts = status
                .container_statuses
                .iter()
                .flatten()
                .map(|cs| cs.restart_count)
                .max()
                .unwrap_or(0)
                .max(0);
        }

        snapshot
    }

    fn container_refs(&self) -> Vec<ContainerRef> {
        let Some(spec) = &self.spec else {
            return Vec::new();
        };

        let init = spec
            .init_containers
            .iter()
            .flatten()
            .map(|c| (c.name.as_str(), ContainerRole::Init));
        let main = spec
            .containers
            .iter()
            .map(|c| (c.name.as_str(), ContainerRole::Main));
        let ephemeral = spec
            .ephemeral_containers
            .iter()
            .flatten()
            .map(|c| (c.name.as_str(), ContainerRole::Ephemeral));

        init.chain(main)
            .chain(ephemeral)
            .map(|(name, role)| ContainerRef::new(self.namespace(), self.name(), name, role))
            .collect()
    }

    fn first_container(&self) -> Option<ContainerRef> {
        let spec = self.spec.as_ref()?;
        let first = spec.containers.first()?;
        Some(ContainerRef::new(
            self.namespace(),
            self.name(),
            first.name.as_str(),
            ContainerRole::Main,
        ))
    }

    fn find_container(&self, name: &str) -> Option<ContainerRef> {
        let refs = self.container_refs();
        [ContainerRole::Main, ContainerRole::Init, ContainerRole::Ephemeral]
            .into_iter()
            .find_map(|role| {
                refs.iter()
                    .find(|r| r.role == role && r.container == name)
                    .cloned()
            })
    }

    fn container_names(&self) -> String {
        self.container_refs()
            .iter()
            .map(|r| match r.role {
                ContainerRole::Main => r.container.clone(),
                ContainerRole::Init => format!("{} (init)", r.container),
                ContainerRole::Ephemeral => format!("{} (ephem)", r.container),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
