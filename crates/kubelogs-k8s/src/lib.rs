//! Kubernetes access for kubelogs
//!
//! This crate provides the [`ResourceProvider`] seam the log engine talks to,
//! a `kube`-backed implementation of it, and the helpers that turn API
//! objects into the plain types of `kubelogs-types`.

mod client;
mod error;
mod object;
mod options;
mod pod;
mod provider;
mod selector;

pub use client::KubeProvider;
pub use error::{BoxError, Error, Result};
pub use object::{LogObject, ObjectKind};
pub use options::LogOptions;
pub use pod::PodExt;
pub use provider::{LogStream, PodEvent, PodEventStream, PodList, ResourceProvider};
pub use selector::{label_selector_string, match_labels_string, selector_for_object};

// Re-export types that are used in our public API
pub use k8s_openapi::api::core::v1::Pod;
pub use kubelogs_types::{ContainerRef, ContainerRole, PodPhase, PodSnapshot};
