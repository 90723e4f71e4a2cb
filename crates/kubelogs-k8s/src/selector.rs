//! Pod selectors for controller-style objects

use std::collections::BTreeMap;
use std::sync::LazyLock;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use regex::Regex;

use crate::error::{Error, Result};
use crate::object::LogObject;

static LABEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").unwrap());

static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

trait HasSelector {
    fn metadata(&self) -> &ObjectMeta;
    fn selector(&self) -> Option<&LabelSelector>;
}

impl HasSelector for Deployment {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|s| &s.selector)
    }
}

impl HasSelector for StatefulSet {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|s| &s.selector)
    }
}

impl HasSelector for DaemonSet {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|s| &s.selector)
    }
}

impl HasSelector for ReplicaSet {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().map(|s| &s.selector)
    }
}

impl HasSelector for Job {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn selector(&self) -> Option<&LabelSelector> {
        self.spec.as_ref().and_then(|s| s.selector.as_ref())
    }
}

fn from_label_selector<T: HasSelector>(object: &T, kind: &str) -> Result<(String, String)> {
    let meta = object.metadata();
    let namespace = meta.namespace.clone().unwrap_or_default();
    let selector = object.selector().ok_or_else(|| {
        Error::InvalidSelector(format!(
            "{} '{}' has no pod selector",
            kind,
            meta.name.as_deref().unwrap_or_default()
        ))
    })?;
    Ok((namespace, label_selector_string(selector)?))
}

/// Namespace and label selector of the pods an object manages
pub fn selector_for_object(object: &LogObject) -> Result<(String, String)> {
    match object {
        LogObject::Deployment(d) => from_label_selector(d.as_ref(), "Deployment"),
        LogObject::StatefulSet(s) => from_label_selector(s.as_ref(), "StatefulSet"),
        LogObject::DaemonSet(d) => from_label_selector(d.as_ref(), "DaemonSet"),
        LogObject::ReplicaSet(r) => from_label_selector(r.as_ref(), "ReplicaSet"),
        LogObject::Job(j) => from_label_selector(j.as_ref(), "Job"),
        LogObject::ReplicationController(rc) => {
            let namespace = rc.metadata.namespace.clone().unwrap_or_default();
            let empty = BTreeMap::new();
            let labels = rc
                .spec
                .as_ref()
                .and_then(|s| s.selector.as_ref())
                .unwrap_or(&empty);
            Ok((namespace, match_labels_string(labels)?))
        }
        LogObject::Service(svc) => {
            let namespace = svc.metadata.namespace.clone().unwrap_or_default();
            match svc.spec.as_ref().and_then(|s| s.selector.as_ref()) {
                Some(labels) if !labels.is_empty() => Ok((namespace, match_labels_string(labels)?)),
                _ => Err(Error::InvalidSelector(format!(
                    "invalid service '{}': Service is defined without a selector",
                    svc.metadata.name.as_deref().unwrap_or_default()
                ))),
            }
        }
        other => Err(Error::UnsupportedSelector {
            kind: other.kind().to_string(),
        }),
    }
}

/// Render an equality-only label map as `k1=v1,k2=v2`
pub fn match_labels_string(labels: &BTreeMap<String, String>) -> Result<String> {
    let mut parts = Vec::with_capacity(labels.len());
    for (key, value) in labels {
        validate_key(key)?;
        validate_value(key, value)?;
        parts.push(format!("{}={}", key, value));
    }
    Ok(parts.join(","))
}

/// Render a `LabelSelector` in the API server's selector syntax.
///
/// Requirements are ordered by key; an empty selector renders as the empty
/// string and matches every pod.
pub fn label_selector_string(selector: &LabelSelector) -> Result<String> {
    let mut requirements: Vec<(String, String)> = Vec::new();

    if let Some(labels) = &selector.match_labels {
        for (key, value) in labels {
            validate_key(key)?;
            validate_value(key, value)?;
            requirements.push((key.clone(), format!("{}={}", key, value)));
        }
    }

    for expr in selector.match_expressions.iter().flatten() {
        validate_key(&expr.key)?;
        let mut values = expr.values.clone().unwrap_or_default();
        values.sort();
        for value in &values {
            validate_value(&expr.key, value)?;
        }

        let rendered = match expr.operator.as_str() {
            "In" | "NotIn" => {
                if values.is_empty() {
                    return Err(Error::InvalidSelector(format!(
                        "values for key {} must be non-empty for operator {}",
                        expr.key, expr.operator
                    )));
                }
                let op = if expr.operator == "In" { "in" } else { "notin" };
                format!("{} {} ({})", expr.key, op, values.join(","))
            }
            "Exists" | "DoesNotExist" => {
                if !values.is_empty() {
                    return Err(Error::InvalidSelector(format!(
                        "values for key {} must be empty for operator {}",
                        expr.key, expr.operator
                    )));
                }
                if expr.operator == "Exists" {
                    expr.key.clone()
                } else {
                    format!("!{}", expr.key)
                }
            }
            op => {
                return Err(Error::InvalidSelector(format!(
                    "{:?} is not a valid label selector operator",
                    op
                )));
            }
        };
        requirements.push((expr.key.clone(), rendered));
    }

    requirements.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(requirements
        .into_iter()
        .map(|(_, r)| r)
        .collect::<Vec<_>>()
        .join(","))
}

fn validate_key(key: &str) -> Result<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    let prefix_ok = prefix.is_none_or(|p| p.len() <= 253 && DNS_SUBDOMAIN.is_match(p));
    if !prefix_ok || name.len() > 63 || !LABEL_NAME.is_match(name) {
        return Err(Error::InvalidSelector(format!("invalid label key {:?}", key)));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > 63 || !LABEL_NAME.is_match(value) {
        return Err(Error::InvalidSelector(format!(
            "invalid label value {:?} for key {:?}",
            value, key
        )));
    }
    Ok(())
}
