//! Deterministic pod ordering policies
//!
//! Both policies are a list of comparison steps evaluated in order until
//! one of them tells the two pods apart.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use kubelogs_types::{PodPhase, PodSnapshot};

type Step = fn(&PodSnapshot, &PodSnapshot) -> Ordering;

/// Which notion of "first" to sort pods by
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodOrdering {
    /// The first pod is the one whose logs are most likely useful
    BestForLogging,
    /// The first pod is the one a controller should delete first
    BestToTerminate,
}

const LOGGING_STEPS: &[Step] = &[
    // assigned < unassigned
    |a, b| b.is_assigned().cmp(&a.is_assigned()),
    // Running < Unknown < Pending
    |a, b| logging_phase_rank(a.phase).cmp(&logging_phase_rank(b.phase)),
    // ready < not ready
    |a, b| b.ready.cmp(&a.ready),
    // ready for longer < ready for less time < no ready time
    |a, b| {
        if a.ready && b.ready {
            earlier_first(a.ready_since, b.ready_since)
        } else {
            Ordering::Equal
        }
    },
    // more restarts < fewer restarts
    |a, b| b.max_restarts.cmp(&a.max_restarts),
    // older < newer < no creation time
    |a, b| earlier_first(a.created, b.created),
];

const TERMINATE_STEPS: &[Step] = &[
    // unassigned < assigned
    |a, b| a.is_assigned().cmp(&b.is_assigned()),
    // Pending < Unknown < Running
    |a, b| terminate_phase_rank(a.phase).cmp(&terminate_phase_rank(b.phase)),
    // not ready < ready
    |a, b| a.ready.cmp(&b.ready),
    // no ready time < ready for less time < ready for longer
    |a, b| {
        if a.ready && b.ready {
            later_first(a.ready_since, b.ready_since)
        } else {
            Ordering::Equal
        }
    },
    // more restarts < fewer restarts
    |a, b| b.max_restarts.cmp(&a.max_restarts),
    // no creation time < newer < older
    |a, b| later_first(a.created, b.created),
];

impl PodOrdering {
    fn steps(&self) -> &'static [Step] {
        match self {
            Self::BestForLogging => LOGGING_STEPS,
            Self::BestToTerminate => TERMINATE_STEPS,
        }
    }

    pub fn compare(&self, a: &PodSnapshot, b: &PodSnapshot) -> Ordering {
        self.steps()
            .iter()
            .map(|step| step(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// First pod under this ordering; ties keep input order
    pub fn first<'a>(&self, pods: &'a [PodSnapshot]) -> Option<&'a PodSnapshot> {
        pods.iter()
            .reduce(|best, pod| if self.compare(pod, best).is_lt() { pod } else { best })
    }
}

/// Stable sort of `pods` by `ordering`
pub fn sort_pods(pods: &mut [PodSnapshot], ordering: PodOrdering) {
    pods.sort_by(|a, b| ordering.compare(a, b));
}

// Phases missing from the rank tables share rank 0.
fn logging_phase_rank(phase: PodPhase) -> u8 {
    match phase {
        PodPhase::Unknown => 1,
        PodPhase::Pending => 2,
        _ => 0,
    }
}

fn terminate_phase_rank(phase: PodPhase) -> u8 {
    match phase {
        PodPhase::Unknown => 1,
        PodPhase::Running => 2,
        _ => 0,
    }
}

/// Chronological order where an unset time counts as the latest
fn earlier_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn later_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    earlier_first(b, a)
}
