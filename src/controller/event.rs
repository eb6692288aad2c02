use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle transition of a pod as seen by the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    Added,
    Modified,
    Deleted,
    /// Bookkeeping events, ignored by the creator.
    Other,
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Other => "OTHER",
        })
    }
}

/// `namespace/name` of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One pod event, reduced to what the creator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub action: EventAction,
    pub workload: WorkloadRef,
    /// Empty when the pod has no annotations.
    pub annotations: BTreeMap<String, String>,
}

impl LifecycleEvent {
    #[must_use]
    pub fn new(
        action: EventAction,
        workload: WorkloadRef,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            action,
            workload,
            annotations,
        }
    }

    #[must_use]
    pub fn from_pod(action: EventAction, pod: &Pod) -> Self {
        let metadata = &pod.metadata;
        Self {
            action,
            workload: WorkloadRef::new(
                metadata.namespace.as_deref().unwrap_or("default"),
                metadata.name.as_deref().unwrap_or_default(),
            ),
            annotations: metadata.annotations.clone().unwrap_or_default(),
        }
    }
}
