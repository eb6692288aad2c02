//! # Controller
//!
//! Turns pod lifecycle events into store writes.
//!
//! For every event the creator reads the pod's annotations and, unless the
//! pod is in local mode or declares no storage prefix, handles each parameter
//! independently:
//!
//! - `DELETED` leases release the pod's slot, bypassing the dedup cache
//! - recently handled parameters are skipped via the dedup cache
//! - leases are assigned (or reused) for the pod
//! - dynamic secrets are generated and written unless already present
//! - resources are never generated
//! - anything else is a per-parameter failure
//!
//! A failing parameter never stops its siblings. An event that fails as a
//! whole is counted as an exception and the loop carries on.

pub mod cache;
pub mod event;
pub mod latch;
pub mod locks;

pub use cache::ExpiringCache;
pub use event::{EventAction, LifecycleEvent, WorkloadRef};
pub use latch::CompletionLatch;
pub use locks::WorkloadLocks;

use crate::annotations::AnnotationSet;
use crate::constants::{
    API_KEY_PREFIX, FIELD_CONSUMER, FIELD_PASSWORD, FIELD_PRIVATE, FIELD_PROVIDER, FIELD_PUBLIC,
};
use crate::generator::{GeneratorError, SecretGenerator};
use crate::lease::{LeaseAllocator, LeaseError};
use crate::model::{LeaseParameter, Parameter, ParameterError, SecretKind, SecretParameter, SecretType};
use crate::observability::metrics;
use crate::storage::{StorageError, StorageProvider};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{kind} parameters cannot be created: {reason}")]
    Unsupported {
        kind: &'static str,
        reason: &'static str,
    },

    #[error("pod {workload} has no name to hold leases")]
    MissingRequester { workload: String },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Generation(#[from] GeneratorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error("secret generation task failed: {0}")]
    Task(String),
}

/// Why a whole event was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    IgnoredAction,
    LocalMode,
    NoStoragePrefix,
}

/// Result of handling one parameter.
#[derive(Debug)]
pub enum ParameterOutcome {
    /// Values written, one per stored field.
    Created { written: usize },
    AlreadyPresent,
    /// Nothing to do for this parameter type.
    Skipped,
    LeaseAssigned { index: u32, reused: bool },
    /// `index` is `None` when the pod held no slot.
    LeaseReleased { index: Option<u32> },
    /// Handled recently, skipped by the dedup cache.
    Cached,
    Failed(ControllerError),
}

impl ParameterOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug)]
pub struct ParameterReport {
    pub annotation: String,
    pub outcome: ParameterOutcome,
}

/// What happened to one event.
#[derive(Debug)]
pub struct EventReport {
    pub workload: WorkloadRef,
    pub action: EventAction,
    pub skipped: Option<SkipReason>,
    pub parameters: Vec<ParameterReport>,
}

impl EventReport {
    fn new(event: &LifecycleEvent) -> Self {
        Self {
            workload: event.workload.clone(),
            action: event.action,
            skipped: None,
            parameters: Vec::new(),
        }
    }

    fn skipped(mut self, reason: SkipReason) -> Self {
        self.skipped = Some(reason);
        self
    }

    /// Outcome for an annotation key, if it was handled.
    #[must_use]
    pub fn outcome(&self, annotation: &str) -> Option<&ParameterOutcome> {
        self.parameters
            .iter()
            .find(|report| report.annotation == annotation)
            .map(|report| &report.outcome)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.parameters
            .iter()
            .filter(|report| report.outcome.is_failure())
            .count()
    }
}

/// Event and exception counts of one creator.
#[derive(Debug, Default)]
pub struct CreatorStats {
    events: AtomicU64,
    exceptions: AtomicU64,
}

impl CreatorStats {
    #[must_use]
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn exceptions(&self) -> u64 {
        self.exceptions.load(Ordering::Relaxed)
    }
}

/// Handles pod events against a store.
#[derive(Debug)]
pub struct Creator {
    domain: String,
    store: Arc<dyn StorageProvider>,
    generator: Arc<dyn SecretGenerator>,
    leases: LeaseAllocator,
    cache: ExpiringCache<String>,
    locks: WorkloadLocks,
    stats: CreatorStats,
}

impl Creator {
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        store: Arc<dyn StorageProvider>,
        generator: Arc<dyn SecretGenerator>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            domain: domain.into(),
            leases: LeaseAllocator::new(Arc::clone(&store)),
            store,
            generator,
            cache: ExpiringCache::new(cache_ttl),
            locks: WorkloadLocks::new(),
            stats: CreatorStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> &CreatorStats {
        &self.stats
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn StorageProvider> {
        &self.store
    }

    /// Handle one event under the workload's lock, updating the counters.
    ///
    /// Ignored actions are neither handled nor counted. Returns `None` when
    /// the event failed as a whole.
    pub async fn process(&self, event: &LifecycleEvent) -> Option<EventReport> {
        if event.action == EventAction::Other {
            return Some(EventReport::new(event).skipped(SkipReason::IgnoredAction));
        }
        let _guard = self.locks.lock(&event.workload.to_string()).await;
        let span = info_span!(
            "creator.event",
            pod.namespace = %event.workload.namespace,
            pod.name = %event.workload.name,
            action = %event.action
        );
        let start = Instant::now();
        let result = self.handle_event(event).instrument(span).await;

        self.stats.events.fetch_add(1, Ordering::Relaxed);
        metrics::increment_events();
        metrics::observe_event_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(report) => Some(report),
            Err(e) => {
                self.stats.exceptions.fetch_add(1, Ordering::Relaxed);
                metrics::increment_event_exceptions();
                error!(pod = %event.workload, error = %e, "Error processing event");
                None
            }
        }
    }

    /// Handle one event. Per-parameter failures are part of the report.
    ///
    /// # Errors
    ///
    /// Fails only when the event as a whole cannot be handled.
    pub async fn handle_event(&self, event: &LifecycleEvent) -> Result<EventReport, ControllerError> {
        let report = EventReport::new(event);
        if event.action == EventAction::Other {
            return Ok(report.skipped(SkipReason::IgnoredAction));
        }

        let annotations = AnnotationSet::new(self.domain.clone(), event.annotations.clone());
        if annotations.is_local_mode() {
            info!(pod = %event.workload, "Pod is in local mode, skipping");
            return Ok(report.skipped(SkipReason::LocalMode));
        }
        let Some(prefix) = annotations.storage_prefix() else {
            debug!(pod = %event.workload, "No storage prefix declared, skipping");
            return Ok(report.skipped(SkipReason::NoStoragePrefix));
        };

        let parameters = annotations.parameters();
        let has_leases = parameters
            .iter()
            .any(|parsed| matches!(parsed, Ok(Parameter::Lease(_))));
        if has_leases && event.workload.name.is_empty() {
            return Err(ControllerError::MissingRequester {
                workload: event.workload.to_string(),
            });
        }
        if !parameters.is_empty() {
            info!(count = parameters.len(), pod = %event.workload, "Found matching annotations to process");
        }

        let mut report = report;
        for parsed in parameters {
            let (annotation, kind, outcome) = match parsed {
                Ok(parameter) => {
                    let span = info_span!(
                        "creator.parameter",
                        annotation = parameter.annotation(),
                        kind = parameter.kind_label()
                    );
                    let outcome = self
                        .handle_parameter(event, prefix, &parameter)
                        .instrument(span)
                        .await
                        .unwrap_or_else(ParameterOutcome::Failed);
                    (parameter.annotation().to_string(), parameter.kind_label(), outcome)
                }
                Err(e) => (
                    e.annotation().to_string(),
                    "invalid",
                    ParameterOutcome::Failed(e.into()),
                ),
            };
            if let ParameterOutcome::Failed(e) = &outcome {
                warn!(annotation = %annotation, error = %e, "Error completing processing for annotation");
                metrics::increment_parameter_failures(kind);
            }
            report.parameters.push(ParameterReport { annotation, outcome });
        }
        Ok(report)
    }

    async fn handle_parameter(
        &self,
        event: &LifecycleEvent,
        prefix: &str,
        parameter: &Parameter,
    ) -> Result<ParameterOutcome, ControllerError> {
        let requester = event.workload.name.as_str();
        let cache_key = cache_key(prefix, parameter, &event.workload);

        if let (EventAction::Deleted, Parameter::Lease(lease)) = (event.action, parameter) {
            let index = self.leases.release(prefix, lease, requester).await?;
            self.cache.remove(&cache_key);
            if index.is_some() {
                metrics::increment_leases_released();
            }
            return Ok(ParameterOutcome::LeaseReleased { index });
        }

        if self.cache.contains(&cache_key) {
            debug!(key = %cache_key, "Already handled recently, skipping");
            metrics::increment_cache_hits();
            return Ok(ParameterOutcome::Cached);
        }

        let outcome = match parameter {
            Parameter::Lease(lease) => self.assign_lease(prefix, lease, requester).await?,
            Parameter::Resource(_) => return Ok(ParameterOutcome::Skipped),
            Parameter::Secret(secret) => self.create_secret(prefix, secret).await?,
            Parameter::ResolvedLease(_) => {
                return Err(ControllerError::Unsupported {
                    kind: parameter.kind_label(),
                    reason: "resolved leases are only created by the allocator",
                })
            }
            Parameter::Custom(_) => {
                return Err(ControllerError::Unsupported {
                    kind: parameter.kind_label(),
                    reason: "custom values are fixed in the annotation",
                })
            }
        };
        self.cache.insert(cache_key);
        Ok(outcome)
    }

    async fn assign_lease(
        &self,
        prefix: &str,
        lease: &LeaseParameter,
        requester: &str,
    ) -> Result<ParameterOutcome, ControllerError> {
        let assignment = self.leases.assign(prefix, lease, requester).await?;
        if !assignment.reused {
            metrics::increment_leases_assigned();
        }
        Ok(ParameterOutcome::LeaseAssigned {
            index: assignment.index,
            reused: assignment.reused,
        })
    }

    async fn create_secret(
        &self,
        prefix: &str,
        secret: &SecretParameter,
    ) -> Result<ParameterOutcome, ControllerError> {
        if secret.kind() == SecretKind::Reference {
            return Err(ControllerError::Unsupported {
                kind: "secret",
                reason: "REFERENCE secrets are supplied externally",
            });
        }
        let parameter = Parameter::Secret(secret.clone());
        if self.store.exists(prefix, &parameter).await? {
            debug!("Value already present");
            return Ok(ParameterOutcome::AlreadyPresent);
        }

        info!(name = secret.name().bare(), "No matching value, creating");
        let values = self.generate(secret).await?;
        for (field, value) in &values {
            let target = match field {
                Some(field) => parameter.with_field(field),
                None => parameter.clone(),
            };
            // A concurrent creator may have won; keep its value.
            self.store.put(prefix, &target, value, true).await?;
        }
        let written = values.len();
        metrics::increment_secrets_created(u64::try_from(written).unwrap_or(u64::MAX));
        info!(name = secret.name().bare(), written, "Created value");
        Ok(ParameterOutcome::Created { written })
    }

    /// Generate the values to store, keyed by field override.
    ///
    /// Key generation is CPU bound, so it runs on the blocking pool.
    async fn generate(
        &self,
        secret: &SecretParameter,
    ) -> Result<Vec<(Option<&'static str>, String)>, ControllerError> {
        let generator = Arc::clone(&self.generator);
        let secret = secret.clone();
        tokio::task::spawn_blocking(move || generate_values(generator.as_ref(), &secret))
            .await
            .map_err(|e| ControllerError::Task(e.to_string()))?
    }
}

fn generate_values(
    generator: &dyn SecretGenerator,
    secret: &SecretParameter,
) -> Result<Vec<(Option<&'static str>, String)>, ControllerError> {
    let identity = secret.name().bare();
    let size = secret.size().ok_or(ControllerError::Unsupported {
        kind: "secret",
        reason: "dynamic secrets need a size",
    })?;

    let values = match secret.secret_type() {
        SecretType::Rsa | SecretType::Gpg => {
            let paired =
                generator.generate_paired_raw(secret.secret_type(), identity, size, secret.user_id())?;
            [FIELD_PUBLIC, FIELD_PRIVATE, FIELD_PASSWORD]
                .into_iter()
                .filter_map(|field| {
                    paired
                        .field(field)
                        .map(|value| (Some(field), STANDARD.encode(value)))
                })
                .collect()
        }
        SecretType::Random if identity.starts_with(API_KEY_PREFIX) => {
            let value = generator.generate_base64(SecretType::Random, identity, size)?;
            vec![
                (Some(FIELD_CONSUMER), value.clone()),
                (Some(FIELD_PROVIDER), value),
            ]
        }
        SecretType::Random | SecretType::Password => {
            vec![(None, generator.generate_base64(secret.secret_type(), identity, size)?)]
        }
    };
    Ok(values)
}

/// Dedup key: storage prefix and parameter identity, plus the pod for leases.
fn cache_key(prefix: &str, parameter: &Parameter, workload: &WorkloadRef) -> String {
    match parameter {
        Parameter::Lease(_) => format!("{prefix}/{}@{workload}", parameter.name().with_field()),
        _ => format!("{prefix}/{}", parameter.name().with_field()),
    }
}
