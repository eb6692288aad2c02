//! # Init-Time Resolver
//!
//! One-shot resolution of a pod's annotated parameters, run as an init
//! container before the workload starts.
//!
//! Values are looked up in the store chosen by the pod's `local-mode`
//! annotation:
//!
//! | Mode | Lookup order |
//! |------|--------------|
//! | `local` | local store |
//! | `remote-then-local` | DynamoDB, then the local store |
//! | `remote` | DynamoDB |
//!
//! Secrets and custom values go to the secrets file, resources to the
//! resources file plus one decoded file per key, and leases to the leases
//! file plus one file per key holding the slot number. Output is keyed by
//! parameter name with field. If any parameter fails, nothing is written.

mod options;
mod output;

pub use options::InitOptions;
pub use output::{OutputPaths, OutputPlan};

use crate::annotations::{AnnotationSet, InitMode};
use crate::aws;
use crate::config::Settings;
use crate::generator::GeneratorError;
use crate::model::{LeaseParameter, Parameter, ParameterError};
use crate::storage::{DynamoDbStorageProvider, LocalStorageProvider, StorageError, StorageProvider};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, Instrument};

/// Prefix used when a pod declares no `storage-prefix`.
const ROOT_PREFIX: &str = "/";

#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to read annotations from {}: {source}", .path.display())]
    Annotations {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ENV_LABEL must be set when values come from the shared store")]
    MissingEnvLabel,

    #[error("failed to set up the local store: {0}")]
    LocalStore(#[from] GeneratorError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("lease '{annotation}' needs POD_NAME to identify the requester")]
    MissingRequester { annotation: String },

    #[error("no value for '{annotation}' at {path}")]
    NotFound { annotation: String, path: String },

    #[error("lookup for '{annotation}' failed: {source}")]
    Storage {
        annotation: String,
        source: StorageError,
    },

    #[error("lease key '{key}' for '{annotation}' has no slot suffix")]
    InvalidSlot { annotation: String, key: String },

    #[error("'{annotation}' is a {kind} parameter, which init does not resolve")]
    Unsupported {
        annotation: String,
        kind: &'static str,
    },

    #[error("value for '{key}' is not valid base64: {source}")]
    Decode {
        key: String,
        source: base64::DecodeError,
    },

    #[error("output key '{key}' would escape its directory")]
    UnsafeKey { key: String },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} annotated parameter(s) could not be resolved", .0.len())]
    Unresolved(Vec<InitError>),
}

/// Resolved values keyed by parameter name with field; values stay base64.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedValues {
    pub secrets: BTreeMap<String, String>,
    pub resources: BTreeMap<String, String>,
    /// Base64 of the decimal slot number
    pub leases: BTreeMap<String, String>,
}

impl ResolvedValues {
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len() + self.resources.len() + self.leases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Looks values up in a primary store with an optional fallback.
#[derive(Debug, Clone)]
pub struct Resolver {
    primary: Arc<dyn StorageProvider>,
    fallback: Option<Arc<dyn StorageProvider>>,
    requester: Option<String>,
}

impl Resolver {
    #[must_use]
    pub fn new(primary: Arc<dyn StorageProvider>) -> Self {
        Self {
            primary,
            fallback: None,
            requester: None,
        }
    }

    /// Store consulted when the primary has no value.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn StorageProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Identity that lease slots are held by.
    #[must_use]
    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    fn stores(&self) -> impl Iterator<Item = &Arc<dyn StorageProvider>> {
        std::iter::once(&self.primary).chain(self.fallback.as_ref())
    }

    /// Resolve every recognized annotation.
    ///
    /// # Errors
    ///
    /// [`InitError::Unresolved`] listing every failed parameter, after each
    /// has been logged.
    pub async fn resolve(&self, annotations: &AnnotationSet) -> Result<ResolvedValues, InitError> {
        let prefix = annotations.storage_prefix().unwrap_or(ROOT_PREFIX);
        let mut values = ResolvedValues::default();
        let mut failures = Vec::new();

        for parsed in annotations.parameters() {
            let result = match parsed {
                Ok(parameter) => self.resolve_parameter(prefix, &parameter, &mut values).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                error!(error = %e, "Failed to resolve parameter");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(values)
        } else {
            Err(InitError::Unresolved(failures))
        }
    }

    async fn resolve_parameter(
        &self,
        prefix: &str,
        parameter: &Parameter,
        values: &mut ResolvedValues,
    ) -> Result<(), InitError> {
        let key = parameter.name().with_field();
        let span = info_span!(
            "init.parameter",
            annotation = parameter.annotation(),
            kind = parameter.kind_label()
        );

        async move {
            match parameter {
                Parameter::Secret(_) => {
                    let value = self.lookup_value(prefix, parameter).await?;
                    values.secrets.insert(key, value);
                }
                Parameter::Custom(custom) => {
                    let value = match custom.fixed_value() {
                        Some(fixed) => fixed.to_string(),
                        None => self.lookup_value(prefix, parameter).await?,
                    };
                    values.secrets.insert(key, value);
                }
                Parameter::Resource(_) => {
                    let value = self.lookup_value(prefix, parameter).await?;
                    values.resources.insert(key, value);
                }
                Parameter::Lease(lease) => {
                    let slot = self.lookup_slot(prefix, lease).await?;
                    values.leases.insert(key, STANDARD.encode(slot));
                }
                Parameter::ResolvedLease(_) => {
                    return Err(InitError::Unsupported {
                        annotation: parameter.annotation().to_string(),
                        kind: parameter.kind_label(),
                    });
                }
            }
            debug!("resolved");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn lookup_value(&self, prefix: &str, parameter: &Parameter) -> Result<String, InitError> {
        for store in self.stores() {
            let found = store
                .get_value_by_key(prefix, parameter)
                .await
                .map_err(|source| InitError::Storage {
                    annotation: parameter.annotation().to_string(),
                    source,
                })?;
            if let Some(value) = found {
                return Ok(value);
            }
        }
        Err(InitError::NotFound {
            annotation: parameter.annotation().to_string(),
            path: parameter.storage_full_path(prefix),
        })
    }

    async fn lookup_slot(&self, prefix: &str, lease: &LeaseParameter) -> Result<String, InitError> {
        let annotation = lease.name().annotation();
        let requester = self
            .requester
            .as_deref()
            .ok_or_else(|| InitError::MissingRequester {
                annotation: annotation.to_string(),
            })?;
        let parameter = Parameter::Lease(lease.clone());

        for store in self.stores() {
            let found = store
                .get_key_by_parameter_and_value(prefix, &parameter, requester)
                .await
                .map_err(|source| InitError::Storage {
                    annotation: annotation.to_string(),
                    source,
                })?;
            if let Some(key) = found {
                return lease
                    .slot_from_key(prefix, &key)
                    .map(str::to_string)
                    .ok_or_else(|| InitError::InvalidSlot {
                        annotation: annotation.to_string(),
                        key: key.clone(),
                    });
            }
        }
        Err(InitError::NotFound {
            annotation: annotation.to_string(),
            path: parameter.storage_scan_prefix(prefix),
        })
    }
}

/// Resolve the pod's annotations and write the output files.
///
/// # Errors
///
/// Fails without writing anything when the annotations cannot be read, the
/// stores cannot be built, or any parameter fails to resolve.
pub async fn run(options: &InitOptions, settings: &Settings) -> Result<OutputPlan, InitError> {
    let annotations =
        AnnotationSet::read_flat_file(options.annotation_domain.clone(), &options.annotations_file)
            .map_err(|source| InitError::Annotations {
                path: options.annotations_file.clone(),
                source,
            })?;
    let mode = annotations.init_mode();
    info!(
        %mode,
        prefix = annotations.storage_prefix().unwrap_or(ROOT_PREFIX),
        "Resolving pod annotations"
    );

    let mut resolver = resolver_for_mode(mode, options, settings).await?;
    if let Some(requester) = options.requester() {
        resolver = resolver.with_requester(requester);
    }

    let values = resolver.resolve(&annotations).await?;
    let plan = OutputPlan::build(
        &values,
        &OutputPaths {
            secrets_file: options.secrets_file.clone(),
            resources_file: options.resources_file.clone(),
            resources_dir: options.resources_file_path.clone(),
            leases_file: options.leases_file.clone(),
            leases_dir: options.leases_file_path.clone(),
        },
    )?;
    plan.write()?;
    info!(
        secrets = values.secrets.len(),
        resources = values.resources.len(),
        leases = values.leases.len(),
        "Init complete"
    );
    Ok(plan)
}

async fn resolver_for_mode(
    mode: InitMode,
    options: &InitOptions,
    settings: &Settings,
) -> Result<Resolver, InitError> {
    if !mode.needs_remote() {
        return Ok(Resolver::new(Arc::new(LocalStorageProvider::new()?)));
    }

    let env_label = options
        .env_label
        .as_deref()
        .filter(|label| !label.trim().is_empty())
        .ok_or(InitError::MissingEnvLabel)?;
    let sdk_config = aws::load_sdk_config(settings).await;
    let remote = Arc::new(DynamoDbStorageProvider::new(
        &sdk_config,
        env_label,
        settings.aws_endpoint.as_deref(),
    ));

    let resolver = Resolver::new(remote);
    if mode == InitMode::RemoteThenLocal {
        Ok(resolver.with_fallback(Arc::new(LocalStorageProvider::new()?)))
    } else {
        Ok(resolver)
    }
}
