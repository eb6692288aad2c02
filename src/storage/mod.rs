//! # Storage Providers
//!
//! Abstraction over the shared key-value backing store. Items have two
//! attributes, a name (the full storage path) and a string value.
//!
//! All mutation goes through the conditional primitives:
//!
//! - `put` only inserts when no item exists at the path
//! - `delete` only removes the item when its value still matches
//!
//! Implementations:
//!
//! - [`DynamoDbStorageProvider`] - the shared store used in clusters
//! - [`LocalStorageProvider`] - no store at all, values are fabricated deterministically
//! - [`InMemoryStorageProvider`] - a process-local map with the same conditional semantics

mod dynamodb;
mod local;
mod memory;

pub use dynamodb::DynamoDbStorageProvider;
pub use local::LocalStorageProvider;
pub use memory::{InMemoryStorageProvider, StoreCounters};

use crate::generator::GeneratorError;
use crate::model::Parameter;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// A conditional insert found an existing item.
    #[error("an item already exists at {path}")]
    Conflict { path: String },

    #[error("backing store call failed for {path}: {message}")]
    Backend { path: String, message: String },

    #[error("{kind} parameters are not supported by the {provider} store")]
    Unsupported {
        kind: &'static str,
        provider: &'static str,
    },

    #[error("cannot generate a local value for {annotation}")]
    CannotGenerateLocally { annotation: String },

    #[error(transparent)]
    Generation(#[from] GeneratorError),
}

impl StorageError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Shared key-value store keyed by `parameter.storage_full_path(prefix)`.
#[async_trait]
pub trait StorageProvider: Send + Sync + std::fmt::Debug {
    /// Insert `value` only if nothing exists at the parameter's path.
    ///
    /// On conflict, `ignore_if_exists` turns the call into a successful no-op;
    /// otherwise it fails with [`StorageError::Conflict`].
    async fn put(
        &self,
        prefix: &str,
        parameter: &Parameter,
        value: &str,
        ignore_if_exists: bool,
    ) -> Result<(), StorageError>;

    /// Remove the item only if its value equals `expected_value`.
    ///
    /// Returns whether an item was removed.
    async fn delete(
        &self,
        prefix: &str,
        parameter: &Parameter,
        expected_value: &str,
    ) -> Result<bool, StorageError>;

    /// Point lookup. Absence is `Ok(None)`.
    async fn get_value_by_key(
        &self,
        prefix: &str,
        parameter: &Parameter,
    ) -> Result<Option<String>, StorageError>;

    /// First key under the parameter's scan prefix whose value equals `value`.
    async fn get_key_by_parameter_and_value(
        &self,
        prefix: &str,
        parameter: &Parameter,
        value: &str,
    ) -> Result<Option<String>, StorageError>;

    /// Every key under the parameter's scan prefix.
    async fn get_keys_by_parameter(
        &self,
        prefix: &str,
        parameter: &Parameter,
    ) -> Result<Vec<String>, StorageError>;

    /// Whether an item exists at the parameter's path.
    async fn exists(&self, prefix: &str, parameter: &Parameter) -> Result<bool, StorageError>;
}
