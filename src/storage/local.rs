use super::{StorageError, StorageProvider};
use crate::generator::{seed_for, DeterministicGenerator, GeneratorError, SecretGenerator};
use crate::model::{Parameter, SecretKind, SecretParameter};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

const PROVIDER: &str = "local";

/// Store for local mode: nothing is persisted and every read is fabricated.
///
/// Values come from `localValue` when the annotation carries one, otherwise
/// from a [`DeterministicGenerator`] so repeated runs see the same data.
#[derive(Debug, Clone)]
pub struct LocalStorageProvider {
    generator: DeterministicGenerator,
}

impl LocalStorageProvider {
    /// # Errors
    ///
    /// Fails when the bundled key pool cannot be loaded.
    pub fn new() -> Result<Self, GeneratorError> {
        Ok(Self::with_generator(DeterministicGenerator::new()?))
    }

    #[must_use]
    pub fn with_generator(generator: DeterministicGenerator) -> Self {
        Self { generator }
    }

    fn secret_value(&self, secret: &SecretParameter) -> Result<String, StorageError> {
        if let Some(value) = secret.local_value() {
            return Ok(value.to_string());
        }
        let size = match (secret.kind(), secret.size()) {
            (SecretKind::Dynamic, Some(size)) => size,
            _ => {
                return Err(StorageError::CannotGenerateLocally {
                    annotation: secret.name().annotation().to_string(),
                })
            }
        };

        let identity = secret.name().with_field();
        if !secret.secret_type().is_paired() {
            return Ok(self.generator.generate_base64(secret.secret_type(), &identity, size)?);
        }

        let paired = self.generator.generate_paired_raw(
            secret.secret_type(),
            &identity,
            size,
            secret.user_id(),
        )?;
        // A paired type without a known field falls through to the single-value
        // path, which rejects it.
        match secret.name().field().and_then(|field| paired.field(field)) {
            Some(bytes) => Ok(STANDARD.encode(bytes)),
            None => Ok(self.generator.generate_base64(secret.secret_type(), &identity, size)?),
        }
    }
}

#[async_trait]
impl StorageProvider for LocalStorageProvider {
    async fn put(
        &self,
        _prefix: &str,
        _parameter: &Parameter,
        _value: &str,
        _ignore_if_exists: bool,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn delete(
        &self,
        _prefix: &str,
        _parameter: &Parameter,
        _expected_value: &str,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn get_value_by_key(
        &self,
        _prefix: &str,
        parameter: &Parameter,
    ) -> Result<Option<String>, StorageError> {
        match parameter {
            Parameter::Secret(secret) => self.secret_value(secret).map(Some),
            Parameter::Resource(resource) => resource
                .local_value()
                .map(|value| Some(value.to_string()))
                .ok_or_else(|| StorageError::CannotGenerateLocally {
                    annotation: parameter.annotation().to_string(),
                }),
            Parameter::Lease(_) | Parameter::ResolvedLease(_) | Parameter::Custom(_) => {
                Err(StorageError::Unsupported {
                    kind: parameter.kind_label(),
                    provider: PROVIDER,
                })
            }
        }
    }

    /// Fabricates a slot inside the lease range, stable for a given requester.
    async fn get_key_by_parameter_and_value(
        &self,
        prefix: &str,
        parameter: &Parameter,
        value: &str,
    ) -> Result<Option<String>, StorageError> {
        let Parameter::Lease(lease) = parameter else {
            return Ok(None);
        };
        let range = lease.range();
        let span = u64::from(range.end() - range.start()) + 1;
        let offset = u32::try_from(seed_for(&format!("{prefix}/{value}")) % span).unwrap_or(0);
        Ok(Some(format!(
            "{}.{}",
            lease.storage_full_path(prefix),
            range.start() + offset
        )))
    }

    async fn get_keys_by_parameter(
        &self,
        _prefix: &str,
        _parameter: &Parameter,
    ) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }

    async fn exists(&self, _prefix: &str, _parameter: &Parameter) -> Result<bool, StorageError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameter(key: &str, value: &str) -> Parameter {
        Parameter::construct("bsycorp.com", key, value).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_local_value_wins() {
        let store = LocalStorageProvider::new().unwrap();
        let secret = parameter(
            "secret.bsycorp.com/db.password",
            "kind=DYNAMIC,type=PASSWORD,size=128,localModeValue=hunter2",
        );
        assert_eq!(
            store.get_value_by_key("local", &secret).await.unwrap().as_deref(),
            Some("hunter2")
        );
    }

    #[tokio::test]
    async fn test_generated_values_are_stable() {
        let store = LocalStorageProvider::new().unwrap();
        let secret = parameter("secret.bsycorp.com/common.key", "kind=DYNAMIC,type=RANDOM,size=256");
        let first = store.get_value_by_key("local", &secret).await.unwrap();
        let second = store.get_value_by_key("local", &secret).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first, second, "local values must repeat across calls");
    }

    #[tokio::test]
    async fn test_rsa_fields_return_matching_halves() {
        let store = LocalStorageProvider::new().unwrap();
        let public = parameter("secret.bsycorp.com/service.v1_public", "kind=DYNAMIC,type=RSA,size=2048");
        let private = parameter("secret.bsycorp.com/service.v1_private", "kind=DYNAMIC,type=RSA,size=2048");
        let public = store.get_value_by_key("local", &public).await.unwrap().unwrap();
        let private = store.get_value_by_key("local", &private).await.unwrap().unwrap();
        assert_ne!(public, private);
        assert!(STANDARD.decode(&public).is_ok());
    }

    #[tokio::test]
    async fn test_rsa_without_field_is_rejected() {
        let store = LocalStorageProvider::new().unwrap();
        let secret = parameter("secret.bsycorp.com/service.v1", "kind=DYNAMIC,type=RSA,size=2048");
        let err = store.get_value_by_key("local", &secret).await.unwrap_err();
        assert!(matches!(err, StorageError::Generation(GeneratorError::NotSingle { .. })), "{err:?}");
    }

    #[tokio::test]
    async fn test_resource_without_local_value_fails() {
        let store = LocalStorageProvider::new().unwrap();
        let resource = parameter("resource.bsycorp.com/queue.url", "storageKey=queue");
        let err = store.get_value_by_key("local", &resource).await.unwrap_err();
        assert!(matches!(err, StorageError::CannotGenerateLocally { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_lease_key_lands_in_range() {
        let store = LocalStorageProvider::new().unwrap();
        let lease = parameter("lease.bsycorp.com/snowflake", "kind=INDEX,rangeStart=10,rangeEnd=12");
        let key = store
            .get_key_by_parameter_and_value("local", &lease, "pod-a")
            .await
            .unwrap()
            .unwrap();
        let Parameter::Lease(inner) = &lease else { unreachable!() };
        let index: u32 = inner.slot_from_key("local", &key).unwrap().parse().unwrap();
        assert!((10..=12).contains(&index), "slot {index} outside range");
        assert!(!store.exists("local", &lease).await.unwrap());
        assert!(store.get_keys_by_parameter("local", &lease).await.unwrap().is_empty());
    }
}
