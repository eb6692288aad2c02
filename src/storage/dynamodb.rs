//! # DynamoDB Store
//!
//! Items live in the `<env label>-kube-secret` table with two string
//! attributes: `secretName` (hash key, the full storage path) and
//! `secretValue`. Inserts and lease releases are conditional writes so
//! concurrent controllers never overwrite each other.

use super::{StorageError, StorageProvider};
use crate::model::Parameter;
use crate::observability::metrics;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

const NAME_ATTRIBUTE: &str = "secretName";
const VALUE_ATTRIBUTE: &str = "secretValue";

type Item = HashMap<String, AttributeValue>;

pub struct DynamoDbStorageProvider {
    client: Client,
    table: String,
}

impl std::fmt::Debug for DynamoDbStorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStorageProvider")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl DynamoDbStorageProvider {
    /// Build a client for the environment's table.
    ///
    /// `endpoint` overrides the service endpoint, for local DynamoDB.
    #[must_use]
    pub fn new(sdk_config: &SdkConfig, env_label: &str, endpoint: Option<&str>) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Self::from_client(Client::from_conf(builder.build()), Self::table_name(env_label))
    }

    #[must_use]
    pub fn from_client(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    #[must_use]
    pub fn table_name(env_label: &str) -> String {
        format!("{env_label}-kube-secret")
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn backend_error<E>(path: &str, operation: &'static str, error: &E) -> StorageError
    where
        E: std::error::Error,
    {
        metrics::increment_storage_operation_errors(operation);
        let message = DisplayErrorContext(error).to_string();
        warn!(storage.path = path, operation, error = %message, "DynamoDB call failed");
        StorageError::Backend {
            path: path.to_string(),
            message,
        }
    }

    fn string_attribute(item: &Item, name: &str) -> Option<String> {
        item.get(name).and_then(|value| value.as_s().ok()).cloned()
    }

    /// Scan every item whose name starts with `scan_prefix`, following pagination.
    ///
    /// With `value`, only items holding that value are returned.
    async fn scan_names(
        &self,
        scan_prefix: &str,
        value: Option<&str>,
        stop_at_first: bool,
    ) -> Result<Vec<String>, StorageError> {
        let filter = if value.is_some() {
            "begins_with(secretName, :prefix) AND secretValue = :value"
        } else {
            "begins_with(secretName, :prefix)"
        };
        let mut names = Vec::new();
        let mut exclusive_start_key: Option<Item> = None;
        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.table)
                .consistent_read(true)
                .projection_expression(NAME_ATTRIBUTE)
                .filter_expression(filter)
                .expression_attribute_values(":prefix", AttributeValue::S(scan_prefix.to_string()))
                .set_exclusive_start_key(exclusive_start_key.take());
            if let Some(value) = value {
                request =
                    request.expression_attribute_values(":value", AttributeValue::S(value.to_string()));
            }
            let page = request
                .send()
                .await
                .map_err(|e| Self::backend_error(scan_prefix, "scan", &e))?;

            names.extend(
                page.items()
                    .iter()
                    .filter_map(|item| Self::string_attribute(item, NAME_ATTRIBUTE)),
            );
            if stop_at_first && !names.is_empty() {
                break;
            }
            match page.last_evaluated_key() {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key.clone()),
                _ => break,
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl StorageProvider for DynamoDbStorageProvider {
    async fn put(
        &self,
        prefix: &str,
        parameter: &Parameter,
        value: &str,
        ignore_if_exists: bool,
    ) -> Result<(), StorageError> {
        let path = parameter.storage_full_path(prefix);
        let span = info_span!("dynamodb.put", storage.path = %path, table = %self.table);
        let start = Instant::now();

        async move {
            let result = self
                .client
                .put_item()
                .table_name(&self.table)
                .item(NAME_ATTRIBUTE, AttributeValue::S(path.clone()))
                .item(VALUE_ATTRIBUTE, AttributeValue::S(value.to_string()))
                .condition_expression("attribute_not_exists(secretName)")
                .send()
                .await;
            metrics::record_storage_operation("put", start.elapsed().as_secs_f64());

            match result {
                Ok(_) => {
                    debug!("stored item");
                    Ok(())
                }
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
                {
                    if ignore_if_exists {
                        debug!("item already present, ignoring");
                        Ok(())
                    } else {
                        Err(StorageError::Conflict { path })
                    }
                }
                Err(e) => Err(Self::backend_error(&path, "put", &e)),
            }
        }
        .instrument(span)
        .await
    }

    async fn delete(
        &self,
        prefix: &str,
        parameter: &Parameter,
        expected_value: &str,
    ) -> Result<bool, StorageError> {
        let path = parameter.storage_full_path(prefix);
        let span = info_span!("dynamodb.delete", storage.path = %path, table = %self.table);
        let start = Instant::now();

        async move {
            let result = self
                .client
                .delete_item()
                .table_name(&self.table)
                .key(NAME_ATTRIBUTE, AttributeValue::S(path.clone()))
                .condition_expression("secretValue = :value")
                .expression_attribute_values(":value", AttributeValue::S(expected_value.to_string()))
                .send()
                .await;
            metrics::record_storage_operation("delete", start.elapsed().as_secs_f64());

            match result {
                Ok(_) => Ok(true),
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
                {
                    debug!("item missing or held by another value, nothing deleted");
                    Ok(false)
                }
                Err(e) => Err(Self::backend_error(&path, "delete", &e)),
            }
        }
        .instrument(span)
        .await
    }

    async fn get_value_by_key(
        &self,
        prefix: &str,
        parameter: &Parameter,
    ) -> Result<Option<String>, StorageError> {
        let path = parameter.storage_full_path(prefix);
        let span = info_span!("dynamodb.get", storage.path = %path, table = %self.table);
        let start = Instant::now();

        async move {
            let output = self
                .client
                .get_item()
                .table_name(&self.table)
                .key(NAME_ATTRIBUTE, AttributeValue::S(path.clone()))
                .consistent_read(true)
                .send()
                .await
                .map_err(|e| Self::backend_error(&path, "get", &e))?;
            metrics::record_storage_operation("get", start.elapsed().as_secs_f64());
            Ok(output
                .item()
                .and_then(|item| Self::string_attribute(item, VALUE_ATTRIBUTE)))
        }
        .instrument(span)
        .await
    }

    async fn get_key_by_parameter_and_value(
        &self,
        prefix: &str,
        parameter: &Parameter,
        value: &str,
    ) -> Result<Option<String>, StorageError> {
        let scan_prefix = parameter.storage_scan_prefix(prefix);
        let span = info_span!("dynamodb.scan_by_value", storage.prefix = %scan_prefix);
        let start = Instant::now();

        async move {
            let names = self.scan_names(&scan_prefix, Some(value), true).await?;
            metrics::record_storage_operation("scan", start.elapsed().as_secs_f64());
            Ok(names.into_iter().next())
        }
        .instrument(span)
        .await
    }

    async fn get_keys_by_parameter(
        &self,
        prefix: &str,
        parameter: &Parameter,
    ) -> Result<Vec<String>, StorageError> {
        let scan_prefix = parameter.storage_scan_prefix(prefix);
        let span = info_span!("dynamodb.scan", storage.prefix = %scan_prefix);
        let start = Instant::now();

        async move {
            let names = self.scan_names(&scan_prefix, None, false).await?;
            metrics::record_storage_operation("scan", start.elapsed().as_secs_f64());
            Ok(names)
        }
        .instrument(span)
        .await
    }

    async fn exists(&self, prefix: &str, parameter: &Parameter) -> Result<bool, StorageError> {
        let path = parameter.storage_full_path(prefix);
        let start = Instant::now();
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(NAME_ATTRIBUTE, AttributeValue::S(path.clone()))
            .projection_expression(NAME_ATTRIBUTE)
            .consistent_read(true)
            .send()
            .instrument(info_span!("dynamodb.exists", storage.path = %path))
            .await
            .map_err(|e| Self::backend_error(&path, "exists", &e))?;
        metrics::record_storage_operation("exists", start.elapsed().as_secs_f64());
        Ok(output.item().is_some_and(|item| !item.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_uses_env_label() {
        assert_eq!(DynamoDbStorageProvider::table_name("dev"), "dev-kube-secret");
    }

    #[test]
    fn test_string_attribute_ignores_other_types() {
        let mut item = Item::new();
        item.insert(VALUE_ATTRIBUTE.to_string(), AttributeValue::N("3".to_string()));
        item.insert(NAME_ATTRIBUTE.to_string(), AttributeValue::S("dev/x".to_string()));
        assert_eq!(DynamoDbStorageProvider::string_attribute(&item, VALUE_ATTRIBUTE), None);
        assert_eq!(
            DynamoDbStorageProvider::string_attribute(&item, NAME_ATTRIBUTE).as_deref(),
            Some("dev/x")
        );
    }

    #[tokio::test]
    async fn test_debug_hides_client() {
        let sdk_config = SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("ap-southeast-2"))
            .build();
        let store = DynamoDbStorageProvider::new(&sdk_config, "dev", Some("http://localhost:8000"));
        let rendered = format!("{store:?}");
        assert!(rendered.contains("dev-kube-secret"), "{rendered}");
        assert_eq!(store.table(), "dev-kube-secret");
    }
}
