//! # AWS SDK Configuration
//!
//! Builds the shared [`SdkConfig`] for the DynamoDB store.
//!
//! When a role ARN and a web identity token file are configured, credentials
//! come from [`WebIdentityStsProvider`], which calls STS at the configured
//! endpoint. Otherwise the SDK's default credential chain is used.

mod web_identity;

pub use web_identity::WebIdentityStsProvider;

use crate::config::Settings;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

/// Load the SDK configuration for the configured region and credentials.
pub async fn load_sdk_config(settings: &Settings) -> SdkConfig {
    let region = Region::new(settings.aws_region.clone());
    let base = aws_config::defaults(BehaviorVersion::latest())
        .region(region.clone())
        .load()
        .await;

    let Some(provider) = WebIdentityStsProvider::from_settings(settings, &base) else {
        info!(region = %settings.aws_region, "Using default AWS credential chain");
        return base;
    };

    info!(
        region = %settings.aws_region,
        role_arn = provider.role_arn(),
        sts_endpoint = settings.aws_sts_endpoint.as_deref().unwrap_or("default"),
        "Assuming role with web identity token"
    );
    aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .credentials_provider(provider)
        .load()
        .await
}
