use crate::config::Settings;
use aws_config::SdkConfig;
use aws_credential_types::provider::{self, error::CredentialsError, future, ProvideCredentials};
use aws_credential_types::Credentials;
use aws_sdk_sts::error::DisplayErrorContext;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info_span, Instrument};

const PROVIDER_NAME: &str = "WebIdentitySts";

/// Assumes a role with the projected service account token.
///
/// Unlike the SDK's built-in web identity provider, the STS client honours
/// an explicit endpoint, so regional or private endpoints can be used.
pub struct WebIdentityStsProvider {
    client: aws_sdk_sts::Client,
    role_arn: String,
    session_name: String,
    token_file: PathBuf,
}

impl std::fmt::Debug for WebIdentityStsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebIdentityStsProvider")
            .field("role_arn", &self.role_arn)
            .field("session_name", &self.session_name)
            .field("token_file", &self.token_file)
            .finish_non_exhaustive()
    }
}

impl WebIdentityStsProvider {
    /// Build from settings, or `None` when no role or token file is configured.
    #[must_use]
    pub fn from_settings(settings: &Settings, base: &SdkConfig) -> Option<Self> {
        let role_arn = settings.role_arn.clone()?;
        let token_file = settings.web_identity_token_file.clone()?;
        Some(Self::new(
            base,
            settings.aws_sts_endpoint.as_deref(),
            role_arn,
            settings.role_session_name.clone(),
            token_file,
        ))
    }

    #[must_use]
    pub fn new(
        base: &SdkConfig,
        sts_endpoint: Option<&str>,
        role_arn: String,
        session_name: String,
        token_file: PathBuf,
    ) -> Self {
        let mut builder = aws_sdk_sts::config::Builder::from(base);
        if let Some(endpoint) = sts_endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Self {
            client: aws_sdk_sts::Client::from_conf(builder.build()),
            role_arn,
            session_name,
            token_file,
        }
    }

    #[must_use]
    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    #[must_use]
    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    async fn load(&self) -> provider::Result {
        let token = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                CredentialsError::not_loaded(format!(
                    "cannot read web identity token {}: {e}",
                    self.token_file.display()
                ))
            })?;

        let output = self
            .client
            .assume_role_with_web_identity()
            .role_arn(&self.role_arn)
            .role_session_name(&self.session_name)
            .web_identity_token(token.trim())
            .send()
            .await
            .map_err(|e| CredentialsError::provider_error(DisplayErrorContext(&e).to_string()))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| CredentialsError::unhandled("STS returned no credentials"))?;
        let expiry = SystemTime::try_from(*credentials.expiration())
            .map_err(|e| CredentialsError::unhandled(e.to_string()))?;
        debug!(role_arn = %self.role_arn, "assumed role");

        Ok(Credentials::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            Some(credentials.session_token().to_string()),
            Some(expiry),
            PROVIDER_NAME,
        ))
    }
}

impl ProvideCredentials for WebIdentityStsProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(
            self.load()
                .instrument(info_span!("sts.assume_role_with_web_identity", role_arn = %self.role_arn)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::{BehaviorVersion, Region};
    use std::collections::HashMap;

    fn base() -> SdkConfig {
        SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("ap-southeast-2"))
            .build()
    }

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        Settings::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_requires_role_and_token_file() {
        let only_role = settings(&[("AWS_ROLE_ARN", "arn:aws:iam::1:role/x")]);
        assert!(WebIdentityStsProvider::from_settings(&only_role, &base()).is_none());

        let both = settings(&[
            ("AWS_ROLE_ARN", "arn:aws:iam::1:role/x"),
            ("AWS_WEB_IDENTITY_TOKEN_FILE", "/var/run/token"),
            ("AWS_STS_ENDPOINT", "https://sts.ap-southeast-2.amazonaws.com"),
        ]);
        let provider = WebIdentityStsProvider::from_settings(&both, &base()).unwrap();
        assert_eq!(provider.role_arn(), "arn:aws:iam::1:role/x");
        assert_eq!(provider.token_file(), Path::new("/var/run/token"));
    }

    #[tokio::test]
    async fn test_missing_token_file_is_not_loaded() {
        let provider = WebIdentityStsProvider::new(
            &base(),
            Some("http://127.0.0.1:9"),
            "arn:aws:iam::1:role/x".to_string(),
            "test".to_string(),
            PathBuf::from("/nonexistent/token"),
        );
        let err = provider.provide_credentials().await.unwrap_err();
        assert!(
            matches!(err, CredentialsError::CredentialsNotLoaded(_)),
            "unexpected error: {err:?}"
        );
    }
}
