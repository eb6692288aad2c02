use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration shared by the controller and the init tool.
///
/// All settings have defaults from [`crate::constants`] and can be overridden
/// through environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Environment label, names the DynamoDB table
    /// Required whenever the shared store is used
    pub env_label: Option<String>,
    /// Domain matched in annotation keys
    pub annotation_domain: String,
    pub aws_region: String,
    /// Endpoint override for DynamoDB (local testing)
    pub aws_endpoint: Option<String>,
    /// Endpoint override for STS, e.g. a regional endpoint inside a VPC
    pub aws_sts_endpoint: Option<String>,
    pub web_identity_token_file: Option<PathBuf>,
    pub role_arn: Option<String>,
    pub role_session_name: String,
    pub metrics_port: u16,
    /// Dedup cache TTL (seconds), zero disables the cache
    pub dedup_cache_ttl_secs: u64,
    pub max_concurrent_events: usize,
    /// Use a process-local store instead of DynamoDB
    pub local_store: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        let env = Env(lookup);
        Self {
            env_label: env.optional("ENV_LABEL"),
            annotation_domain: env.string("ANNOTATION_DOMAIN", DEFAULT_ANNOTATION_DOMAIN),
            aws_region: env.string("AWS_REGION", DEFAULT_AWS_REGION),
            aws_endpoint: env.optional("AWS_ENDPOINT"),
            aws_sts_endpoint: env.optional("AWS_STS_ENDPOINT"),
            web_identity_token_file: env.optional("AWS_WEB_IDENTITY_TOKEN_FILE").map(PathBuf::from),
            role_arn: env.optional("AWS_ROLE_ARN"),
            role_session_name: env.string("AWS_ROLE_SESSION_NAME", DEFAULT_ROLE_SESSION_NAME),
            metrics_port: env.parsed("METRICS_PORT", DEFAULT_METRICS_PORT),
            dedup_cache_ttl_secs: env.parsed("DEDUP_CACHE_TTL_SECS", DEFAULT_DEDUP_CACHE_TTL_SECS),
            max_concurrent_events: env
                .parsed("MAX_CONCURRENT_EVENTS", DEFAULT_MAX_CONCURRENT_EVENTS)
                .max(1),
            local_store: env.bool("LOCAL_STORE", false),
        }
    }

    /// Get dedup cache TTL duration
    #[must_use]
    pub fn dedup_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_cache_ttl_secs)
    }

    /// Environment label, or an error naming the variable.
    ///
    /// # Errors
    ///
    /// Fails when `ENV_LABEL` is unset.
    pub fn require_env_label(&self) -> anyhow::Result<&str> {
        self.env_label
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("ENV_LABEL must be set to use the shared store"))
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Read variable, treating empty values as unset
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Read variable or return default value
    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.optional(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Read variable as boolean or return default
    fn bool(&self, key: &str, default: bool) -> bool {
        self.optional(key)
            .map(|v| {
                let v_lower = v.trim().to_lowercase();
                v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
            })
            .unwrap_or(default)
    }

    /// Read variable as string or return default
    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.env_label, None);
        assert_eq!(settings.annotation_domain, "bsycorp.com");
        assert_eq!(settings.aws_region, "ap-southeast-2");
        assert_eq!(settings.metrics_port, 8080);
        assert_eq!(settings.dedup_cache_ttl(), Duration::from_secs(60));
        assert!(!settings.local_store);
        assert_eq!(settings.role_arn, None);
        assert!(settings.require_env_label().is_err());
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("ENV_LABEL", "dev"),
            ("DEDUP_CACHE_TTL_SECS", "0"),
            ("LOCAL_STORE", "Yes"),
            ("AWS_ROLE_ARN", "arn:aws:iam::123456789012:role/controller"),
            ("AWS_WEB_IDENTITY_TOKEN_FILE", "/var/run/secrets/token"),
        ]);
        assert_eq!(settings.require_env_label().unwrap(), "dev");
        assert_eq!(settings.dedup_cache_ttl(), Duration::ZERO);
        assert!(settings.local_store);
        assert_eq!(
            settings.web_identity_token_file,
            Some(PathBuf::from("/var/run/secrets/token"))
        );
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let settings = settings(&[("METRICS_PORT", "http"), ("MAX_CONCURRENT_EVENTS", "0")]);
        assert_eq!(settings.metrics_port, 8080);
        assert_eq!(settings.max_concurrent_events, 1, "concurrency is at least one");
    }

    #[test]
    fn test_blank_label_is_unset() {
        assert_eq!(settings(&[("ENV_LABEL", "  ")]).env_label, None);
    }
}
