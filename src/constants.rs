//! # Constants
//!
//! Shared defaults used by the controller and the init tool.
//!
//! Most can be overridden through environment variables, see
//! [`crate::config::Settings`].

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default annotation domain, as in `secret.<domain>/<name>`
pub const DEFAULT_ANNOTATION_DOMAIN: &str = "bsycorp.com";

/// Default AWS region for the backing store
pub const DEFAULT_AWS_REGION: &str = "ap-southeast-2";

/// Default session name when assuming a role with a web identity token
pub const DEFAULT_ROLE_SESSION_NAME: &str = "secret-lease-controller";

/// How long a successfully handled parameter is remembered (seconds)
/// Zero disables the dedup cache
pub const DEFAULT_DEDUP_CACHE_TTL_SECS: u64 = 60;

/// Maximum pod events processed at the same time
pub const DEFAULT_MAX_CONCURRENT_EVENTS: usize = 8;

/// Field holding the RSA/GPG public half
pub const FIELD_PUBLIC: &str = "public";

/// Field holding the RSA/GPG private half
pub const FIELD_PRIVATE: &str = "private";

/// Field holding the GPG key password
pub const FIELD_PASSWORD: &str = "password";

/// Fields written for an `api-key*` RANDOM secret, both with the same value
pub const FIELD_CONSUMER: &str = "consumer";
pub const FIELD_PROVIDER: &str = "provider";

/// Name prefix that triggers the consumer/provider pair
pub const API_KEY_PREFIX: &str = "api-key";

/// Default annotation file written by the downward API
pub const DEFAULT_ANNOTATIONS_FILE: &str = "/podinfo/annotations";

/// Default init output for secrets, one `name=base64` line each
pub const DEFAULT_SECRETS_FILE: &str = "/bsycorp-init/secrets.properties";

/// Default init output for resources
pub const DEFAULT_RESOURCES_FILE: &str = "/bsycorp-init/resources.properties";

/// Directory receiving one decoded file per resource
pub const DEFAULT_RESOURCES_FILE_PATH: &str = "/bsycorp-init/";

/// Default init output for leases
pub const DEFAULT_LEASES_FILE: &str = "/bsycorp-init/leases.properties";

/// Directory receiving one decoded file per lease
pub const DEFAULT_LEASES_FILE_PATH: &str = "/bsycorp-init/";
