//! # Parameter Model
//!
//! Turns one pod annotation (key plus value) into a typed request.
//!
//! Recognized key prefixes for an annotation domain `D`:
//!
//! - `secret.D/<name>` - generated or referenced secret material
//! - `resource.D/<name>` - an externally supplied value, never generated
//! - `lease.D/<name>` - a claim on one integer slot within a range
//! - `custom.D/<name>` - a fixed value
//!
//! Any other key yields `None`. Pods carry plenty of unrelated annotations.
//!
//! Every variant exposes the same storage capabilities (`storage_suffix`,
//! `storage_full_path`) and every consumer matches exhaustively on [`Parameter`].

mod custom;
pub(crate) mod dsl;
mod lease;
mod resource;
mod secret;

pub use custom::CustomParameter;
pub use dsl::strip_quotes;
pub use lease::{LeaseKind, LeaseParameter, ResolvedLeaseParameter};
pub use resource::ResourceParameter;
pub use secret::{SecretKind, SecretParameter, SecretType};

use thiserror::Error;

/// Malformed annotation input. Always names the offending annotation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("annotation '{annotation}' is malformed: {reason}")]
    Malformed { annotation: String, reason: String },

    #[error("annotation '{annotation}' is missing required key '{key}'")]
    MissingKey {
        annotation: String,
        key: &'static str,
    },

    #[error("annotation '{annotation}' has invalid value '{value}' for '{key}'")]
    InvalidValue {
        annotation: String,
        key: &'static str,
        value: String,
    },

    #[error("annotation '{annotation}' has invalid size {size} for type {secret_type}")]
    InvalidSize {
        annotation: String,
        secret_type: SecretType,
        size: i64,
    },

    #[error("annotation '{annotation}' needs userId of the form \"name<email>\"")]
    InvalidUserId { annotation: String },
}

impl ParameterError {
    /// Full annotation key the error belongs to.
    #[must_use]
    pub fn annotation(&self) -> &str {
        match self {
            Self::Malformed { annotation, .. }
            | Self::MissingKey { annotation, .. }
            | Self::InvalidValue { annotation, .. }
            | Self::InvalidSize { annotation, .. }
            | Self::InvalidUserId { annotation } => annotation,
        }
    }
}

/// Bare parameter name with any trailing `_<lowercase>` field suffix removed.
///
/// `service-key.v1_public` becomes `service-key.v1`. Names without such a
/// suffix come back unchanged.
#[must_use]
pub fn extract_bare_parameter_name(name: &str) -> &str {
    split_field(name).map_or(name, |(bare, _)| bare)
}

/// Trailing `_<lowercase>` field suffix, if any.
#[must_use]
pub fn extract_field_name(name: &str) -> Option<&str> {
    split_field(name).map(|(_, field)| field)
}

fn split_field(name: &str) -> Option<(&str, &str)> {
    let (bare, field) = name.rsplit_once('_')?;
    let is_field = !field.is_empty() && field.bytes().all(|b| b.is_ascii_lowercase());
    is_field.then_some((bare, field))
}

/// Strip one trailing `/` from a storage prefix.
#[must_use]
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.strip_suffix('/').unwrap_or(prefix)
}

/// Identity shared by every parameter variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterName {
    annotation: String,
    bare: String,
    field: Option<String>,
}

impl ParameterName {
    /// Derive the identity from a full annotation key such as
    /// `secret.example.com/service-key.v1_public`.
    #[must_use]
    pub fn from_annotation(annotation: &str) -> Self {
        let name = annotation
            .split_once('/')
            .map_or(annotation, |(_, rest)| rest);
        Self {
            annotation: annotation.to_string(),
            bare: extract_bare_parameter_name(name).to_string(),
            field: extract_field_name(name).map(str::to_string),
        }
    }

    #[must_use]
    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    #[must_use]
    pub fn bare(&self) -> &str {
        &self.bare
    }

    #[must_use]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// `bare` or `bare_field`.
    #[must_use]
    pub fn with_field(&self) -> String {
        match &self.field {
            Some(field) => format!("{}_{field}", self.bare),
            None => self.bare.clone(),
        }
    }

    /// Same identity under a different field suffix.
    #[must_use]
    pub fn sibling(&self, field: &str) -> Self {
        Self {
            annotation: self.annotation.clone(),
            bare: self.bare.clone(),
            field: Some(field.to_string()),
        }
    }
}

/// One typed request parsed from an annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    Secret(SecretParameter),
    Resource(ResourceParameter),
    Lease(LeaseParameter),
    ResolvedLease(ResolvedLeaseParameter),
    Custom(CustomParameter),
}

impl Parameter {
    /// Parse one annotation. Returns `Ok(None)` for keys outside the domain.
    ///
    /// # Errors
    ///
    /// Returns a [`ParameterError`] naming the annotation when the value is malformed.
    pub fn construct(domain: &str, key: &str, value: &str) -> Result<Option<Self>, ParameterError> {
        let Some((kind, rest)) = key.split_once('.') else {
            return Ok(None);
        };
        let Some(rest_domain) = rest.strip_prefix(domain) else {
            return Ok(None);
        };
        if !rest_domain.starts_with('/') {
            return Ok(None);
        }

        let name = ParameterName::from_annotation(key);
        let parameter = match kind {
            "secret" => Self::Secret(SecretParameter::parse(name, value)?),
            "resource" => Self::Resource(ResourceParameter::parse(name, value)?),
            "lease" => Self::Lease(LeaseParameter::parse(name, value)?),
            "custom" => Self::Custom(CustomParameter::parse(name, value)?),
            _ => return Ok(None),
        };
        Ok(Some(parameter))
    }

    #[must_use]
    pub fn name(&self) -> &ParameterName {
        match self {
            Self::Secret(p) => p.name(),
            Self::Resource(p) => p.name(),
            Self::Lease(p) => p.name(),
            Self::ResolvedLease(p) => p.lease().name(),
            Self::Custom(p) => p.name(),
        }
    }

    /// Full annotation key, for diagnostics.
    #[must_use]
    pub fn annotation(&self) -> &str {
        self.name().annotation()
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Secret(_) => "secret",
            Self::Resource(_) => "resource",
            Self::Lease(_) => "lease",
            Self::ResolvedLease(_) => "resolved_lease",
            Self::Custom(_) => "custom",
        }
    }

    /// Path relative to the storage prefix.
    #[must_use]
    pub fn storage_suffix(&self) -> String {
        match self {
            Self::Secret(p) => p.storage_suffix(),
            Self::Resource(p) => p.storage_suffix(),
            Self::Lease(p) => p.storage_suffix(),
            Self::ResolvedLease(p) => p.storage_suffix(),
            Self::Custom(p) => p.storage_suffix(),
        }
    }

    #[must_use]
    pub fn storage_full_path(&self, prefix: &str) -> String {
        format!("{}/{}", normalize_prefix(prefix), self.storage_suffix())
    }

    /// Key prefix matched by prefix scans.
    ///
    /// Lease slots live at `<path>.<index>`, so the scan prefix carries the
    /// dot and `snowflake` never matches slots of `snowflake2`.
    #[must_use]
    pub fn storage_scan_prefix(&self, prefix: &str) -> String {
        match self {
            Self::Lease(_) => format!("{}.", self.storage_full_path(prefix)),
            Self::ResolvedLease(p) => format!("{}.", p.lease().storage_full_path(prefix)),
            Self::Secret(_) | Self::Resource(_) | Self::Custom(_) => self.storage_full_path(prefix),
        }
    }

    /// Same parameter under a sibling field name, e.g. `_public` and `_private`.
    #[must_use]
    pub fn with_field(&self, field: &str) -> Self {
        match self {
            Self::Secret(p) => Self::Secret(p.with_field(field)),
            Self::Resource(p) => Self::Resource(p.with_field(field)),
            Self::Lease(p) => Self::Lease(p.with_field(field)),
            Self::ResolvedLease(p) => Self::ResolvedLease(p.with_field(field)),
            Self::Custom(p) => Self::Custom(p.with_field(field)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "bsycorp.com";

    #[test]
    fn test_extract_bare_and_field_name() {
        assert_eq!(extract_bare_parameter_name("service-key.v1_public"), "service-key.v1");
        assert_eq!(extract_field_name("service-key.v1_public"), Some("public"));
        assert_eq!(extract_bare_parameter_name("service-key.v1"), "service-key.v1");
        assert_eq!(extract_field_name("service-key.v1"), None);
        assert_eq!(extract_field_name("db_Url"), None, "uppercase is not a field");
        assert_eq!(extract_field_name("db_url2"), None, "digits are not a field");
        assert_eq!(extract_field_name("trailing_"), None, "empty suffix is not a field");
        assert_eq!(extract_bare_parameter_name("a_b_c"), "a_b");
    }

    #[test]
    fn test_unrelated_annotations_are_skipped() {
        let parsed = Parameter::construct(DOMAIN, "kubernetes.io/psp", "restricted").unwrap();
        assert!(parsed.is_none());
        let parsed = Parameter::construct(DOMAIN, "secret.other.com/x", "kind=DYNAMIC").unwrap();
        assert!(parsed.is_none());
        let parsed = Parameter::construct(DOMAIN, "secret.bsycorp.com.evil/x", "kind=DYNAMIC").unwrap();
        assert!(parsed.is_none(), "domain must be followed by a slash");
    }

    #[test]
    fn test_secret_storage_path_uses_field() {
        let parameter = Parameter::construct(
            DOMAIN,
            "secret.bsycorp.com/service-key.v1_public",
            "kind=DYNAMIC,type=RSA,size=2048",
        )
        .unwrap()
        .unwrap();
        assert_eq!(parameter.storage_full_path("local/"), "local/service-key.v1_public");
        let private = parameter.with_field("private");
        assert_eq!(private.storage_full_path("local"), "local/service-key.v1_private");
        assert_eq!(parameter.name().field(), Some("public"), "original is untouched");
    }

    #[test]
    fn test_resource_storage_path_uses_storage_key() {
        let parameter = Parameter::construct(
            DOMAIN,
            "resource.bsycorp.com/app.db.main.url",
            "storageKey=db.url,localModeValue=dmFsdWU=",
        )
        .unwrap()
        .unwrap();
        assert_eq!(parameter.storage_full_path("/bsycorp/testbed/"), "/bsycorp/testbed/db.url");
    }

    #[test]
    fn test_lease_paths() {
        let parameter = Parameter::construct(
            DOMAIN,
            "lease.bsycorp.com/snowflake",
            "kind=INDEX,rangeStart=0,rangeEnd=10",
        )
        .unwrap()
        .unwrap();
        assert_eq!(parameter.storage_full_path("local"), "local/leases/snowflake");
        assert_eq!(parameter.storage_scan_prefix("local"), "local/leases/snowflake.");

        let Parameter::Lease(lease) = &parameter else {
            panic!("expected a lease, got {parameter:?}");
        };
        let resolved = Parameter::ResolvedLease(lease.resolve("7"));
        assert_eq!(resolved.storage_full_path("local/"), "local/leases/snowflake.7");
    }

    #[test]
    fn test_custom_parameter() {
        let parameter = Parameter::construct(
            DOMAIN,
            "custom.bsycorp.com/feature.flag",
            "storageKey=flags/feature,fixedValue=b24=",
        )
        .unwrap()
        .unwrap();
        assert_eq!(parameter.kind_label(), "custom");
        assert_eq!(parameter.storage_full_path("p"), "p/flags/feature");
    }
}
