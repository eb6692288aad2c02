use super::dsl;
use super::{ParameterError, ParameterName};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static USER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.+<.+>$").expect("Failed to compile userId pattern - this should never happen")
});

/// Whether a secret is generated here or supplied from elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    Dynamic,
    Reference,
}

impl FromStr for SecretKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DYNAMIC" => Ok(Self::Dynamic),
            "REFERENCE" => Ok(Self::Reference),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dynamic => "DYNAMIC",
            Self::Reference => "REFERENCE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretType {
    Random,
    Password,
    Rsa,
    Gpg,
}

impl SecretType {
    /// Whether one generation yields several sibling values.
    #[must_use]
    pub fn is_paired(self) -> bool {
        matches!(self, Self::Rsa | Self::Gpg)
    }
}

impl FromStr for SecretType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RANDOM" => Ok(Self::Random),
            "PASSWORD" => Ok(Self::Password),
            "RSA" => Ok(Self::Rsa),
            "GPG" => Ok(Self::Gpg),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Random => "RANDOM",
            Self::Password => "PASSWORD",
            Self::Rsa => "RSA",
            Self::Gpg => "GPG",
        })
    }
}

/// `secret.<domain>/<name>` annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretParameter {
    name: ParameterName,
    kind: SecretKind,
    secret_type: SecretType,
    size: Option<u32>,
    storage_key: Option<String>,
    local_value: Option<String>,
    user_id: Option<String>,
}

impl SecretParameter {
    pub(crate) fn parse(name: ParameterName, value: &str) -> Result<Self, ParameterError> {
        let pairs = dsl::parse(name.annotation(), value)?;

        // kind and type first: size validation depends on type
        let kind: SecretKind = pairs.parse_required("kind")?;
        let secret_type: SecretType = pairs.parse_required("type")?;

        let size = match pairs.get("size") {
            Some(raw) => {
                let size: i64 = raw.parse().map_err(|_parse_error| pairs.invalid("size", raw))?;
                Some(validate_size(pairs.annotation(), secret_type, size)?)
            }
            None if kind == SecretKind::Dynamic => {
                return Err(ParameterError::MissingKey {
                    annotation: pairs.annotation().to_string(),
                    key: "size",
                });
            }
            None => None,
        };

        let user_id = pairs.get_owned("userId");
        if secret_type == SecretType::Gpg {
            match &user_id {
                Some(id) if USER_ID.is_match(id) => {}
                None if kind == SecretKind::Reference => {}
                _ => {
                    return Err(ParameterError::InvalidUserId {
                        annotation: pairs.annotation().to_string(),
                    })
                }
            }
        }

        Ok(Self {
            kind,
            secret_type,
            size,
            storage_key: pairs.get_owned("storageKey"),
            local_value: pairs.get_owned("localModeValue"),
            user_id,
            name,
        })
    }

    #[must_use]
    pub fn name(&self) -> &ParameterName {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> SecretKind {
        self.kind
    }

    #[must_use]
    pub fn secret_type(&self) -> SecretType {
        self.secret_type
    }

    /// Size in bits. Always present for dynamic secrets.
    #[must_use]
    pub fn size(&self) -> Option<u32> {
        self.size
    }

    #[must_use]
    pub fn storage_key(&self) -> Option<&str> {
        self.storage_key.as_deref()
    }

    /// Pre-encoded value used in local mode.
    #[must_use]
    pub fn local_value(&self) -> Option<&str> {
        self.local_value.as_deref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn storage_suffix(&self) -> String {
        self.storage_key
            .clone()
            .unwrap_or_else(|| self.name.with_field())
    }

    #[must_use]
    pub fn with_field(&self, field: &str) -> Self {
        Self {
            name: self.name.sibling(field),
            ..self.clone()
        }
    }
}

fn validate_size(annotation: &str, secret_type: SecretType, size: i64) -> Result<u32, ParameterError> {
    let valid = match secret_type {
        SecretType::Rsa => size == 2048 || size == 4096,
        SecretType::Random | SecretType::Password | SecretType::Gpg => (1..=8192).contains(&size),
    };
    if !valid {
        return Err(ParameterError::InvalidSize {
            annotation: annotation.to_string(),
            secret_type,
            size,
        });
    }
    u32::try_from(size).map_err(|_overflow| ParameterError::InvalidSize {
        annotation: annotation.to_string(),
        secret_type,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(key: &str, value: &str) -> Result<SecretParameter, ParameterError> {
        SecretParameter::parse(ParameterName::from_annotation(key), value)
    }

    #[test]
    fn test_dynamic_rsa_secret() {
        let secret = parse("secret.bsycorp.com/service-key.v1_public", "kind=DYNAMIC,type=RSA,size=2048").unwrap();
        assert_eq!(secret.kind(), SecretKind::Dynamic);
        assert_eq!(secret.secret_type(), SecretType::Rsa);
        assert_eq!(secret.size(), Some(2048));
        assert_eq!(secret.name().bare(), "service-key.v1");
        assert_eq!(secret.storage_suffix(), "service-key.v1_public");
    }

    #[test]
    fn test_rsa_size_must_be_2048_or_4096() {
        let err = parse("secret.x/key", "kind=DYNAMIC,type=RSA,size=1024").unwrap_err();
        assert!(
            matches!(err, ParameterError::InvalidSize { size: 1024, .. }),
            "unexpected error {err:?}"
        );
        assert!(parse("secret.x/key", "kind=DYNAMIC,type=RSA,size=4096").is_ok());
    }

    #[test]
    fn test_other_sizes_are_bounded() {
        assert!(parse("secret.x/a", "kind=DYNAMIC,type=RANDOM,size=0").is_err());
        assert!(parse("secret.x/a", "kind=DYNAMIC,type=RANDOM,size=8193").is_err());
        assert!(parse("secret.x/a", "kind=DYNAMIC,type=PASSWORD,size=8192").is_ok());
        assert!(parse("secret.x/a", "kind=DYNAMIC,type=PASSWORD,size=-8").is_err());
    }

    #[test]
    fn test_dynamic_requires_size() {
        let err = parse("secret.x/a", "kind=DYNAMIC,type=RANDOM").unwrap_err();
        assert_eq!(
            err,
            ParameterError::MissingKey {
                annotation: "secret.x/a".to_string(),
                key: "size"
            }
        );
    }

    #[test]
    fn test_reference_secret_without_size() {
        let secret = parse("secret.x/app.db", "kind=REFERENCE,type=PASSWORD,localModeValue=cGFzc3dvcmQ=").unwrap();
        assert_eq!(secret.kind(), SecretKind::Reference);
        assert_eq!(secret.size(), None);
        assert_eq!(secret.local_value(), Some("cGFzc3dvcmQ="));
    }

    #[test]
    fn test_kind_is_validated_before_size() {
        let err = parse("secret.x/a", "kind=WHATEVER,type=RSA,size=1").unwrap_err();
        assert!(
            matches!(err, ParameterError::InvalidValue { key: "kind", .. }),
            "kind must be reported before size, got {err:?}"
        );
    }

    #[test]
    fn test_gpg_user_id_shape() {
        assert!(parse("secret.x/signing_public", "kind=DYNAMIC,type=GPG,size=2048,userId=ops<ops@example.com>").is_ok());
        let err = parse("secret.x/signing_public", "kind=DYNAMIC,type=GPG,size=2048,userId=ops").unwrap_err();
        assert_eq!(err.annotation(), "secret.x/signing_public");
        assert!(parse("secret.x/signing_public", "kind=DYNAMIC,type=GPG,size=2048").is_err());
    }
}
