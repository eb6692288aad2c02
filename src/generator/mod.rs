//! # Secret Material Generator
//!
//! Two interchangeable strategies behind [`SecretGenerator`]:
//!
//! - [`RandomGenerator`] draws every value from the OS randomness source. Used in production.
//! - [`DeterministicGenerator`] seeds from a hash of the bare parameter name so
//!   repeated calls reproduce the same value. RSA and GPG material comes from a
//!   precomputed key pool. Local and test use only.
//!
//! Type semantics:
//!
//! - `RANDOM` - `size / 8` raw bytes
//! - `PASSWORD` - `size / 8` characters from the base-62 alphabet
//! - `RSA` - DER encoded keypair (SPKI public, PKCS#8 private) of `size` bits
//! - `GPG` - armored OpenPGP public and secret keyrings bound to a user id,
//!   protected by a generated 128-bit password

mod deterministic;
mod gpg;
mod random;

pub use deterministic::{seed_for, DeterministicGenerator, DETERMINISTIC_GPG_CREATED};
pub use random::RandomGenerator;

use crate::model::SecretType;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::distributions::Alphanumeric;
use rand::{CryptoRng, Rng, RngCore};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Password size used to protect generated GPG keys.
pub const GPG_PASSWORD_BITS: u32 = 128;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("{secret_type} cannot be generated as a single value")]
    NotSingle { secret_type: SecretType },

    #[error("{secret_type} cannot be generated as a paired value")]
    NotPaired { secret_type: SecretType },

    #[error("GPG keys need a userId")]
    MissingUserId,

    #[error("RSA key generation failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("key encoding failed: {0}")]
    Encoding(String),

    #[error("deterministic key pool is unusable: {0}")]
    Pool(String),
}

/// Output of a paired generation.
///
/// RSA fills `public` and `private`. GPG also fills `user_id` and `password`.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct PairedSecret {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
    pub user_id: Option<Vec<u8>>,
    pub password: Option<Vec<u8>>,
}

impl PairedSecret {
    /// Stored sibling fields: `public`, `private`, and `password` when present.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, &[u8])> {
        let mut fields = vec![("public", self.public.as_slice()), ("private", self.private.as_slice())];
        if let Some(password) = &self.password {
            fields.push(("password", password.as_slice()));
        }
        fields
    }

    /// Value for a sibling field name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields()
            .into_iter()
            .find_map(|(field, value)| (field == name).then_some(value))
    }
}

/// Produces secret material for a parameter identity.
///
/// `identity` is the parameter name, with or without a field suffix.
/// Implementations that derive randomness from it must only use the bare name.
pub trait SecretGenerator: Send + Sync + std::fmt::Debug {
    /// Generate a single `RANDOM` or `PASSWORD` value.
    ///
    /// # Errors
    ///
    /// Fails for paired types.
    fn generate_raw(
        &self,
        secret_type: SecretType,
        identity: &str,
        size: u32,
    ) -> Result<Zeroizing<Vec<u8>>, GeneratorError>;

    /// Generate an `RSA` or `GPG` keypair.
    ///
    /// # Errors
    ///
    /// Fails for single-value types, for GPG without a user id, and when key
    /// generation or encoding fails.
    fn generate_paired_raw(
        &self,
        secret_type: SecretType,
        identity: &str,
        size: u32,
        user_id: Option<&str>,
    ) -> Result<PairedSecret, GeneratorError>;

    /// Base64 wrapper around [`SecretGenerator::generate_raw`].
    ///
    /// # Errors
    ///
    /// See [`SecretGenerator::generate_raw`].
    fn generate_base64(
        &self,
        secret_type: SecretType,
        identity: &str,
        size: u32,
    ) -> Result<String, GeneratorError> {
        self.generate_raw(secret_type, identity, size)
            .map(|raw| STANDARD.encode(raw.as_slice()))
    }
}

fn byte_len(size: u32) -> usize {
    usize::try_from(size / 8).unwrap_or(usize::MAX)
}

/// Single-value generation shared by both strategies.
fn single_with<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret_type: SecretType,
    size: u32,
) -> Result<Zeroizing<Vec<u8>>, GeneratorError> {
    match secret_type {
        SecretType::Random => {
            let mut bytes = vec![0_u8; byte_len(size)];
            rng.fill_bytes(&mut bytes);
            Ok(Zeroizing::new(bytes))
        }
        SecretType::Password => Ok(password_with(rng, size)),
        SecretType::Rsa | SecretType::Gpg => Err(GeneratorError::NotSingle { secret_type }),
    }
}

fn password_with<R: RngCore + CryptoRng>(rng: &mut R, size: u32) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(
        std::iter::repeat_with(|| rng.sample(Alphanumeric))
            .take(byte_len(size))
            .collect(),
    )
}

/// Encode a keypair as (SPKI DER, PKCS#8 DER).
fn rsa_der(key: &RsaPrivateKey) -> Result<PairedSecret, GeneratorError> {
    let public = key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| GeneratorError::Encoding(e.to_string()))?;
    let private = key
        .to_pkcs8_der()
        .map_err(|e| GeneratorError::Encoding(e.to_string()))?;
    Ok(PairedSecret {
        public: public.as_bytes().to_vec(),
        private: private.as_bytes().to_vec(),
        user_id: None,
        password: None,
    })
}

/// Wrap an RSA key into GPG keyrings protected by a fresh password.
fn gpg_with<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &RsaPrivateKey,
    user_id: Option<&str>,
    created: u32,
) -> Result<PairedSecret, GeneratorError> {
    let user_id = user_id.ok_or(GeneratorError::MissingUserId)?;
    let password = password_with(rng, GPG_PASSWORD_BITS);
    let keyring = gpg::build_keyring(key, user_id, &password, created, rng)?;
    Ok(PairedSecret {
        public: keyring.public,
        private: keyring.secret,
        user_id: Some(user_id.as_bytes().to_vec()),
        password: Some(password.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_is_size_over_eight_bytes() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(single_with(&mut rng, SecretType::Random, 288).unwrap().len(), 36);
        assert_eq!(single_with(&mut rng, SecretType::Random, 7).unwrap().len(), 0);
    }

    #[test]
    fn test_password_uses_base62_alphabet() {
        let mut rng = StdRng::seed_from_u64(2);
        let password = single_with(&mut rng, SecretType::Password, 256).unwrap();
        assert_eq!(password.len(), 32);
        assert!(password.iter().all(u8::is_ascii_alphanumeric), "password {password:?}");
    }

    #[test]
    fn test_paired_types_are_not_single() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            single_with(&mut rng, SecretType::Rsa, 2048),
            Err(GeneratorError::NotSingle { .. })
        ));
    }

    #[test]
    fn test_paired_secret_fields() {
        let paired = PairedSecret {
            public: b"pub".to_vec(),
            private: b"priv".to_vec(),
            user_id: Some(b"ops<ops@example.com>".to_vec()),
            password: Some(b"pw".to_vec()),
        };
        assert_eq!(paired.field("password"), Some(b"pw".as_slice()));
        assert_eq!(paired.fields().len(), 3);
        assert_eq!(paired.field("consumer"), None);
    }
}
