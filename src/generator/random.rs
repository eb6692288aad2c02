use super::{gpg_with, rsa_der, single_with, GeneratorError, PairedSecret, SecretGenerator};
use crate::model::SecretType;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use tracing::debug;
use zeroize::Zeroizing;

/// Production strategy: every call draws fresh OS randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl SecretGenerator for RandomGenerator {
    fn generate_raw(
        &self,
        secret_type: SecretType,
        identity: &str,
        size: u32,
    ) -> Result<Zeroizing<Vec<u8>>, GeneratorError> {
        debug!(identity, %secret_type, size, "generating random value");
        single_with(&mut OsRng, secret_type, size)
    }

    fn generate_paired_raw(
        &self,
        secret_type: SecretType,
        identity: &str,
        size: u32,
        user_id: Option<&str>,
    ) -> Result<PairedSecret, GeneratorError> {
        debug!(identity, %secret_type, size, "generating random keypair");
        let bits = usize::try_from(size).map_err(|e| GeneratorError::Encoding(e.to_string()))?;
        match secret_type {
            SecretType::Rsa => rsa_der(&RsaPrivateKey::new(&mut OsRng, bits)?),
            SecretType::Gpg => {
                let key = RsaPrivateKey::new(&mut OsRng, bits)?;
                let created = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX);
                gpg_with(&mut OsRng, &key, user_id, created)
            }
            SecretType::Random | SecretType::Password => {
                Err(GeneratorError::NotPaired { secret_type })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
    use rsa::{Pkcs1v15Encrypt, RsaPublicKey};

    #[test]
    fn test_random_values_differ_for_same_identity() {
        let generator = RandomGenerator;
        for secret_type in [SecretType::Random, SecretType::Password] {
            let first = generator.generate_raw(secret_type, "common.key", 256).unwrap();
            let second = generator.generate_raw(secret_type, "common.key", 256).unwrap();
            assert_ne!(first, second, "{secret_type} must not repeat");
        }
    }

    #[test]
    fn test_random_rsa_halves_match() {
        let generator = RandomGenerator;
        let paired = generator
            .generate_paired_raw(SecretType::Rsa, "service-key.v1_public", 2048, None)
            .unwrap();
        let public = RsaPublicKey::from_public_key_der(&paired.public).unwrap();
        let private = RsaPrivateKey::from_pkcs8_der(&paired.private).unwrap();
        let ciphertext = public.encrypt(&mut OsRng, Pkcs1v15Encrypt, b"lease").unwrap();
        assert_eq!(private.decrypt(Pkcs1v15Encrypt, &ciphertext).unwrap(), b"lease");
    }

    #[test]
    fn test_single_types_are_not_paired() {
        let result = RandomGenerator.generate_paired_raw(SecretType::Random, "x", 128, None);
        assert!(matches!(result, Err(GeneratorError::NotPaired { .. })));
    }
}
