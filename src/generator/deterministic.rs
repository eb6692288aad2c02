use super::{gpg_with, single_with, GeneratorError, PairedSecret, SecretGenerator};
use crate::model::{extract_bare_parameter_name, SecretType};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::sync::{Arc, LazyLock};
use tracing::debug;
use zeroize::Zeroizing;

/// Precomputed 2048-bit keypairs as `[SPKI DER, PKCS#8 DER]`, base64 encoded.
const KEY_POOL: &str = include_str!("../../resources/deterministic_rsa_keys.json");

/// Bundled pool, decoded once per process.
static BUNDLED_POOL: LazyLock<Result<Arc<[PoolKey]>, String>> =
    LazyLock::new(|| decode_pool(KEY_POOL).map_err(|e| e.to_string()));

/// Fixed GPG creation time: 2010-01-01T00:00:00Z.
pub const DETERMINISTIC_GPG_CREATED: u32 = 1_262_304_000;

/// One decoded pool entry, kept alongside its DER encodings.
struct PoolKey {
    public: Vec<u8>,
    private: Zeroizing<Vec<u8>>,
    key: RsaPrivateKey,
}

/// Reproducible strategy for local mode and tests.
///
/// The seed comes from the bare parameter name, so `x_public`, `x_private` and
/// `x_password` all share one seed. RSA and GPG pick a keypair from the pool
/// by `seed % pool_size`; unrelated names may share a keypair and the key
/// size is ignored.
#[derive(Clone)]
pub struct DeterministicGenerator {
    pool: Arc<[PoolKey]>,
}

impl std::fmt::Debug for DeterministicGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicGenerator")
            .field("pool_size", &self.pool.len())
            .finish()
    }
}

impl DeterministicGenerator {
    /// Load the bundled key pool.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::Pool`] when the bundled pool cannot be decoded.
    pub fn new() -> Result<Self, GeneratorError> {
        match &*BUNDLED_POOL {
            Ok(pool) => Ok(Self {
                pool: Arc::clone(pool),
            }),
            Err(e) => Err(GeneratorError::Pool(e.clone())),
        }
    }

    /// Build from a JSON array of `[public, private]` base64 pairs.
    ///
    /// Every entry is decoded up front: SPKI public key, PKCS#8 private key,
    /// and the two halves must belong to one keypair.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::Pool`] when the JSON, base64 or DER is invalid,
    /// when a public key does not match its private key, or the pool is empty.
    pub fn from_pool_json(json: &str) -> Result<Self, GeneratorError> {
        decode_pool(json).map(|pool| Self { pool })
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    fn rng_for(identity: &str) -> StdRng {
        StdRng::seed_from_u64(seed_for(identity))
    }

    fn pool_entry(&self, identity: &str) -> &PoolKey {
        let len = u64::try_from(self.pool.len()).unwrap_or(u64::MAX);
        let index = usize::try_from(seed_for(identity) % len).unwrap_or(0);
        &self.pool[index]
    }
}

fn decode_pool(json: &str) -> Result<Arc<[PoolKey]>, GeneratorError> {
    let encoded: Vec<[String; 2]> =
        serde_json::from_str(json).map_err(|e| GeneratorError::Pool(e.to_string()))?;
    if encoded.is_empty() {
        return Err(GeneratorError::Pool("pool is empty".to_string()));
    }
    encoded
        .iter()
        .enumerate()
        .map(|(index, [public, private])| {
            decode_entry(public, private)
                .map_err(|e| GeneratorError::Pool(format!("entry {index}: {e}")))
        })
        .collect()
}

fn decode_entry(public: &str, private: &str) -> Result<PoolKey, String> {
    let public = STANDARD.decode(public).map_err(|e| e.to_string())?;
    let private = Zeroizing::new(STANDARD.decode(private).map_err(|e| e.to_string())?);
    let public_key = RsaPublicKey::from_public_key_der(&public).map_err(|e| e.to_string())?;
    let key = RsaPrivateKey::from_pkcs8_der(&private).map_err(|e| e.to_string())?;
    if key.to_public_key() != public_key {
        return Err("public key does not match private key".to_string());
    }
    Ok(PoolKey {
        public,
        private,
        key,
    })
}

/// Seed from the first eight bytes of SHA-256 over the bare name.
#[must_use]
pub fn seed_for(identity: &str) -> u64 {
    let digest = Sha256::digest(extract_bare_parameter_name(identity).as_bytes());
    let mut seed = [0_u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(seed)
}

impl SecretGenerator for DeterministicGenerator {
    fn generate_raw(
        &self,
        secret_type: SecretType,
        identity: &str,
        size: u32,
    ) -> Result<Zeroizing<Vec<u8>>, GeneratorError> {
        debug!(identity, %secret_type, size, "generating deterministic value");
        single_with(&mut Self::rng_for(identity), secret_type, size)
    }

    fn generate_paired_raw(
        &self,
        secret_type: SecretType,
        identity: &str,
        size: u32,
        user_id: Option<&str>,
    ) -> Result<PairedSecret, GeneratorError> {
        debug!(identity, %secret_type, size, "using pooled keypair");
        let entry = self.pool_entry(identity);
        match secret_type {
            SecretType::Rsa => Ok(PairedSecret {
                public: entry.public.clone(),
                private: entry.private.to_vec(),
                user_id: None,
                password: None,
            }),
            SecretType::Gpg => gpg_with(
                &mut Self::rng_for(identity),
                &entry.key,
                user_id,
                DETERMINISTIC_GPG_CREATED,
            ),
            SecretType::Random | SecretType::Password => {
                Err(GeneratorError::NotPaired { secret_type })
            }
        }
    }
}
