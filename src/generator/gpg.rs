//! # OpenPGP keyring encoding
//!
//! Wraps an RSA keypair into OpenPGP v4 transferable keys (RFC 4880):
//!
//! - public key, user id, positive certification (SHA-256, key flags
//!   certify/sign/encrypt, no expiry), ASCII armored
//! - secret key protected with AES-256 under an iterated and salted SHA-256
//!   S2K, same user id and certification, ASCII armored
//!
//! Output only depends on the inputs and the supplied RNG (salt and IV), so a
//! seeded RNG and a fixed creation time give byte-identical keyrings.

use super::GeneratorError;
use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{CryptoRng, RngCore};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub const TAG_SIGNATURE: u8 = 2;
pub const TAG_SECRET_KEY: u8 = 5;
pub const TAG_PUBLIC_KEY: u8 = 6;
pub const TAG_USER_ID: u8 = 13;

const VERSION: u8 = 4;
const ALGO_RSA: u8 = 1;
const HASH_SHA256: u8 = 8;
const SYM_AES256: u8 = 9;
const SIG_POSITIVE_CERTIFICATION: u8 = 0x13;
const S2K_USAGE_SHA1_CHECKED: u8 = 254;
const S2K_ITERATED_SALTED: u8 = 3;
const S2K_COUNT: u8 = 0x60;
const SUBPACKET_CREATION_TIME: u8 = 2;
const SUBPACKET_ISSUER: u8 = 16;
const SUBPACKET_KEY_FLAGS: u8 = 27;
// certify | sign | encrypt communications | encrypt storage
const KEY_FLAGS: u8 = 0x0F;

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// Armored public and secret keyrings.
#[derive(Debug, Clone)]
pub struct ArmoredKeyPair {
    pub public: Vec<u8>,
    pub secret: Vec<u8>,
}

/// Build armored keyrings for `key`, bound to `user_id` and protected by `password`.
///
/// # Errors
///
/// Fails when the key is not a two-prime RSA key or signing fails.
pub fn build_keyring<R: RngCore + CryptoRng>(
    key: &RsaPrivateKey,
    user_id: &str,
    password: &[u8],
    created: u32,
    rng: &mut R,
) -> Result<ArmoredKeyPair, GeneratorError> {
    let public_body = public_key_body(key, created)?;
    let signature = certification(key, &public_body, user_id, created)?;
    let secret_body = secret_key_body(key, &public_body, password, rng)?;

    let user_id_packet = packet(TAG_USER_ID, user_id.as_bytes());
    let signature_packet = packet(TAG_SIGNATURE, &signature);

    let mut public = packet(TAG_PUBLIC_KEY, &public_body);
    public.extend_from_slice(&user_id_packet);
    public.extend_from_slice(&signature_packet);

    let mut secret = packet(TAG_SECRET_KEY, &secret_body);
    secret.extend_from_slice(&user_id_packet);
    secret.extend_from_slice(&signature_packet);

    Ok(ArmoredKeyPair {
        public: armor("PUBLIC KEY BLOCK", &public).into_bytes(),
        secret: armor("PRIVATE KEY BLOCK", &secret).into_bytes(),
    })
}

fn public_key_body(key: &RsaPrivateKey, created: u32) -> Result<Vec<u8>, GeneratorError> {
    let mut body = vec![VERSION];
    body.extend_from_slice(&created.to_be_bytes());
    body.push(ALGO_RSA);
    body.extend(mpi(key.n())?);
    body.extend(mpi(key.e())?);
    Ok(body)
}

/// V4 fingerprint of a public key packet body.
fn fingerprint(public_body: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hash_key(&mut hasher, public_body);
    let mut out = [0_u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn hash_key<D: Digest>(hasher: &mut D, public_body: &[u8]) {
    hasher.update([0x99]);
    hasher.update(len16(public_body.len()));
    hasher.update(public_body);
}

/// Digest covered by the certification signature.
fn certification_digest(public_body: &[u8], user_id: &str, hashed: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hash_key(&mut hasher, public_body);
    hasher.update([0xB4]);
    hasher.update(len32(user_id.len()));
    hasher.update(user_id.as_bytes());
    hasher.update(hashed);
    hasher.update([VERSION, 0xFF]);
    hasher.update(len32(hashed.len()));
    hasher.finalize().to_vec()
}

fn certification(
    key: &RsaPrivateKey,
    public_body: &[u8],
    user_id: &str,
    created: u32,
) -> Result<Vec<u8>, GeneratorError> {
    let mut subpackets = subpacket(SUBPACKET_CREATION_TIME, &created.to_be_bytes());
    subpackets.extend(subpacket(SUBPACKET_KEY_FLAGS, &[KEY_FLAGS]));

    let mut hashed = vec![VERSION, SIG_POSITIVE_CERTIFICATION, ALGO_RSA, HASH_SHA256];
    hashed.extend_from_slice(&len16(subpackets.len()));
    hashed.extend(subpackets);

    let digest = certification_digest(public_body, user_id, &hashed);
    let signature = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)?;

    let fpr = fingerprint(public_body);
    let unhashed = subpacket(SUBPACKET_ISSUER, &fpr[12..]);

    let mut body = hashed;
    body.extend_from_slice(&len16(unhashed.len()));
    body.extend(unhashed);
    body.extend_from_slice(&digest[..2]);
    body.extend(mpi(&BigUint::from_bytes_be(&signature))?);
    Ok(body)
}

fn secret_key_body<R: RngCore + CryptoRng>(
    key: &RsaPrivateKey,
    public_body: &[u8],
    password: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, GeneratorError> {
    let [first, second] = key.primes() else {
        return Err(GeneratorError::Encoding("GPG keys need a two-prime RSA key".to_string()));
    };
    let (p, q) = if first < second { (first, second) } else { (second, first) };
    // u = p^-1 mod q, via Fermat since q is prime
    let u = p.modpow(&(q - &BigUint::from(2_u8)), q);

    let mut plain = Zeroizing::new(Vec::new());
    plain.extend(mpi(key.d())?);
    plain.extend(mpi(p)?);
    plain.extend(mpi(q)?);
    plain.extend(mpi(&u)?);
    let checksum = Sha1::digest(plain.as_slice());
    plain.extend_from_slice(&checksum);

    let mut salt = [0_u8; 8];
    rng.fill_bytes(&mut salt);
    let mut iv = [0_u8; 16];
    rng.fill_bytes(&mut iv);

    let session_key = s2k(password, &salt);
    let mut encrypted = plain.to_vec();
    cfb_encrypt(&session_key, &iv, &mut encrypted);

    let mut body = public_body.to_vec();
    body.extend_from_slice(&[S2K_USAGE_SHA1_CHECKED, SYM_AES256, S2K_ITERATED_SALTED, HASH_SHA256]);
    body.extend_from_slice(&salt);
    body.push(S2K_COUNT);
    body.extend_from_slice(&iv);
    body.extend(encrypted);
    Ok(body)
}

/// Iterated and salted S2K with SHA-256, producing an AES-256 key.
#[must_use]
pub fn s2k(password: &[u8], salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let count = (16_usize + usize::from(S2K_COUNT & 15)) << ((S2K_COUNT >> 4) + 6);
    let mut data = Zeroizing::new(salt.to_vec());
    data.extend_from_slice(password);

    let mut hasher = Sha256::new();
    let mut remaining = count.max(data.len());
    while remaining > 0 {
        let take = remaining.min(data.len());
        hasher.update(&data[..take]);
        remaining -= take;
    }
    let mut out = Zeroizing::new([0_u8; 32]);
    out.copy_from_slice(&hasher.finalize());
    out
}

fn cfb_encrypt(key: &[u8; 32], iv: &[u8; 16], data: &mut [u8]) {
    let cipher = Aes256::new(GenericArray::from_slice(key.as_slice()));
    let mut feedback = *iv;
    for chunk in data.chunks_mut(16) {
        let mut block = GenericArray::clone_from_slice(feedback.as_slice());
        cipher.encrypt_block(&mut block);
        for (byte, mask) in chunk.iter_mut().zip(block.iter()) {
            *byte ^= mask;
        }
        if chunk.len() == 16 {
            feedback.copy_from_slice(chunk);
        }
    }
}

fn mpi(value: &BigUint) -> Result<Vec<u8>, GeneratorError> {
    let bits = u16::try_from(value.bits())
        .map_err(|e| GeneratorError::Encoding(format!("integer too large for MPI: {e}")))?;
    let mut out = bits.to_be_bytes().to_vec();
    out.extend(value.to_bytes_be());
    Ok(out)
}

fn subpacket(kind: u8, data: &[u8]) -> Vec<u8> {
    // every subpacket here is far below the one-octet length limit
    let mut out = vec![len8(data.len() + 1), kind];
    out.extend_from_slice(data);
    out
}

/// New-format packet with the shortest length encoding.
fn packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xC0 | tag];
    let len = body.len();
    if len < 192 {
        out.push(len8(len));
    } else if len < 8384 {
        let rest = len - 192;
        out.push(len8((rest >> 8) + 192));
        out.push(len8(rest & 0xFF));
    } else {
        out.push(0xFF);
        out.extend_from_slice(&len32(len));
    }
    out.extend_from_slice(body);
    out
}

fn len8(len: usize) -> u8 {
    u8::try_from(len).unwrap_or(u8::MAX)
}

fn len16(len: usize) -> [u8; 2] {
    u16::try_from(len).unwrap_or(u16::MAX).to_be_bytes()
}

fn len32(len: usize) -> [u8; 4] {
    u32::try_from(len).unwrap_or(u32::MAX).to_be_bytes()
}

/// OpenPGP CRC-24 over `data`.
#[must_use]
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for byte in data {
        crc ^= u32::from(*byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

fn armor(label: &str, data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = format!("-----BEGIN PGP {label}-----\n\n");
    for line in encoded.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    let crc = crc24(data).to_be_bytes();
    out.push('=');
    out.push_str(&STANDARD.encode(&crc[1..]));
    out.push('\n');
    out.push_str(&format!("-----END PGP {label}-----\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rsa::RsaPublicKey;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut StdRng::seed_from_u64(7), 1024).unwrap()
    }

    /// Inverse of the secret key encryption, for inspecting generated keys.
    fn cfb_decrypt(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
        let cipher = Aes256::new(GenericArray::from_slice(key.as_slice()));
        let mut feedback = *iv;
        let mut out = Vec::with_capacity(data.len());
        for chunk in data.chunks(16) {
            let mut block = GenericArray::clone_from_slice(feedback.as_slice());
            cipher.encrypt_block(&mut block);
            out.extend(chunk.iter().zip(block.iter()).map(|(byte, mask)| byte ^ mask));
            if chunk.len() == 16 {
                feedback.copy_from_slice(chunk);
            }
        }
        out
    }

    /// Decode an armored block, checking its CRC-24.
    fn dearmor(text: &str) -> Option<Vec<u8>> {
        let mut body = String::new();
        let mut checksum = None;
        let mut in_body = false;
        for line in text.lines() {
            if line.starts_with("-----BEGIN ") {
                in_body = true;
                continue;
            }
            if line.starts_with("-----END ") {
                break;
            }
            if !in_body || line.is_empty() || line.contains(": ") {
                continue;
            }
            if let Some(crc) = line.strip_prefix('=') {
                checksum = Some(crc.to_string());
            } else {
                body.push_str(line);
            }
        }
        let data = STANDARD.decode(body).ok()?;
        let expected = STANDARD.decode(checksum?).ok()?;
        let actual = crc24(&data).to_be_bytes();
        (expected.as_slice() == &actual[1..]).then_some(data)
    }

    /// Split new-format packets into `(tag, body)` pairs.
    fn parse_packets(mut data: &[u8]) -> Option<Vec<(u8, Vec<u8>)>> {
        let mut packets = Vec::new();
        while let Some((&header, rest)) = data.split_first() {
            if header & 0xC0 != 0xC0 {
                return None;
            }
            let tag = header & 0x3F;
            let (&first, rest) = rest.split_first()?;
            let (len, rest) = match first {
                0..=191 => (usize::from(first), rest),
                192..=254 => {
                    let (&second, rest) = rest.split_first()?;
                    (((usize::from(first) - 192) << 8) + usize::from(second) + 192, rest)
                }
                255 => {
                    let bytes: [u8; 4] = rest.get(..4)?.try_into().ok()?;
                    (usize::try_from(u32::from_be_bytes(bytes)).ok()?, &rest[4..])
                }
            };
            let body = rest.get(..len)?;
            packets.push((tag, body.to_vec()));
            data = &rest[len..];
        }
        Some(packets)
    }

    fn read_mpi(data: &[u8]) -> (BigUint, &[u8]) {
        let bits = usize::from(u16::from_be_bytes([data[0], data[1]]));
        let len = bits.div_ceil(8);
        (BigUint::from_bytes_be(&data[2..2 + len]), &data[2 + len..])
    }

    #[test]
    fn test_crc24_reference_value() {
        assert_eq!(crc24(b""), CRC24_INIT);
        assert_eq!(crc24(b"123456789"), 0x0021_CF02);
    }

    #[test]
    fn test_packet_lengths_round_trip() {
        for len in [0, 191, 192, 8383, 8384] {
            let body = vec![0xAB; len];
            let encoded = packet(TAG_USER_ID, &body);
            let parsed = parse_packets(&encoded).unwrap();
            assert_eq!(parsed, vec![(TAG_USER_ID, body)], "length {len}");
        }
    }

    #[test]
    fn test_keyring_structure_and_signature() {
        let key = test_key();
        let keyring =
            build_keyring(&key, "ops<ops@example.com>", b"secret-password", 1_262_304_000, &mut StdRng::seed_from_u64(1))
                .unwrap();

        let public_text = String::from_utf8(keyring.public).unwrap();
        assert!(public_text.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----\n"));
        let packets = parse_packets(&dearmor(&public_text).unwrap()).unwrap();
        let tags: Vec<u8> = packets.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, vec![TAG_PUBLIC_KEY, TAG_USER_ID, TAG_SIGNATURE]);
        assert_eq!(packets[1].1, b"ops<ops@example.com>");

        let public_body = &packets[0].1;
        let signature = &packets[2].1;
        assert_eq!(signature[..4], [VERSION, SIG_POSITIVE_CERTIFICATION, ALGO_RSA, HASH_SHA256]);
        let hashed_len = usize::from(u16::from_be_bytes([signature[4], signature[5]]));
        let hashed = &signature[..6 + hashed_len];
        let mut kinds = Vec::new();
        let mut area = &hashed[6..];
        while let Some((&len, rest)) = area.split_first() {
            kinds.push(rest[0]);
            area = &rest[usize::from(len)..];
        }
        assert_eq!(
            kinds,
            [SUBPACKET_CREATION_TIME, SUBPACKET_KEY_FLAGS],
            "no expiration subpacket, so the key never expires"
        );

        let digest = certification_digest(public_body, "ops<ops@example.com>", hashed);
        let unhashed_len = usize::from(u16::from_be_bytes([signature[6 + hashed_len], signature[7 + hashed_len]]));
        let rest = &signature[8 + hashed_len + unhashed_len..];
        assert_eq!(rest[..2], digest[..2], "left 16 bits of the hash");
        let (sig, _) = read_mpi(&rest[2..]);
        let public_key = RsaPublicKey::from(&key);
        let mut sig_bytes = sig.to_bytes_be();
        while sig_bytes.len() < public_key.size() {
            sig_bytes.insert(0, 0);
        }
        public_key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &sig_bytes)
            .unwrap();
    }

    #[test]
    fn test_secret_key_decrypts_with_password() {
        let key = test_key();
        let keyring =
            build_keyring(&key, "ops<ops@example.com>", b"secret-password", 1_262_304_000, &mut StdRng::seed_from_u64(1))
                .unwrap();
        let secret_text = String::from_utf8(keyring.secret).unwrap();
        let packets = parse_packets(&dearmor(&secret_text).unwrap()).unwrap();
        assert_eq!(packets[0].0, TAG_SECRET_KEY);

        let public_len = public_key_body(&key, 1_262_304_000).unwrap().len();
        let body = &packets[0].1[public_len..];
        assert_eq!(body[..4], [S2K_USAGE_SHA1_CHECKED, SYM_AES256, S2K_ITERATED_SALTED, HASH_SHA256]);
        let salt = &body[4..12];
        assert_eq!(body[12], S2K_COUNT);
        let iv: [u8; 16] = body[13..29].try_into().unwrap();
        let plain = cfb_decrypt(&s2k(b"secret-password", salt), &iv, &body[29..]);

        let (mpis, checksum) = plain.split_at(plain.len() - 20);
        assert_eq!(Sha1::digest(mpis).as_slice(), checksum, "SHA-1 checksum must match");
        let (d, _) = read_mpi(mpis);
        assert_eq!(&d, key.d());
    }

    #[test]
    fn test_same_inputs_give_identical_output() {
        let key = test_key();
        let build = || {
            build_keyring(&key, "a<a@b.c>", b"pw", 1_262_304_000, &mut StdRng::seed_from_u64(9)).unwrap()
        };
        let (first, second) = (build(), build());
        assert_eq!(first.public, second.public);
        assert_eq!(first.secret, second.secret);
    }

    #[test]
    fn test_dearmor_rejects_bad_checksum() {
        let text = armor("PUBLIC KEY BLOCK", b"hello");
        assert_eq!(dearmor(&text), Some(b"hello".to_vec()));
        let tampered = text.replace("aGVsbG8", "aGVsbG9");
        assert_eq!(dearmor(&tampered), None);
    }
}
