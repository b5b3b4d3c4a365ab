//! Encrypted secret codec
//!
//! Wraps private keys under a user password before they reach storage, and
//! unwraps them transiently for signing.
//!
//! SECURITY:
//! - Key derivation: Argon2id with a random 16-byte salt per secret
//! - Cipher: AES-256-GCM with a random 96-bit nonce per secret
//! - The blob header (version + KDF cost), salt and nonce are authenticated
//!   as associated data, so any tampering fails decryption
//! - Derived keys and plaintext buffers are zeroized after use
//! - A wrong password or damaged blob always yields `Error::DecryptionFailed`,
//!   never a plausible-looking plaintext
//!
//! Blob layout (after the `enc1:` prefix, base64 standard alphabet):
//!
//! ```text
//! version (1) | m_cost u32 LE | t_cost u32 LE | p_cost u32 LE | salt (16) | nonce (12) | ciphertext + tag (16)
//! ```

use crate::{Error, Result};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

const BLOB_PREFIX: &str = "enc1:";
const VERSION_V1: u8 = 1;
const HEADER_LEN: usize = 1 + 4 * 3;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Upper bounds on KDF cost, enforced on encrypt and on decrypt so a blob
/// header cannot demand unbounded work before authentication
pub const MAX_M_COST_KIB: u32 = 256 * 1024;
pub const MAX_T_COST: u32 = 10;
pub const MAX_P_COST: u32 = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost_kib: u32,
    /// Number of passes
    pub t_cost: u32,
    /// Degree of parallelism
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// Check the costs against argon2's minimums and this codec's ceilings
    pub fn validate(&self) -> Result<()> {
        if self.m_cost_kib > MAX_M_COST_KIB {
            return Err(Error::InvalidInput(format!(
                "KDF memory cost {} KiB exceeds {} KiB",
                self.m_cost_kib, MAX_M_COST_KIB
            )));
        }
        if self.t_cost > MAX_T_COST {
            return Err(Error::InvalidInput(format!(
                "KDF time cost {} exceeds {}",
                self.t_cost, MAX_T_COST
            )));
        }
        if self.p_cost > MAX_P_COST {
            return Err(Error::InvalidInput(format!(
                "KDF parallelism {} exceeds {}",
                self.p_cost, MAX_P_COST
            )));
        }
        self.to_argon2()
            .map(|_| ())
            .map_err(|e| Error::InvalidInput(format!("invalid KDF parameters: {}", e)))
    }

    fn to_argon2(self) -> std::result::Result<Params, argon2::Error> {
        Params::new(self.m_cost_kib, self.t_cost, self.p_cost, Some(KEY_LEN))
    }
}

/// Opaque ciphertext that is safe to persist
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Wrap a stored string. No validation happens until decryption.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncryptedBlob")
            .field(&format_args!("{} bytes", self.0.len()))
            .finish()
    }
}

/// Encrypt `secret` under `password` with the default KDF cost
pub fn encrypt_secret(secret: &SecretString, password: &SecretString) -> Result<EncryptedBlob> {
    encrypt_secret_with(secret, password, &KdfParams::default())
}

/// Encrypt `secret` under `password` with explicit KDF cost
pub fn encrypt_secret_with(
    secret: &SecretString,
    password: &SecretString,
    kdf: &KdfParams,
) -> Result<EncryptedBlob> {
    if secret.expose_secret().is_empty() {
        return Err(Error::InvalidInput("secret must not be empty".to_string()));
    }
    if password.expose_secret().is_empty() {
        return Err(Error::InvalidInput("password must not be empty".to_string()));
    }
    kdf.validate()?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt, kdf)
        .map_err(|e| Error::InvalidInput(format!("invalid KDF parameters: {}", e)))?;

    let mut packed = Vec::with_capacity(
        HEADER_LEN + SALT_LEN + NONCE_LEN + secret.expose_secret().len() + TAG_LEN,
    );
    packed.push(VERSION_V1);
    packed.extend_from_slice(&kdf.m_cost_kib.to_le_bytes());
    packed.extend_from_slice(&kdf.t_cost.to_le_bytes());
    packed.extend_from_slice(&kdf.p_cost.to_le_bytes());
    packed.extend_from_slice(&salt);
    packed.extend_from_slice(&nonce);

    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|_| Error::Wallet("AES key must be 32 bytes".to_string()))?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: secret.expose_secret().as_bytes(),
                aad: &packed,
            },
        )
        .map_err(|e| Error::Wallet(format!("AES-256-GCM encryption failed: {}", e)))?;
    packed.extend_from_slice(&ciphertext);

    Ok(EncryptedBlob(format!("{}{}", BLOB_PREFIX, STANDARD.encode(&packed))))
}

/// Decrypt a blob produced by [`encrypt_secret`].
///
/// Any wrong password, unknown version, truncation or tampering returns
/// `Error::DecryptionFailed`.
pub fn decrypt_secret(blob: &EncryptedBlob, password: &SecretString) -> Result<SecretString> {
    if password.expose_secret().is_empty() {
        return Err(Error::InvalidInput("password must not be empty".to_string()));
    }

    let encoded = blob
        .as_str()
        .strip_prefix(BLOB_PREFIX)
        .ok_or(Error::DecryptionFailed)?;
    let packed = STANDARD
        .decode(encoded.trim())
        .map_err(|_| Error::DecryptionFailed)?;

    if packed.len() < HEADER_LEN + SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(Error::DecryptionFailed);
    }

    let (header, rest) = packed.split_at(HEADER_LEN);
    if header[0] != VERSION_V1 {
        tracing::debug!(version = header[0], "Unsupported blob version");
        return Err(Error::DecryptionFailed);
    }
    let kdf = KdfParams {
        m_cost_kib: read_u32(&header[1..5]),
        t_cost: read_u32(&header[5..9]),
        p_cost: read_u32(&header[9..13]),
    };
    if kdf.validate().is_err() {
        return Err(Error::DecryptionFailed);
    }

    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    let aad = &packed[..HEADER_LEN + SALT_LEN + NONCE_LEN];

    let key = derive_key(password, salt, &kdf).map_err(|_| Error::DecryptionFailed)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| Error::DecryptionFailed)?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| Error::DecryptionFailed)?,
    );

    let text = std::str::from_utf8(&plaintext).map_err(|_| Error::DecryptionFailed)?;
    if text.is_empty() {
        return Err(Error::DecryptionFailed);
    }
    Ok(SecretString::from(text.to_string()))
}

/// [`encrypt_secret_with`] on the blocking pool, off the async workers
pub async fn encrypt_secret_async(
    secret: SecretString,
    password: Arc<SecretString>,
    kdf: KdfParams,
) -> Result<EncryptedBlob> {
    tokio::task::spawn_blocking(move || encrypt_secret_with(&secret, &password, &kdf))
        .await
        .map_err(|e| Error::TaskFailure(format!("key derivation task failed: {}", e)))?
}

/// [`decrypt_secret`] on the blocking pool, off the async workers
pub async fn decrypt_secret_async(
    blob: EncryptedBlob,
    password: Arc<SecretString>,
) -> Result<SecretString> {
    tokio::task::spawn_blocking(move || decrypt_secret(&blob, &password))
        .await
        .map_err(|e| Error::TaskFailure(format!("key derivation task failed: {}", e)))?
}

/// Whether `raw` carries the current blob prefix
pub fn is_encrypted(raw: &str) -> bool {
    raw.starts_with(BLOB_PREFIX)
}

fn derive_key(
    password: &SecretString,
    salt: &[u8],
    kdf: &KdfParams,
) -> std::result::Result<Zeroizing<[u8; KEY_LEN]>, argon2::Error> {
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, kdf.to_argon2()?);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon.hash_password_into(password.expose_secret().as_bytes(), salt, &mut key[..])?;
    Ok(key)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap KDF cost so tests stay fast
    pub(crate) fn test_kdf() -> KdfParams {
        KdfParams {
            m_cost_kib: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    fn s(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn raw_bytes(blob: &EncryptedBlob) -> Vec<u8> {
        STANDARD
            .decode(blob.as_str().strip_prefix(BLOB_PREFIX).unwrap())
            .unwrap()
    }

    fn from_bytes(bytes: &[u8]) -> EncryptedBlob {
        EncryptedBlob::new(format!("{}{}", BLOB_PREFIX, STANDARD.encode(bytes)))
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            ("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80", "hunter2"),
            ("a", "p"),
            ("seed phrase with spaces", "pässwörd-日本"),
        ];
        for (secret, password) in cases {
            let blob = encrypt_secret_with(&s(secret), &s(password), &test_kdf()).unwrap();
            let plain = decrypt_secret(&blob, &s(password)).unwrap();
            assert_eq!(plain.expose_secret(), secret);
        }
    }

    #[test]
    fn test_default_cost_scenario() {
        let blob = encrypt_secret(&s("0xabc123..."), &s("hunter2")).unwrap();

        assert_eq!(
            decrypt_secret(&blob, &s("hunter2")).unwrap().expose_secret(),
            "0xabc123..."
        );
        assert!(matches!(
            decrypt_secret(&blob, &s("wrong")),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_wrong_password_fails() {
        let blob = encrypt_secret_with(&s("0xdeadbeef"), &s("correct horse"), &test_kdf()).unwrap();
        for wrong in ["correct horsE", "correct horse ", "x"] {
            assert!(matches!(
                decrypt_secret(&blob, &s(wrong)),
                Err(Error::DecryptionFailed)
            ));
        }
    }

    #[test]
    fn test_blob_hides_plaintext_and_is_salted() {
        let secret = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let first = encrypt_secret_with(&s(secret), &s("pw"), &test_kdf()).unwrap();
        let second = encrypt_secret_with(&s(secret), &s("pw"), &test_kdf()).unwrap();

        assert!(is_encrypted(first.as_str()));
        assert!(!first.as_str().contains("ac0974bec"));
        assert_ne!(first, second);

        let (a, b) = (raw_bytes(&first), raw_bytes(&second));
        let salt = HEADER_LEN..HEADER_LEN + SALT_LEN;
        assert_ne!(a[salt.clone()], b[salt]);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(matches!(
            encrypt_secret_with(&s(""), &s("pw"), &test_kdf()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            encrypt_secret_with(&s("key"), &s(""), &test_kdf()),
            Err(Error::InvalidInput(_))
        ));
        let blob = encrypt_secret_with(&s("key"), &s("pw"), &test_kdf()).unwrap();
        assert!(matches!(
            decrypt_secret(&blob, &s("")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_corrupted_blobs_fail() {
        let blob = encrypt_secret_with(&s("0xfeedface"), &s("pw"), &test_kdf()).unwrap();
        let bytes = raw_bytes(&blob);

        let mut flipped_ct = bytes.clone();
        let last = flipped_ct.len() - 1;
        flipped_ct[last] ^= 0x01;

        let mut flipped_nonce = bytes.clone();
        flipped_nonce[HEADER_LEN + SALT_LEN] ^= 0x80;

        let mut bumped_cost = bytes.clone();
        bumped_cost[5] = bumped_cost[5].wrapping_add(1);

        let mut future_version = bytes.clone();
        future_version[0] = 2;

        let truncated = bytes[..bytes.len() - 4].to_vec();
        let header_only = bytes[..HEADER_LEN + SALT_LEN].to_vec();

        let damaged = [
            from_bytes(&flipped_ct),
            from_bytes(&flipped_nonce),
            from_bytes(&bumped_cost),
            from_bytes(&future_version),
            from_bytes(&truncated),
            from_bytes(&header_only),
            EncryptedBlob::new(""),
            EncryptedBlob::new("enc1:"),
            EncryptedBlob::new("enc1:not base64!!"),
            EncryptedBlob::new(blob.as_str().trim_start_matches(BLOB_PREFIX)),
            EncryptedBlob::new("U2FsdGVkX1+legacycryptojsblob"),
        ];

        for candidate in damaged.iter() {
            assert!(
                matches!(decrypt_secret(candidate, &s("pw")), Err(Error::DecryptionFailed)),
                "expected failure for {:?}",
                candidate
            );
        }
    }

    #[test]
    fn test_debug_does_not_dump_blob() {
        let blob = encrypt_secret_with(&s("key"), &s("pw"), &test_kdf()).unwrap();
        let debug = format!("{:?}", blob);
        assert!(debug.contains("bytes"));
        assert!(!debug.contains(BLOB_PREFIX));
    }

    #[test]
    fn test_kdf_cost_ceiling_enforced_on_encrypt() {
        let too_slow = KdfParams {
            t_cost: MAX_T_COST + 1,
            ..test_kdf()
        };
        let too_big = KdfParams {
            m_cost_kib: MAX_M_COST_KIB + 1,
            ..test_kdf()
        };
        for kdf in [too_slow, too_big] {
            assert!(kdf.validate().is_err());
            assert!(matches!(
                encrypt_secret_with(&s("key"), &s("pw"), &kdf),
                Err(Error::InvalidInput(_))
            ));
        }

        // The highest accepted cost still round-trips
        let edge = KdfParams {
            t_cost: MAX_T_COST,
            ..test_kdf()
        };
        let blob = encrypt_secret_with(&s("key"), &s("pw"), &edge).unwrap();
        assert_eq!(decrypt_secret(&blob, &s("pw")).unwrap().expose_secret(), "key");
        assert!(KdfParams::default().validate().is_ok());
    }

    #[test]
    fn test_hostile_header_cost_rejected_before_kdf() {
        let blob = encrypt_secret_with(&s("key"), &s("pw"), &test_kdf()).unwrap();
        let mut bytes = raw_bytes(&blob);
        bytes[1..5].copy_from_slice(&(4 * 1024 * 1024u32).to_le_bytes());
        bytes[5..9].copy_from_slice(&64u32.to_le_bytes());

        assert!(matches!(
            decrypt_secret(&from_bytes(&bytes), &s("pw")),
            Err(Error::DecryptionFailed)
        ));
    }

    #[tokio::test]
    async fn test_async_variants_round_trip() {
        let password = Arc::new(s("hunter2"));
        let blob = encrypt_secret_async(s("0xfeed"), password.clone(), test_kdf())
            .await
            .unwrap();

        let plain = decrypt_secret_async(blob.clone(), password).await.unwrap();
        assert_eq!(plain.expose_secret(), "0xfeed");
        assert!(matches!(
            decrypt_secret_async(blob, Arc::new(s("wrong"))).await,
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn test_invalid_kdf_rejected_on_encrypt() {
        let bad = KdfParams {
            m_cost_kib: 1,
            t_cost: 0,
            p_cost: 1,
        };
        assert!(matches!(
            encrypt_secret_with(&s("key"), &s("pw"), &bad),
            Err(Error::InvalidInput(_))
        ));
    }
}
