//! Envelope generation and master-key wrap/unwrap
//!
//! Symmetric masters wrap with AES-ECB and no padding: the data key and IV
//! are both an integral number of cipher blocks, so there is no padding
//! ambiguity and the wrapped form is exactly as long as the plaintext form.
//! Asymmetric masters wrap with RSA PKCS#1 v1.5, which randomizes padding;
//! callers must not assume wrap reproducibility on that path.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroize;

use lode_core::{LodeError, LodeResult};

use crate::{BLOCK_LEN, IV_LEN};

/// Acceptable symmetric key lengths, for master keys and data keys alike.
pub const VALID_KEY_LENS: [usize; 3] = [16, 24, 32];

/// Shape of the content cipher an envelope is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSpec {
    pub key_len: usize,
    pub iv_len: usize,
    pub block_len: usize,
}

impl CipherSpec {
    /// AES-256-CBC, the default content cipher.
    pub fn aes256_cbc() -> Self {
        Self {
            key_len: 32,
            iv_len: IV_LEN,
            block_len: BLOCK_LEN,
        }
    }
}

impl Default for CipherSpec {
    fn default() -> Self {
        Self::aes256_cbc()
    }
}

/// A per-object data encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct DataKey {
    bytes: Vec<u8>,
}

impl DataKey {
    pub fn from_bytes(bytes: Vec<u8>) -> LodeResult<Self> {
        if !VALID_KEY_LENS.contains(&bytes.len()) {
            return Err(LodeError::InvalidKeyMaterial(format!(
                "data key must be 16, 24, or 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for DataKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Caller-supplied master key. The tag selects the wrap/unwrap strategy.
pub enum KeyMaterial {
    /// Raw symmetric key, 16/24/32 bytes. Zeroized on drop.
    Symmetric(Vec<u8>),
    /// RSA key pair; the private half is optional for wrap-only use.
    Asymmetric {
        public: RsaPublicKey,
        private: Option<RsaPrivateKey>,
    },
}

impl KeyMaterial {
    /// Build a symmetric master, rejecting invalid lengths before any
    /// cryptographic operation or I/O is attempted.
    pub fn symmetric(bytes: Vec<u8>) -> LodeResult<Self> {
        if !VALID_KEY_LENS.contains(&bytes.len()) {
            return Err(LodeError::InvalidKeyMaterial(format!(
                "symmetric master key must be 16, 24, or 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(KeyMaterial::Symmetric(bytes))
    }

    pub fn asymmetric(public: RsaPublicKey, private: Option<RsaPrivateKey>) -> Self {
        KeyMaterial::Asymmetric { public, private }
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        if let KeyMaterial::Symmetric(bytes) = self {
            bytes.zeroize();
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterial::Symmetric(_) => f.write_str("KeyMaterial::Symmetric([REDACTED])"),
            KeyMaterial::Asymmetric { private, .. } => f
                .debug_struct("KeyMaterial::Asymmetric")
                .field("private", &private.is_some())
                .finish(),
        }
    }
}

/// Plaintext envelope for one object write: the data key, the IV, and the
/// opaque descriptor persisted alongside the wrapped form.
#[derive(Debug)]
pub struct EncryptionEnvelope {
    pub data_key: DataKey,
    pub iv: [u8; IV_LEN],
    pub descriptor: String,
}

/// Master-key-encrypted envelope, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedEnvelope {
    /// Encrypted data key.
    pub key: Vec<u8>,
    /// Encrypted IV.
    pub iv: Vec<u8>,
    pub descriptor: String,
}

/// Draw a fresh random data key and IV sized to `spec`. Generated once per
/// write and never reused across objects.
pub fn generate_envelope(spec: &CipherSpec, descriptor: &str) -> LodeResult<EncryptionEnvelope> {
    if !VALID_KEY_LENS.contains(&spec.key_len) {
        return Err(LodeError::InvalidKeyMaterial(format!(
            "cipher spec key length {} is not 16, 24, or 32",
            spec.key_len
        )));
    }
    if spec.iv_len != IV_LEN {
        return Err(LodeError::InvalidKeyMaterial(format!(
            "cipher spec IV length {} is not {IV_LEN}",
            spec.iv_len
        )));
    }

    let mut key = vec![0u8; spec.key_len];
    rand::thread_rng().fill_bytes(&mut key);
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    Ok(EncryptionEnvelope {
        data_key: DataKey::from_bytes(key)?,
        iv,
        descriptor: descriptor.to_string(),
    })
}

/// Encrypt the envelope's data key and IV under the master key.
pub fn wrap(master: &KeyMaterial, envelope: &EncryptionEnvelope) -> LodeResult<WrappedEnvelope> {
    let (key, iv) = match master {
        KeyMaterial::Symmetric(master_key) => {
            validate_master_len(master_key)?;
            (
                ecb_encrypt(master_key, envelope.data_key.as_bytes())?,
                ecb_encrypt(master_key, &envelope.iv)?,
            )
        }
        KeyMaterial::Asymmetric { public, .. } => {
            let mut rng = rand::rngs::OsRng;
            let key = public
                .encrypt(&mut rng, Pkcs1v15Encrypt, envelope.data_key.as_bytes())
                .map_err(|e| anyhow::anyhow!("RSA key wrap failed: {e}"))?;
            let iv = public
                .encrypt(&mut rng, Pkcs1v15Encrypt, &envelope.iv)
                .map_err(|e| anyhow::anyhow!("RSA IV wrap failed: {e}"))?;
            (key, iv)
        }
    };

    Ok(WrappedEnvelope {
        key,
        iv,
        descriptor: envelope.descriptor.clone(),
    })
}

/// Decrypt a wrapped envelope with the appropriate half of the master key.
///
/// A decrypt failure, or decrypted material inconsistent with the expected
/// key/IV lengths, is `KeyMismatch` so callers can tell "wrong key" apart
/// from corrupted or missing materials.
pub fn unwrap(master: &KeyMaterial, wrapped: &WrappedEnvelope) -> LodeResult<EncryptionEnvelope> {
    let (key_bytes, iv_bytes) = match master {
        KeyMaterial::Symmetric(master_key) => {
            validate_master_len(master_key)?;
            (
                ecb_decrypt(master_key, &wrapped.key)?,
                ecb_decrypt(master_key, &wrapped.iv)?,
            )
        }
        KeyMaterial::Asymmetric { private, .. } => {
            let private = private.as_ref().ok_or_else(|| {
                LodeError::InvalidKeyMaterial(
                    "unwrap with an asymmetric master requires the private key".into(),
                )
            })?;
            let key = private
                .decrypt(Pkcs1v15Encrypt, &wrapped.key)
                .map_err(|e| LodeError::KeyMismatch(format!("RSA key unwrap failed: {e}")))?;
            let iv = private
                .decrypt(Pkcs1v15Encrypt, &wrapped.iv)
                .map_err(|e| LodeError::KeyMismatch(format!("RSA IV unwrap failed: {e}")))?;
            (key, iv)
        }
    };

    if !VALID_KEY_LENS.contains(&key_bytes.len()) {
        return Err(LodeError::KeyMismatch(format!(
            "unwrapped data key has invalid length {}",
            key_bytes.len()
        )));
    }
    let iv: [u8; IV_LEN] = iv_bytes.as_slice().try_into().map_err(|_| {
        LodeError::KeyMismatch(format!("unwrapped IV has invalid length {}", iv_bytes.len()))
    })?;

    Ok(EncryptionEnvelope {
        data_key: DataKey::from_bytes(key_bytes)?,
        iv,
        descriptor: wrapped.descriptor.clone(),
    })
}

fn validate_master_len(master_key: &[u8]) -> LodeResult<()> {
    if VALID_KEY_LENS.contains(&master_key.len()) {
        Ok(())
    } else {
        Err(LodeError::InvalidKeyMaterial(format!(
            "symmetric master key must be 16, 24, or 32 bytes, got {}",
            master_key.len()
        )))
    }
}

/// AES-ECB, no padding. `data` must be an integral number of blocks, which
/// holds for every key and IV length this module accepts.
fn ecb_encrypt(master_key: &[u8], data: &[u8]) -> LodeResult<Vec<u8>> {
    if data.len() % BLOCK_LEN != 0 {
        return Err(LodeError::InvalidKeyMaterial(format!(
            "wrap input of {} bytes is not block-aligned",
            data.len()
        )));
    }
    let out = match master_key.len() {
        16 => ecb::Encryptor::<Aes128>::new_from_slice(master_key)
            .map_err(|e| anyhow::anyhow!("cipher init: {e}"))?
            .encrypt_padded_vec_mut::<NoPadding>(data),
        24 => ecb::Encryptor::<Aes192>::new_from_slice(master_key)
            .map_err(|e| anyhow::anyhow!("cipher init: {e}"))?
            .encrypt_padded_vec_mut::<NoPadding>(data),
        32 => ecb::Encryptor::<Aes256>::new_from_slice(master_key)
            .map_err(|e| anyhow::anyhow!("cipher init: {e}"))?
            .encrypt_padded_vec_mut::<NoPadding>(data),
        n => {
            return Err(LodeError::InvalidKeyMaterial(format!(
                "symmetric master key must be 16, 24, or 32 bytes, got {n}"
            )))
        }
    };
    Ok(out)
}

fn ecb_decrypt(master_key: &[u8], data: &[u8]) -> LodeResult<Vec<u8>> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(LodeError::KeyMismatch(format!(
            "wrapped material of {} bytes is not block-aligned",
            data.len()
        )));
    }
    let out = match master_key.len() {
        16 => ecb::Decryptor::<Aes128>::new_from_slice(master_key)
            .map_err(|e| anyhow::anyhow!("cipher init: {e}"))?
            .decrypt_padded_vec_mut::<NoPadding>(data),
        24 => ecb::Decryptor::<Aes192>::new_from_slice(master_key)
            .map_err(|e| anyhow::anyhow!("cipher init: {e}"))?
            .decrypt_padded_vec_mut::<NoPadding>(data),
        32 => ecb::Decryptor::<Aes256>::new_from_slice(master_key)
            .map_err(|e| anyhow::anyhow!("cipher init: {e}"))?
            .decrypt_padded_vec_mut::<NoPadding>(data),
        n => {
            return Err(LodeError::InvalidKeyMaterial(format!(
                "symmetric master key must be 16, 24, or 32 bytes, got {n}"
            )))
        }
    };
    out.map_err(|_| LodeError::KeyMismatch("symmetric unwrap failed".into()))
}
