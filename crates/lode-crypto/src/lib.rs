//! lode-crypto: client-side envelope encryption for object payloads
//!
//! Pipeline: per-object random data key + IV → payload encrypted with
//! AES-CBC/PKCS#7 → data key and IV wrapped under a caller-supplied master
//! key → wrapped materials persisted next to the object (see lode-transfer).
//!
//! Key hierarchy:
//! ```text
//! Master key (caller-supplied; symmetric bytes or RSA key pair)
//!   └── Data key (per-object, random, wrapped by master key)
//!       └── Payload: AES-CBC with per-object random IV
//! ```
//!
//! There is deliberately no AEAD tag on the payload: wrong-key detection
//! relies on cipher failure (RSA decrypt error, PKCS#7 unpad error), matching
//! the wire format this crate interoperates with.
//!
//! Also home to the presigned-URL signer ([`sign`]), which shares nothing
//! with the envelope path except the credential hygiene rules.

pub mod envelope;
pub mod sign;
pub mod stream;

pub use envelope::{
    generate_envelope, CipherSpec, DataKey, EncryptionEnvelope, KeyMaterial, WrappedEnvelope,
};
pub use sign::{presign, Credentials, Expiry, PresignedRequest};
pub use stream::{encrypted_len, DecryptingReader, EncryptingReader};

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// IV size for AES-CBC.
pub const IV_LEN: usize = 16;
