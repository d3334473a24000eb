//! Streaming AES-CBC adapters over `std::io::Read`
//!
//! Both adapters are pull-based: each `read` call pulls up to one scratch
//! buffer of bytes from the inner source, feeds full cipher blocks through
//! incrementally, and hands back whatever ciphertext (or plaintext) is ready.
//! Nothing buffers the whole payload. Output length per call may differ from
//! the requested length because of block buffering; EOF is signaled only
//! after the final (padded) block has been drained.
//!
//! Ciphertext layout: CBC with PKCS#7 padding, so the ciphertext is always
//! `floor(plain / 16) * 16 + 16` bytes — one full block is appended even when
//! the plaintext is an exact block multiple. [`encrypted_len`] computes this
//! before any byte is transformed, which direct uploads use to declare the
//! content length up front.

use std::io::{self, Read};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};

use lode_core::{LodeError, LodeResult};

use crate::envelope::EncryptionEnvelope;
use crate::BLOCK_LEN;

const SCRATCH_LEN: usize = 8 * 1024;

/// Ciphertext length for a given plaintext length, per the PKCS#7 policy.
/// Deterministic and data-independent.
pub fn encrypted_len(plain_len: u64, block_len: u64) -> u64 {
    (plain_len / block_len) * block_len + block_len
}

enum CbcEnc {
    Aes128(cbc::Encryptor<Aes128>),
    Aes192(cbc::Encryptor<Aes192>),
    Aes256(cbc::Encryptor<Aes256>),
}

impl CbcEnc {
    fn new(key: &[u8], iv: &[u8]) -> LodeResult<Self> {
        let bad_init = |e: aes::cipher::InvalidLength| {
            LodeError::InvalidKeyMaterial(format!("content cipher init: {e}"))
        };
        match key.len() {
            16 => Ok(Self::Aes128(
                cbc::Encryptor::new_from_slices(key, iv).map_err(bad_init)?,
            )),
            24 => Ok(Self::Aes192(
                cbc::Encryptor::new_from_slices(key, iv).map_err(bad_init)?,
            )),
            32 => Ok(Self::Aes256(
                cbc::Encryptor::new_from_slices(key, iv).map_err(bad_init)?,
            )),
            n => Err(LodeError::InvalidKeyMaterial(format!(
                "data key must be 16, 24, or 32 bytes, got {n}"
            ))),
        }
    }

    fn encrypt_block(&mut self, block: &mut [u8]) {
        match self {
            Self::Aes128(c) => c.encrypt_block_mut(GenericArray::from_mut_slice(block)),
            Self::Aes192(c) => c.encrypt_block_mut(GenericArray::from_mut_slice(block)),
            Self::Aes256(c) => c.encrypt_block_mut(GenericArray::from_mut_slice(block)),
        }
    }
}

enum CbcDec {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl CbcDec {
    fn new(key: &[u8], iv: &[u8]) -> LodeResult<Self> {
        let bad_init = |e: aes::cipher::InvalidLength| {
            LodeError::InvalidKeyMaterial(format!("content cipher init: {e}"))
        };
        match key.len() {
            16 => Ok(Self::Aes128(
                cbc::Decryptor::new_from_slices(key, iv).map_err(bad_init)?,
            )),
            24 => Ok(Self::Aes192(
                cbc::Decryptor::new_from_slices(key, iv).map_err(bad_init)?,
            )),
            32 => Ok(Self::Aes256(
                cbc::Decryptor::new_from_slices(key, iv).map_err(bad_init)?,
            )),
            n => Err(LodeError::InvalidKeyMaterial(format!(
                "data key must be 16, 24, or 32 bytes, got {n}"
            ))),
        }
    }

    fn decrypt_block(&mut self, block: &mut [u8]) {
        match self {
            Self::Aes128(c) => c.decrypt_block_mut(GenericArray::from_mut_slice(block)),
            Self::Aes192(c) => c.decrypt_block_mut(GenericArray::from_mut_slice(block)),
            Self::Aes256(c) => c.decrypt_block_mut(GenericArray::from_mut_slice(block)),
        }
    }
}

/// Decorates a plaintext source, producing AES-CBC/PKCS#7 ciphertext.
pub struct EncryptingReader<R> {
    inner: R,
    cipher: CbcEnc,
    /// Plaintext bytes awaiting a full block.
    pending: Vec<u8>,
    /// Ciphertext ready to hand out.
    out: Vec<u8>,
    out_pos: usize,
    finalized: bool,
}

impl<R: Read> EncryptingReader<R> {
    pub fn new(inner: R, envelope: &EncryptionEnvelope) -> LodeResult<Self> {
        Ok(Self {
            inner,
            cipher: CbcEnc::new(envelope.data_key.as_bytes(), &envelope.iv)?,
            pending: Vec::with_capacity(SCRATCH_LEN + BLOCK_LEN),
            out: Vec::with_capacity(SCRATCH_LEN + BLOCK_LEN),
            out_pos: 0,
            finalized: false,
        })
    }

    fn encrypt_full_blocks(&mut self) {
        let full = (self.pending.len() / BLOCK_LEN) * BLOCK_LEN;
        for block in self.pending[..full].chunks_exact_mut(BLOCK_LEN) {
            self.cipher.encrypt_block(block);
        }
        self.out.extend_from_slice(&self.pending[..full]);
        self.pending.drain(..full);
    }

    fn serve(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.out.len() - self.out_pos);
        buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        if self.out_pos == self.out.len() {
            self.out.clear();
            self.out_pos = 0;
        }
        n
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.out_pos < self.out.len() {
                return Ok(self.serve(buf));
            }
            if self.finalized {
                return Ok(0);
            }
            let mut scratch = [0u8; SCRATCH_LEN];
            let n = self.inner.read(&mut scratch)?;
            if n == 0 {
                // Source EOF: PKCS#7 pad. A full extra block when the
                // plaintext is an exact block multiple.
                let pad = BLOCK_LEN - (self.pending.len() % BLOCK_LEN);
                self.pending.resize(self.pending.len() + pad, pad as u8);
                self.encrypt_full_blocks();
                self.finalized = true;
            } else {
                self.pending.extend_from_slice(&scratch[..n]);
                self.encrypt_full_blocks();
            }
        }
    }
}

/// Decorates a ciphertext source, producing the original plaintext.
///
/// The final ciphertext block is held back until the inner source reports
/// EOF so padding can be stripped; an invalid padding tail surfaces as
/// [`LodeError::KeyMismatch`] wrapped in an `io::Error` (wrong data key, or
/// a corrupt tail — there is no AEAD tag to tell them apart).
pub struct DecryptingReader<R> {
    inner: R,
    cipher: CbcDec,
    /// Ciphertext not yet decrypted; always keeps at least one block back
    /// until EOF.
    pending: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    finalized: bool,
}

impl<R: Read> DecryptingReader<R> {
    pub fn new(inner: R, envelope: &EncryptionEnvelope) -> LodeResult<Self> {
        Ok(Self {
            inner,
            cipher: CbcDec::new(envelope.data_key.as_bytes(), &envelope.iv)?,
            pending: Vec::with_capacity(SCRATCH_LEN + BLOCK_LEN),
            out: Vec::with_capacity(SCRATCH_LEN + BLOCK_LEN),
            out_pos: 0,
            finalized: false,
        })
    }

    /// Decrypt every complete block except a held-back final candidate.
    fn decrypt_available(&mut self) {
        let len = self.pending.len();
        let take = if len % BLOCK_LEN == 0 {
            len.saturating_sub(BLOCK_LEN)
        } else {
            (len / BLOCK_LEN) * BLOCK_LEN
        };
        for block in self.pending[..take].chunks_exact_mut(BLOCK_LEN) {
            self.cipher.decrypt_block(block);
        }
        self.out.extend_from_slice(&self.pending[..take]);
        self.pending.drain(..take);
    }

    fn finalize(&mut self) -> io::Result<()> {
        if self.pending.len() != BLOCK_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "ciphertext ends with {} trailing bytes; expected one final block",
                    self.pending.len()
                ),
            ));
        }
        let mut block = [0u8; BLOCK_LEN];
        block.copy_from_slice(&self.pending);
        self.cipher.decrypt_block(&mut block);
        self.pending.clear();

        let pad = block[BLOCK_LEN - 1] as usize;
        let valid = (1..=BLOCK_LEN).contains(&pad)
            && block[BLOCK_LEN - pad..].iter().all(|&b| b == pad as u8);
        if !valid {
            return Err(
                LodeError::KeyMismatch("padding check failed on final block".into()).into_io(),
            );
        }
        self.out.extend_from_slice(&block[..BLOCK_LEN - pad]);
        self.finalized = true;
        Ok(())
    }

    fn serve(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.out.len() - self.out_pos);
        buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        if self.out_pos == self.out.len() {
            self.out.clear();
            self.out_pos = 0;
        }
        n
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.out_pos < self.out.len() {
                return Ok(self.serve(buf));
            }
            if self.finalized {
                return Ok(0);
            }
            let mut scratch = [0u8; SCRATCH_LEN];
            let n = self.inner.read(&mut scratch)?;
            if n == 0 {
                self.finalize()?;
            } else {
                self.pending.extend_from_slice(&scratch[..n]);
                self.decrypt_available();
            }
        }
    }
}
