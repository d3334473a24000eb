//! Put/get/copy orchestration over the storage collaborator
//!
//! The engine threads one immutable [`TransferConfig`] value through every
//! call; nothing here consults process-wide defaults. Encryption is engaged
//! by configuring a master key: plaintext never leaves the process when one
//! is set.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use md5::{Digest, Md5};
use tracing::{debug, info};

use lode_core::config::TransferConfig;
use lode_core::types::{ObjectMeta, ObjectRef, TransferMode};
use lode_core::{LodeError, LodeResult};
use lode_crypto::envelope::{self, CipherSpec, KeyMaterial};
use lode_crypto::stream::{encrypted_len, DecryptingReader, EncryptingReader};
use lode_crypto::BLOCK_LEN;
use lode_store::client::{GetRequest, ObjectClient, PutRequest};

use crate::materials::{self, MaterialHints};
use crate::multipart::with_multipart;
use crate::planner;

/// Payload source for a write.
pub enum Body<'a> {
    /// Whole payload in memory; exact length and MD5 hints are derived.
    Bytes(Bytes),
    /// Streaming source with an optional caller-declared length. Without a
    /// length, a chunking decision cannot be made and the write fails with
    /// `MissingSizeHint`.
    Reader {
        reader: Box<dyn Read + 'a>,
        length: Option<u64>,
    },
}

impl Body<'_> {
    pub fn length(&self) -> Option<u64> {
        match self {
            Body::Bytes(bytes) => Some(bytes.len() as u64),
            Body::Reader { length, .. } => *length,
        }
    }
}

impl From<Vec<u8>> for Body<'static> {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Body<'static> {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

/// Per-call write options.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub metadata: ObjectMeta,
}

/// Per-call read options.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Half-open byte range. Incompatible with client-side encryption:
    /// chained block decryption needs the full ciphertext from the start.
    pub range: Option<(u64, u64)>,
}

/// Outcome of a write.
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: String,
    pub version_id: Option<String>,
    pub mode: TransferMode,
    /// Chunk count for multipart writes, 0 for direct.
    pub parts: usize,
    pub encrypted: bool,
}

/// Synchronous transfer engine over an [`ObjectClient`].
pub struct TransferEngine<'a, C: ObjectClient + ?Sized> {
    client: &'a C,
    config: TransferConfig,
    master_key: Option<KeyMaterial>,
    cipher_spec: CipherSpec,
}

impl<'a, C: ObjectClient + ?Sized> TransferEngine<'a, C> {
    pub fn new(client: &'a C, config: TransferConfig) -> Self {
        Self {
            client,
            config,
            master_key: None,
            cipher_spec: CipherSpec::aes256_cbc(),
        }
    }

    /// Engage client-side encryption for every subsequent put/get/copy.
    pub fn with_master_key(mut self, master_key: KeyMaterial) -> Self {
        self.master_key = Some(master_key);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Write one object, encrypting when a master key is configured and
    /// choosing direct vs. multipart from the (post-encryption) size.
    pub fn put(&self, target: &ObjectRef, body: Body<'_>, options: PutOptions) -> LodeResult<PutResult> {
        let plain_len = body.length();
        let mut metadata = options.metadata;

        // Envelope + materials first; the data write is a separate step with
        // no atomicity between the two.
        let (mut source, transfer_len, encrypted): (Box<dyn Read + '_>, Option<u64>, bool) =
            match &self.master_key {
                Some(master) => {
                    let envelope = envelope::generate_envelope(
                        &self.cipher_spec,
                        &self.config.materials_descriptor,
                    )?;
                    let wrapped = envelope::wrap(master, &envelope)?;
                    let hints = hints_for(&body, plain_len);
                    if let Some(entries) = materials::store(
                        self.client,
                        &wrapped,
                        self.config.materials_location,
                        target,
                        &hints,
                    )? {
                        metadata.extend(entries);
                    }

                    let inner: Box<dyn Read + '_> = into_reader(body);
                    let reader = EncryptingReader::new(inner, &envelope)?;
                    let transfer_len =
                        plain_len.map(|len| encrypted_len(len, BLOCK_LEN as u64));
                    (Box::new(reader), transfer_len, true)
                }
                None => (into_reader(body), plain_len, false),
            };

        let plan = planner::plan(transfer_len, &self.config)?;
        debug!(
            bucket = %target.bucket,
            key = %target.key,
            mode = ?plan.mode,
            length = ?transfer_len,
            encrypted,
            "transfer planned"
        );

        let mut request = PutRequest::new(target.clone());
        request.metadata = metadata;
        request.server_side_encryption = self.config.server_side_encryption.clone();

        let (parts, response) = match plan.mode {
            TransferMode::Direct => {
                request.content_length = transfer_len;
                (0, self.client.put_object(request, &mut source)?)
            }
            TransferMode::Multipart => {
                // Planner always produces a part size alongside Multipart.
                let part_size = plan.part_size.ok_or_else(|| {
                    LodeError::MissingSizeHint("multipart plan without a part size".into())
                })? as usize;
                let (count, response) = with_multipart(self.client, request, |upload| {
                    let mut count = 0usize;
                    loop {
                        let chunk = read_chunk(&mut source, part_size)?;
                        if chunk.is_empty() {
                            break;
                        }
                        upload.add_part(Bytes::from(chunk), None)?;
                        count += 1;
                    }
                    Ok(count)
                })?;
                (count, response)
            }
        };

        info!(
            bucket = %target.bucket,
            key = %target.key,
            etag = %response.etag,
            mode = ?plan.mode,
            parts,
            encrypted,
            "object written"
        );
        Ok(PutResult {
            etag: response.etag,
            version_id: response.version_id,
            mode: plan.mode,
            parts,
            encrypted,
        })
    }

    /// Read one object, decrypting when a master key is configured.
    pub fn get(&self, source: &ObjectRef, options: GetOptions) -> LodeResult<Box<dyn Read + Send>> {
        match &self.master_key {
            None => {
                let mut request = GetRequest::new(source.clone());
                request.range = options.range;
                self.client.get_object(request)
            }
            Some(master) => {
                if options.range.is_some() {
                    return Err(LodeError::Other(anyhow::anyhow!(
                        "byte-range reads cannot be combined with client-side decryption; \
                         chained block decryption needs the full ciphertext from the start"
                    )));
                }
                let wrapped = materials::retrieve(
                    self.client,
                    self.config.materials_location,
                    source,
                )?;
                let envelope = envelope::unwrap(master, &wrapped)?;
                let body = self.client.get_object(GetRequest::new(source.clone()))?;
                let reader = DecryptingReader::new(body, &envelope)?;
                Ok(Box::new(reader))
            }
        }
    }

    /// Convenience: read the whole object into memory, translating reader
    /// errors back into their `LodeError` form.
    pub fn get_to_vec(&self, source: &ObjectRef, options: GetOptions) -> LodeResult<Vec<u8>> {
        let mut reader = self.get(source, options)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).map_err(LodeError::from_io)?;
        Ok(out)
    }

    /// Duplicate an object: data copy, then materials copy when encryption
    /// is configured. Two independent calls with no rollback; a failure in
    /// between leaves a destination without usable materials.
    pub fn copy(&self, source: &ObjectRef, dest: &ObjectRef) -> LodeResult<()> {
        self.client.copy_object(lode_store::client::CopyRequest {
            source: source.clone(),
            dest: dest.clone(),
            metadata: None,
        })?;
        if self.master_key.is_some() {
            materials::copy_materials(
                self.client,
                source,
                dest,
                self.config.materials_location,
            )?;
        }
        Ok(())
    }

    pub fn delete(&self, target: &ObjectRef) -> LodeResult<()> {
        self.client.delete_object(target)
    }
}

fn into_reader(body: Body<'_>) -> Box<dyn Read + '_> {
    match body {
        Body::Bytes(bytes) => Box::new(std::io::Cursor::new(bytes)),
        Body::Reader { reader, .. } => reader,
    }
}

fn hints_for(body: &Body<'_>, plain_len: Option<u64>) -> MaterialHints {
    let unencrypted_md5 = match body {
        Body::Bytes(bytes) => Some(STANDARD.encode(Md5::digest(bytes))),
        Body::Reader { .. } => None,
    };
    MaterialHints {
        unencrypted_length: plain_len,
        unencrypted_md5,
    }
}

/// Pull up to `size` bytes, tolerating short reads from the source.
fn read_chunk(reader: &mut dyn Read, size: usize) -> LodeResult<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).map_err(LodeError::from_io)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_chunk_exact_and_short() {
        let mut source: &[u8] = b"abcdefgh";
        let chunk = read_chunk(&mut source, 5).unwrap();
        assert_eq!(chunk, b"abcde");
        let chunk = read_chunk(&mut source, 5).unwrap();
        assert_eq!(chunk, b"fgh");
        let chunk = read_chunk(&mut source, 5).unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_body_length() {
        assert_eq!(Body::from(vec![0u8; 10]).length(), Some(10));
        let body = Body::Reader {
            reader: Box::new(std::io::empty()),
            length: None,
        };
        assert_eq!(body.length(), None);
    }

    #[test]
    fn test_hints_for_bytes_body() {
        let body = Body::from(b"hello".to_vec());
        let hints = hints_for(&body, body.length());
        assert_eq!(hints.unencrypted_length, Some(5));
        // base64(md5("hello"))
        assert_eq!(hints.unencrypted_md5.as_deref(), Some("XUFAKrxLKna5cZ2REBfFkg=="));
    }
}
