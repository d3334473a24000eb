//! Persistence of wrapped key material
//!
//! Two locations, agreed out of band between writer and reader:
//! - `Metadata`: the wrapped key, wrapped IV, and descriptor travel as
//!   string-valued metadata entries on the data write, alongside
//!   unencrypted-length/-checksum hints.
//! - `InstructionFile`: the same three entries serialize as a JSON document
//!   written to a `<key>.instruction` sibling object — a distinct,
//!   non-atomic write relative to the primary data write.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use lode_core::types::{fields, MaterialsLocation, ObjectMeta, ObjectRef};
use lode_core::{LodeError, LodeResult};
use lode_crypto::WrappedEnvelope;
use lode_store::client::{CopyRequest, ObjectClient, PutRequest};

/// Plaintext-payload hints persisted on the metadata path only.
#[derive(Debug, Clone, Default)]
pub struct MaterialHints {
    pub unencrypted_length: Option<u64>,
    /// Base64 MD5 of the plaintext.
    pub unencrypted_md5: Option<String>,
}

/// The instruction-file document shape.
#[derive(Debug, Serialize, Deserialize)]
struct InstructionDoc {
    #[serde(rename = "x-amz-key")]
    key: String,
    #[serde(rename = "x-amz-iv")]
    iv: String,
    #[serde(rename = "x-amz-matdesc")]
    matdesc: String,
}

/// The three materials entries (plus hints) as metadata map entries.
pub fn metadata_entries(wrapped: &WrappedEnvelope, hints: &MaterialHints) -> ObjectMeta {
    let mut entries = ObjectMeta::new();
    entries.insert(fields::KEY.into(), STANDARD.encode(&wrapped.key));
    entries.insert(fields::IV.into(), STANDARD.encode(&wrapped.iv));
    entries.insert(fields::MATDESC.into(), wrapped.descriptor.clone());
    if let Some(length) = hints.unencrypted_length {
        entries.insert(fields::UNENCRYPTED_LENGTH.into(), length.to_string());
    }
    if let Some(md5) = &hints.unencrypted_md5 {
        entries.insert(fields::UNENCRYPTED_MD5.into(), md5.clone());
    }
    entries
}

/// Persist wrapped materials for `target`.
///
/// Returns the metadata entries to merge into the data write when the
/// location is `Metadata`; performs the sibling instruction write (and
/// returns `None`) when the location is `InstructionFile`.
pub fn store<C: ObjectClient + ?Sized>(
    client: &C,
    wrapped: &WrappedEnvelope,
    location: MaterialsLocation,
    target: &ObjectRef,
    hints: &MaterialHints,
) -> LodeResult<Option<ObjectMeta>> {
    match location {
        MaterialsLocation::Metadata => Ok(Some(metadata_entries(wrapped, hints))),
        MaterialsLocation::InstructionFile => {
            let doc = InstructionDoc {
                key: STANDARD.encode(&wrapped.key),
                iv: STANDARD.encode(&wrapped.iv),
                matdesc: wrapped.descriptor.clone(),
            };
            let body = serde_json::to_vec(&doc)
                .map_err(|e| anyhow::anyhow!("instruction document serialization: {e}"))?;
            client.put_object(
                PutRequest::new(target.instruction_ref()),
                &mut body.as_slice(),
            )?;
            Ok(None)
        }
    }
}

/// Retrieve wrapped materials for `source` from the configured location.
///
/// Never returns a partially populated envelope: a missing wrapped key or
/// IV — including the whole instruction object being absent — is
/// [`LodeError::MaterialsNotFound`].
pub fn retrieve<C: ObjectClient + ?Sized>(
    client: &C,
    location: MaterialsLocation,
    source: &ObjectRef,
) -> LodeResult<WrappedEnvelope> {
    match location {
        MaterialsLocation::Metadata => {
            let head = client.head_object(source)?;
            let key = head.metadata.get(fields::KEY);
            let iv = head.metadata.get(fields::IV);
            let (key, iv) = match (key, iv) {
                (Some(key), Some(iv)) => (key.clone(), iv.clone()),
                _ => {
                    return Err(LodeError::MaterialsNotFound(format!(
                        "no wrapped key/IV in metadata of {}/{}",
                        source.bucket, source.key
                    )))
                }
            };
            let descriptor = head
                .metadata
                .get(fields::MATDESC)
                .cloned()
                .unwrap_or_default();
            decode_envelope(&key, &iv, descriptor)
        }
        MaterialsLocation::InstructionFile => {
            let instruction = source.instruction_ref();
            let mut body = client
                .get_object(lode_store::client::GetRequest::new(instruction.clone()))
                .map_err(|e| {
                    LodeError::MaterialsNotFound(format!(
                        "no instruction object at {}/{}: {e}",
                        instruction.bucket, instruction.key
                    ))
                })?;
            let mut raw = Vec::new();
            body.read_to_end(&mut raw)?;
            let doc: InstructionDoc = serde_json::from_slice(&raw)
                .map_err(|e| anyhow::anyhow!("instruction document parse: {e}"))?;
            decode_envelope(&doc.key, &doc.iv, doc.matdesc)
        }
    }
}

/// Duplicate the materials of an already-copied encrypted object.
///
/// Two independent calls with the data copy and no rollback: a failure here
/// leaves the destination object without usable materials, which the caller
/// must detect and handle.
pub fn copy_materials<C: ObjectClient + ?Sized>(
    client: &C,
    source: &ObjectRef,
    dest: &ObjectRef,
    location: MaterialsLocation,
) -> LodeResult<()> {
    match location {
        MaterialsLocation::Metadata => {
            let head = client.head_object(source)?;
            let complete = [fields::KEY, fields::IV, fields::MATDESC]
                .iter()
                .all(|field| head.metadata.contains_key(*field));
            if complete {
                // The data copy already carried the metadata entries.
                return Ok(());
            }
            warn!(
                bucket = %source.bucket,
                key = %source.key,
                "materials metadata incomplete; falling back to instruction-object copy"
            );
            copy_instruction(client, source, dest)
        }
        MaterialsLocation::InstructionFile => copy_instruction(client, source, dest),
    }
}

fn copy_instruction<C: ObjectClient + ?Sized>(
    client: &C,
    source: &ObjectRef,
    dest: &ObjectRef,
) -> LodeResult<()> {
    client.copy_object(CopyRequest {
        source: source.instruction_ref(),
        dest: dest.instruction_ref(),
        metadata: None,
    })?;
    Ok(())
}

fn decode_envelope(key: &str, iv: &str, descriptor: String) -> LodeResult<WrappedEnvelope> {
    let key = STANDARD
        .decode(key)
        .map_err(|e| anyhow::anyhow!("invalid base64 in wrapped key: {e}"))?;
    let iv = STANDARD
        .decode(iv)
        .map_err(|e| anyhow::anyhow!("invalid base64 in wrapped IV: {e}"))?;
    Ok(WrappedEnvelope {
        key,
        iv,
        descriptor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_crypto::envelope::{generate_envelope, wrap, CipherSpec, KeyMaterial};
    use lode_store::MemoryClient;

    fn wrapped_fixture() -> WrappedEnvelope {
        let master = KeyMaterial::symmetric(vec![9u8; 32]).unwrap();
        let envelope = generate_envelope(&CipherSpec::aes256_cbc(), "{\"k\":\"v\"}").unwrap();
        wrap(&master, &envelope).unwrap()
    }

    #[test]
    fn test_metadata_entries_complete() {
        let wrapped = wrapped_fixture();
        let hints = MaterialHints {
            unencrypted_length: Some(42),
            unencrypted_md5: Some("md5b64".into()),
        };
        let entries = metadata_entries(&wrapped, &hints);

        assert!(entries.contains_key(fields::KEY));
        assert!(entries.contains_key(fields::IV));
        assert_eq!(entries.get(fields::MATDESC).map(String::as_str), Some("{\"k\":\"v\"}"));
        assert_eq!(
            entries.get(fields::UNENCRYPTED_LENGTH).map(String::as_str),
            Some("42")
        );
        assert_eq!(
            entries.get(fields::UNENCRYPTED_MD5).map(String::as_str),
            Some("md5b64")
        );
    }

    #[test]
    fn test_instruction_store_retrieve_roundtrip() {
        let client = MemoryClient::new();
        let target = ObjectRef::new("b", "k");
        let wrapped = wrapped_fixture();

        let entries = store(
            &client,
            &wrapped,
            MaterialsLocation::InstructionFile,
            &target,
            &MaterialHints::default(),
        )
        .unwrap();
        assert!(entries.is_none(), "instruction path writes, not merges");
        assert!(client.raw_object(&target.instruction_ref()).is_some());

        let retrieved = retrieve(&client, MaterialsLocation::InstructionFile, &target).unwrap();
        assert_eq!(retrieved, wrapped);
    }

    #[test]
    fn test_location_never_auto_discovered() {
        let client = MemoryClient::new();
        let target = ObjectRef::new("b", "k");
        let wrapped = wrapped_fixture();

        // Written as an instruction file...
        store(
            &client,
            &wrapped,
            MaterialsLocation::InstructionFile,
            &target,
            &MaterialHints::default(),
        )
        .unwrap();
        // ...and the data object exists but carries no materials metadata
        client
            .put_object(PutRequest::new(target.clone()), &mut &b"ciphertext"[..])
            .unwrap();

        let err = retrieve(&client, MaterialsLocation::Metadata, &target).unwrap_err();
        assert!(matches!(err, LodeError::MaterialsNotFound(_)));
    }

    #[test]
    fn test_retrieve_rejects_partial_metadata() {
        let client = MemoryClient::new();
        let target = ObjectRef::new("b", "k");

        let mut request = PutRequest::new(target.clone());
        // Wrapped key present, IV missing
        request
            .metadata
            .insert(fields::KEY.into(), STANDARD.encode(b"some wrapped key"));
        client.put_object(request, &mut &b"data"[..]).unwrap();

        let err = retrieve(&client, MaterialsLocation::Metadata, &target).unwrap_err();
        assert!(matches!(err, LodeError::MaterialsNotFound(_)));
    }

    #[test]
    fn test_copy_materials_instruction_path() {
        let client = MemoryClient::new();
        let src = ObjectRef::new("b", "src");
        let dst = ObjectRef::new("b", "dst");
        let wrapped = wrapped_fixture();

        store(
            &client,
            &wrapped,
            MaterialsLocation::InstructionFile,
            &src,
            &MaterialHints::default(),
        )
        .unwrap();
        copy_materials(&client, &src, &dst, MaterialsLocation::InstructionFile).unwrap();

        let retrieved = retrieve(&client, MaterialsLocation::InstructionFile, &dst).unwrap();
        assert_eq!(retrieved, wrapped);
    }

    #[test]
    fn test_copy_materials_metadata_fallback() {
        let client = MemoryClient::new();
        let src = ObjectRef::new("b", "src");
        let dst = ObjectRef::new("b", "dst");
        let wrapped = wrapped_fixture();

        // Source object has incomplete metadata but a valid instruction sibling
        let mut request = PutRequest::new(src.clone());
        request
            .metadata
            .insert(fields::KEY.into(), STANDARD.encode(&wrapped.key));
        client.put_object(request, &mut &b"data"[..]).unwrap();
        store(
            &client,
            &wrapped,
            MaterialsLocation::InstructionFile,
            &src,
            &MaterialHints::default(),
        )
        .unwrap();

        copy_materials(&client, &src, &dst, MaterialsLocation::Metadata).unwrap();

        let retrieved = retrieve(&client, MaterialsLocation::InstructionFile, &dst).unwrap();
        assert_eq!(retrieved, wrapped);
    }
}
