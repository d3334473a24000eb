//! Integration test: client-side encrypted put → get round-trips, materials
//! location symmetry, and wrong-key behavior, all over the in-memory
//! backend.

use lode_core::config::TransferConfig;
use lode_core::types::{fields, MaterialsLocation, ObjectRef, TransferMode};
use lode_core::LodeError;
use lode_crypto::KeyMaterial;
use lode_store::MemoryClient;
use lode_transfer::{Body, GetOptions, PutOptions, TransferEngine};

fn master(fill: u8) -> KeyMaterial {
    KeyMaterial::symmetric(vec![fill; 32]).unwrap()
}

fn engine_with<'a>(
    client: &'a MemoryClient,
    config: TransferConfig,
    fill: u8,
) -> TransferEngine<'a, MemoryClient> {
    TransferEngine::new(client, config).with_master_key(master(fill))
}

#[test]
fn encrypted_roundtrip_metadata_location() {
    let client = MemoryClient::new();
    let engine = engine_with(&client, TransferConfig::default(), 1);
    let target = ObjectRef::new("bucket", "secret.bin");

    let original = b"plaintext never leaves the process unencrypted".to_vec();
    let result = engine
        .put(&target, Body::from(original.clone()), PutOptions::default())
        .expect("encrypted put");
    assert!(result.encrypted);

    // Stored bytes are ciphertext, one padded block longer than aligned input
    let stored = client.raw_object(&target).unwrap();
    assert_ne!(stored, original);
    assert_eq!(stored.len(), (original.len() / 16) * 16 + 16);

    // Wrapped materials travel as metadata entries
    let metadata = client.object_metadata(&target).unwrap();
    assert!(metadata.contains_key(fields::KEY));
    assert!(metadata.contains_key(fields::IV));
    assert!(metadata.contains_key(fields::MATDESC));
    assert_eq!(
        metadata.get(fields::UNENCRYPTED_LENGTH).cloned(),
        Some(original.len().to_string())
    );
    assert!(metadata.contains_key(fields::UNENCRYPTED_MD5));

    let downloaded = engine.get_to_vec(&target, GetOptions::default()).unwrap();
    assert_eq!(downloaded, original);
}

#[test]
fn encrypted_roundtrip_instruction_file_location() {
    let client = MemoryClient::new();
    let config = TransferConfig {
        materials_location: MaterialsLocation::InstructionFile,
        ..TransferConfig::default()
    };
    let engine = engine_with(&client, config, 2);
    let target = ObjectRef::new("bucket", "secret.bin");

    let original = b"instruction-file materials".to_vec();
    engine
        .put(&target, Body::from(original.clone()), PutOptions::default())
        .unwrap();

    // The sibling instruction object exists; the data object carries no
    // materials metadata
    assert!(client.raw_object(&target.instruction_ref()).is_some());
    let metadata = client.object_metadata(&target).unwrap();
    assert!(!metadata.contains_key(fields::KEY));

    let downloaded = engine.get_to_vec(&target, GetOptions::default()).unwrap();
    assert_eq!(downloaded, original);
}

#[test]
fn materials_location_is_never_auto_discovered() {
    let client = MemoryClient::new();
    let write_config = TransferConfig {
        materials_location: MaterialsLocation::InstructionFile,
        ..TransferConfig::default()
    };
    let target = ObjectRef::new("bucket", "k");

    engine_with(&client, write_config, 3)
        .put(&target, Body::from(b"data".to_vec()), PutOptions::default())
        .unwrap();

    // Reader configured for the metadata location must not find materials
    let reader = engine_with(&client, TransferConfig::default(), 3);
    let err = reader.get_to_vec(&target, GetOptions::default()).unwrap_err();
    assert!(matches!(err, LodeError::MaterialsNotFound(_)));
}

#[test]
fn wrong_master_key_is_key_mismatch() {
    let client = MemoryClient::new();
    let target = ObjectRef::new("bucket", "k");
    let original = b"sensitive payload".to_vec();

    engine_with(&client, TransferConfig::default(), 1)
        .put(&target, Body::from(original.clone()), PutOptions::default())
        .unwrap();

    match engine_with(&client, TransferConfig::default(), 9)
        .get_to_vec(&target, GetOptions::default())
    {
        Err(err) => assert!(
            matches!(err, LodeError::KeyMismatch(_)),
            "an unrelated key must surface as a key mismatch: {err}"
        ),
        // Without an AEAD tag the padding check can pass by accident; the
        // decrypted bytes are still garbage.
        Ok(recovered) => assert_ne!(recovered, original),
    }
}

#[test]
fn range_get_rejected_under_encryption() {
    let client = MemoryClient::new();
    let engine = engine_with(&client, TransferConfig::default(), 1);
    let target = ObjectRef::new("bucket", "k");

    engine
        .put(&target, Body::from(b"0123456789".to_vec()), PutOptions::default())
        .unwrap();

    let options = GetOptions {
        range: Some((0, 4)),
    };
    assert!(engine.get_to_vec(&target, options).is_err());
}

#[test]
fn encrypted_multipart_roundtrip() {
    let client = MemoryClient::new();
    let config = TransferConfig {
        multipart_threshold: 1024,
        multipart_min_part_size: 512,
        ..TransferConfig::default()
    };
    let engine = engine_with(&client, config, 4);
    let target = ObjectRef::new("bucket", "big-secret.bin");

    let original: Vec<u8> = (0u64..10_000).map(|i| (i % 255) as u8).collect();
    let result = engine
        .put(&target, Body::from(original.clone()), PutOptions::default())
        .unwrap();

    assert_eq!(result.mode, TransferMode::Multipart);
    assert!(result.parts >= 2);
    assert_eq!(client.open_sessions(), 0);

    let downloaded = engine.get_to_vec(&target, GetOptions::default()).unwrap();
    assert_eq!(downloaded, original, "encrypted multipart round-trip must be exact");
}

#[test]
fn copy_duplicates_data_and_materials() {
    let client = MemoryClient::new();
    let config = TransferConfig {
        materials_location: MaterialsLocation::InstructionFile,
        ..TransferConfig::default()
    };
    let engine = engine_with(&client, config, 5);
    let src = ObjectRef::new("bucket", "src");
    let dst = ObjectRef::new("bucket", "dst");

    let original = b"copy me, materials and all".to_vec();
    engine
        .put(&src, Body::from(original.clone()), PutOptions::default())
        .unwrap();
    engine.copy(&src, &dst).unwrap();

    let downloaded = engine.get_to_vec(&dst, GetOptions::default()).unwrap();
    assert_eq!(downloaded, original);
}

#[test]
fn streaming_encrypted_put_with_declared_length() {
    let client = MemoryClient::new();
    let engine = engine_with(&client, TransferConfig::default(), 6);
    let target = ObjectRef::new("bucket", "streamed");

    let original = b"streamed plaintext with a declared length".to_vec();
    let body = Body::Reader {
        reader: Box::new(original.as_slice()),
        length: Some(original.len() as u64),
    };
    engine.put(&target, body, PutOptions::default()).unwrap();

    // Declared-length check in the backend proves the predicted ciphertext
    // length matched what the cipher produced
    let downloaded = engine.get_to_vec(&target, GetOptions::default()).unwrap();
    assert_eq!(downloaded, original);
}
