//! Integration test: plaintext put → get round-trips over the in-memory
//! backend, across both transfer modes.

use lode_core::config::TransferConfig;
use lode_core::types::{ObjectRef, TransferMode};
use lode_store::MemoryClient;
use lode_transfer::{Body, GetOptions, PutOptions, TransferEngine};

fn small_multipart_config() -> TransferConfig {
    TransferConfig {
        multipart_threshold: 1024,
        multipart_min_part_size: 256,
        multipart_max_parts: 10_000,
        ..TransferConfig::default()
    }
}

#[test]
fn roundtrip_direct_small_object() {
    let client = MemoryClient::new();
    let engine = TransferEngine::new(&client, TransferConfig::default());
    let target = ObjectRef::new("bucket", "small.txt");

    let original = b"hello world, this is a small payload".to_vec();
    let result = engine
        .put(&target, Body::from(original.clone()), PutOptions::default())
        .expect("put should succeed");

    assert_eq!(result.mode, TransferMode::Direct);
    assert_eq!(result.parts, 0);
    assert!(!result.encrypted);

    let downloaded = engine.get_to_vec(&target, GetOptions::default()).unwrap();
    assert_eq!(downloaded, original, "downloaded bytes must match original");
}

#[test]
fn roundtrip_multipart_large_object() {
    let client = MemoryClient::new();
    let engine = TransferEngine::new(&client, small_multipart_config());
    let target = ObjectRef::new("bucket", "large.bin");

    // 8 KiB of pseudo-random binary data, well above the 1 KiB threshold
    let original: Vec<u8> = (0u64..8192).map(|i| (i.wrapping_mul(31) ^ (i >> 2)) as u8).collect();
    let result = engine
        .put(&target, Body::from(original.clone()), PutOptions::default())
        .expect("multipart put should succeed");

    assert_eq!(result.mode, TransferMode::Multipart);
    assert!(
        result.parts >= 2,
        "8 KiB over a 256-byte floor should produce multiple parts, got {}",
        result.parts
    );
    assert_eq!(client.open_sessions(), 0, "session must be closed");

    let downloaded = engine.get_to_vec(&target, GetOptions::default()).unwrap();
    assert_eq!(downloaded, original, "multipart round-trip must be exact");
}

#[test]
fn threshold_is_inclusive_on_the_direct_side() {
    let client = MemoryClient::new();
    let config = small_multipart_config();
    let engine = TransferEngine::new(&client, config.clone());

    let at_threshold = vec![7u8; config.multipart_threshold as usize];
    let result = engine
        .put(
            &ObjectRef::new("bucket", "at"),
            Body::from(at_threshold),
            PutOptions::default(),
        )
        .unwrap();
    assert_eq!(result.mode, TransferMode::Direct);

    let over_threshold = vec![7u8; config.multipart_threshold as usize + 1];
    let result = engine
        .put(
            &ObjectRef::new("bucket", "over"),
            Body::from(over_threshold),
            PutOptions::default(),
        )
        .unwrap();
    assert_eq!(result.mode, TransferMode::Multipart);
}

#[test]
fn streaming_body_without_length_requires_size_hint() {
    let client = MemoryClient::new();
    let engine = TransferEngine::new(&client, TransferConfig::default());

    let body = Body::Reader {
        reader: Box::new(&b"streamed"[..]),
        length: None,
    };
    let err = engine
        .put(&ObjectRef::new("bucket", "k"), body, PutOptions::default())
        .unwrap_err();
    assert!(matches!(err, lode_core::LodeError::MissingSizeHint(_)));
}

#[test]
fn force_single_request_skips_chunking() {
    let client = MemoryClient::new();
    let config = TransferConfig {
        force_single_request: true,
        ..small_multipart_config()
    };
    let engine = TransferEngine::new(&client, config);

    let large = vec![1u8; 16 * 1024];
    let result = engine
        .put(
            &ObjectRef::new("bucket", "forced"),
            Body::from(large.clone()),
            PutOptions::default(),
        )
        .unwrap();
    assert_eq!(result.mode, TransferMode::Direct);

    let downloaded = engine
        .get_to_vec(&ObjectRef::new("bucket", "forced"), GetOptions::default())
        .unwrap();
    assert_eq!(downloaded, large);
}

#[test]
fn range_get_of_plaintext_object() {
    let client = MemoryClient::new();
    let engine = TransferEngine::new(&client, TransferConfig::default());
    let target = ObjectRef::new("bucket", "ranged");

    engine
        .put(&target, Body::from(b"hello world".to_vec()), PutOptions::default())
        .unwrap();

    let options = GetOptions {
        range: Some((6, 11)),
    };
    let downloaded = engine.get_to_vec(&target, options).unwrap();
    assert_eq!(downloaded, b"world");
}

#[test]
fn user_metadata_travels_with_the_write() {
    let client = MemoryClient::new();
    let engine = TransferEngine::new(&client, TransferConfig::default());
    let target = ObjectRef::new("bucket", "tagged");

    let mut options = PutOptions::default();
    options.metadata.insert("x-team".into(), "transfers".into());
    engine
        .put(&target, Body::from(b"data".to_vec()), options)
        .unwrap();

    let metadata = client.object_metadata(&target).unwrap();
    assert_eq!(metadata.get("x-team").map(String::as_str), Some("transfers"));
}
