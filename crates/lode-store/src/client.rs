//! The storage-client contract consumed by the transfer layer
//!
//! Synchronous and blocking: every method either completes a round trip or
//! returns an error. Remote-service failures pass through as
//! [`LodeError::Storage`] unmodified; retry/backoff is the implementation's
//! concern, not the caller's.

use std::io::Read;

use bytes::Bytes;

use lode_core::types::{ObjectMeta, ObjectRef, Part};
use lode_core::LodeResult;

/// Options for a single-object write.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub target: ObjectRef,
    pub metadata: ObjectMeta,
    /// Declared content length, when known up front.
    pub content_length: Option<u64>,
    /// Server-side encryption algorithm tag, forwarded verbatim.
    pub server_side_encryption: Option<String>,
}

impl PutRequest {
    pub fn new(target: ObjectRef) -> Self {
        Self {
            target,
            metadata: ObjectMeta::new(),
            content_length: None,
            server_side_encryption: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PutResponse {
    pub etag: String,
    pub version_id: Option<String>,
}

/// Options for a read. `range` is a half-open byte interval.
#[derive(Debug, Clone)]
pub struct GetRequest {
    pub source: ObjectRef,
    pub range: Option<(u64, u64)>,
}

impl GetRequest {
    pub fn new(source: ObjectRef) -> Self {
        Self {
            source,
            range: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub source: ObjectRef,
    pub dest: ObjectRef,
    /// Replacement metadata; `None` keeps the source object's metadata.
    pub metadata: Option<ObjectMeta>,
}

#[derive(Debug, Clone)]
pub struct HeadResponse {
    pub metadata: ObjectMeta,
    pub content_length: u64,
    pub etag: String,
}

/// The object-store collaborator. Implementations must assemble multipart
/// sessions strictly by part number, with last-write-wins for duplicate
/// numbers.
pub trait ObjectClient {
    fn put_object(&self, request: PutRequest, body: &mut dyn Read) -> LodeResult<PutResponse>;

    fn get_object(&self, request: GetRequest) -> LodeResult<Box<dyn Read + Send>>;

    fn delete_object(&self, target: &ObjectRef) -> LodeResult<()>;

    fn copy_object(&self, request: CopyRequest) -> LodeResult<PutResponse>;

    fn head_object(&self, target: &ObjectRef) -> LodeResult<HeadResponse>;

    /// Open a multipart session; returns the opaque session id.
    fn create_multipart(&self, request: PutRequest) -> LodeResult<String>;

    /// Upload one chunk; returns its etag receipt.
    fn upload_part(
        &self,
        target: &ObjectRef,
        session_id: &str,
        number: u32,
        data: Bytes,
    ) -> LodeResult<String>;

    /// Assemble the session into one object from `parts`, ordered by number.
    fn complete_multipart(
        &self,
        target: &ObjectRef,
        session_id: &str,
        parts: &[Part],
    ) -> LodeResult<PutResponse>;

    fn abort_multipart(&self, target: &ObjectRef, session_id: &str) -> LodeResult<()>;
}
