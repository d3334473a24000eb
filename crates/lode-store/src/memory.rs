//! In-memory `ObjectClient` used by the integration tests and local
//! development. Objects and multipart sessions live in a mutex-guarded map;
//! etags are hex MD5 of the stored bytes, matching common store behavior.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Mutex;

use bytes::Bytes;
use md5::{Digest, Md5};
use uuid::Uuid;

use lode_core::types::{ObjectMeta, ObjectRef, Part};
use lode_core::{LodeError, LodeResult};

use crate::client::{
    CopyRequest, GetRequest, HeadResponse, ObjectClient, PutRequest, PutResponse,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: ObjectMeta,
    etag: String,
}

#[derive(Debug)]
struct Session {
    target: ObjectRef,
    metadata: ObjectMeta,
    /// Staged chunks by number; duplicate numbers overwrite (last write
    /// wins, as at the storage layer).
    parts: BTreeMap<u32, (Bytes, String)>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<(String, String), StoredObject>,
    sessions: HashMap<String, Session>,
}

/// Mutex-guarded in-memory object store.
#[derive(Debug, Default)]
pub struct MemoryClient {
    inner: Mutex<Inner>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored bytes, bypassing any decryption. Test helper.
    pub fn raw_object(&self, target: &ObjectRef) -> Option<Vec<u8>> {
        let inner = self.lock();
        inner
            .objects
            .get(&object_key(target))
            .map(|o| o.data.to_vec())
    }

    /// Stored metadata map. Test helper.
    pub fn object_metadata(&self, target: &ObjectRef) -> Option<ObjectMeta> {
        let inner = self.lock();
        inner
            .objects
            .get(&object_key(target))
            .map(|o| o.metadata.clone())
    }

    /// Count of multipart sessions still open. Test helper.
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn object_key(target: &ObjectRef) -> (String, String) {
    (target.bucket.clone(), target.key.clone())
}

fn etag_of(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

fn not_found(target: &ObjectRef) -> LodeError {
    LodeError::Storage(format!("NoSuchKey: {}/{}", target.bucket, target.key))
}

impl ObjectClient for MemoryClient {
    fn put_object(&self, request: PutRequest, body: &mut dyn Read) -> LodeResult<PutResponse> {
        let mut data = Vec::new();
        body.read_to_end(&mut data)?;
        if let Some(declared) = request.content_length {
            if declared != data.len() as u64 {
                return Err(LodeError::Storage(format!(
                    "IncompleteBody: declared {declared}, received {}",
                    data.len()
                )));
            }
        }
        let etag = etag_of(&data);
        let mut inner = self.lock();
        inner.objects.insert(
            object_key(&request.target),
            StoredObject {
                data: Bytes::from(data),
                metadata: request.metadata,
                etag: etag.clone(),
            },
        );
        Ok(PutResponse {
            etag,
            version_id: None,
        })
    }

    fn get_object(&self, request: GetRequest) -> LodeResult<Box<dyn Read + Send>> {
        let inner = self.lock();
        let object = inner
            .objects
            .get(&object_key(&request.source))
            .ok_or_else(|| not_found(&request.source))?;
        let data = match request.range {
            None => object.data.clone(),
            Some((start, end)) => {
                let len = object.data.len() as u64;
                if start >= len || end > len || start >= end {
                    return Err(LodeError::Storage(format!(
                        "InvalidRange: {start}..{end} of {len}"
                    )));
                }
                object.data.slice(start as usize..end as usize)
            }
        };
        Ok(Box::new(std::io::Cursor::new(data.to_vec())))
    }

    fn delete_object(&self, target: &ObjectRef) -> LodeResult<()> {
        // Deleting a missing key is not an error, matching store semantics.
        self.lock().objects.remove(&object_key(target));
        Ok(())
    }

    fn copy_object(&self, request: CopyRequest) -> LodeResult<PutResponse> {
        let mut inner = self.lock();
        let source = inner
            .objects
            .get(&object_key(&request.source))
            .ok_or_else(|| not_found(&request.source))?
            .clone();
        let copied = StoredObject {
            metadata: request.metadata.unwrap_or_else(|| source.metadata.clone()),
            ..source
        };
        let etag = copied.etag.clone();
        inner.objects.insert(object_key(&request.dest), copied);
        Ok(PutResponse {
            etag,
            version_id: None,
        })
    }

    fn head_object(&self, target: &ObjectRef) -> LodeResult<HeadResponse> {
        let inner = self.lock();
        let object = inner
            .objects
            .get(&object_key(target))
            .ok_or_else(|| not_found(target))?;
        Ok(HeadResponse {
            metadata: object.metadata.clone(),
            content_length: object.data.len() as u64,
            etag: object.etag.clone(),
        })
    }

    fn create_multipart(&self, request: PutRequest) -> LodeResult<String> {
        let id = Uuid::new_v4().to_string();
        self.lock().sessions.insert(
            id.clone(),
            Session {
                target: request.target,
                metadata: request.metadata,
                parts: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn upload_part(
        &self,
        target: &ObjectRef,
        session_id: &str,
        number: u32,
        data: Bytes,
    ) -> LodeResult<String> {
        if number == 0 {
            return Err(LodeError::Storage("InvalidPartNumber: 0".into()));
        }
        let mut inner = self.lock();
        let session = inner.sessions.get_mut(session_id).ok_or_else(|| {
            LodeError::Storage(format!(
                "NoSuchUpload: {session_id} for {}/{}",
                target.bucket, target.key
            ))
        })?;
        let etag = etag_of(&data);
        session.parts.insert(number, (data, etag.clone()));
        Ok(etag)
    }

    fn complete_multipart(
        &self,
        target: &ObjectRef,
        session_id: &str,
        parts: &[Part],
    ) -> LodeResult<PutResponse> {
        let mut inner = self.lock();
        let session = inner
            .sessions
            .remove(session_id)
            .ok_or_else(|| {
                LodeError::Storage(format!(
                    "NoSuchUpload: {session_id} for {}/{}",
                    target.bucket, target.key
                ))
            })?;

        // Assembly is strictly by number, whatever the upload order was.
        let mut data = Vec::new();
        for part in parts {
            let (bytes, stored_etag) = session.parts.get(&part.number).ok_or_else(|| {
                LodeError::Storage(format!("InvalidPart: number {} not uploaded", part.number))
            })?;
            if stored_etag != &part.etag {
                return Err(LodeError::Storage(format!(
                    "InvalidPart: etag mismatch on part {}",
                    part.number
                )));
            }
            data.extend_from_slice(bytes);
        }

        let etag = format!("{}-{}", etag_of(&data), parts.len());
        inner.objects.insert(
            object_key(&session.target),
            StoredObject {
                data: Bytes::from(data),
                metadata: session.metadata,
                etag: etag.clone(),
            },
        );
        Ok(PutResponse {
            etag,
            version_id: None,
        })
    }

    fn abort_multipart(&self, target: &ObjectRef, session_id: &str) -> LodeResult<()> {
        let mut inner = self.lock();
        if inner.sessions.remove(session_id).is_none() {
            tracing::debug!(
                bucket = %target.bucket,
                key = %target.key,
                session_id,
                "abort of unknown multipart session ignored"
            );
        }
        Ok(())
    }
}
