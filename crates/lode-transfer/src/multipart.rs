//! Multipart session lifecycle
//!
//! A session moves monotonically `Open → Completed` or `Open → Aborted`;
//! both are terminal and nothing is valid afterwards. A session is owned by
//! exactly one logical upload: it is deliberately not shareable across
//! threads without external synchronization.
//!
//! [`with_multipart`] is the scoped-acquisition form: it opens the session,
//! runs the caller's body, and guarantees completion on the normal exit path
//! or abort on the error path, so no session is left open after a failure.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, warn};

use lode_core::types::{ObjectRef, Part};
use lode_core::{LodeError, LodeResult};
use lode_store::client::{ObjectClient, PutRequest, PutResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Completed,
    Aborted,
}

/// One chunked-upload session against the storage collaborator.
pub struct MultipartUpload<'a, C: ObjectClient + ?Sized> {
    client: &'a C,
    target: ObjectRef,
    session_id: String,
    /// Uploaded parts keyed by number; assembly follows key order, never
    /// upload order. A re-used number overwrites its predecessor.
    parts: BTreeMap<u32, Part>,
    state: SessionState,
}

impl<'a, C: ObjectClient + ?Sized> MultipartUpload<'a, C> {
    /// Open a session. The request's metadata and options apply to the
    /// assembled object.
    pub fn open(client: &'a C, request: PutRequest) -> LodeResult<Self> {
        let target = request.target.clone();
        let session_id = client.create_multipart(request)?;
        debug!(bucket = %target.bucket, key = %target.key, session_id, "multipart session opened");
        Ok(Self {
            client,
            target,
            session_id,
            parts: BTreeMap::new(),
            state: SessionState::Open,
        })
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Parts recorded so far, in assembly (number) order.
    pub fn parts(&self) -> Vec<Part> {
        self.parts.values().cloned().collect()
    }

    /// Upload one chunk. An omitted `number` gets the next sequential
    /// integer, starting at 1. Explicit numbers may arrive out of order or
    /// repeat; a repeat overwrites (last write wins at the storage layer).
    pub fn add_part(&mut self, data: Bytes, number: Option<u32>) -> LodeResult<Part> {
        self.check_open("add_part")?;
        let number = match number {
            Some(0) => {
                return Err(LodeError::Session(
                    "part numbers start at 1; got 0".into(),
                ))
            }
            Some(n) => n,
            None => self.parts.keys().next_back().map_or(1, |n| n + 1),
        };
        let size = data.len() as u64;
        let etag = self
            .client
            .upload_part(&self.target, &self.session_id, number, data)?;
        let part = Part { number, etag, size };
        debug!(
            session_id = %self.session_id,
            number,
            size,
            "part uploaded"
        );
        self.parts.insert(number, part.clone());
        Ok(part)
    }

    /// Assemble the uploaded parts into the target object. Terminal on
    /// success; on failure the session stays open so [`abort`] remains
    /// possible.
    ///
    /// [`abort`]: MultipartUpload::abort
    pub fn complete(&mut self) -> LodeResult<PutResponse> {
        self.check_open("complete")?;
        let parts: Vec<Part> = self.parts.values().cloned().collect();
        let response = self
            .client
            .complete_multipart(&self.target, &self.session_id, &parts)?;
        self.state = SessionState::Completed;
        debug!(
            session_id = %self.session_id,
            parts = parts.len(),
            etag = %response.etag,
            "multipart session completed"
        );
        Ok(response)
    }

    /// Abort the session. Idempotent: a no-op once the session is already
    /// completed or aborted.
    pub fn abort(&mut self) -> LodeResult<()> {
        if self.state != SessionState::Open {
            return Ok(());
        }
        self.client
            .abort_multipart(&self.target, &self.session_id)?;
        self.state = SessionState::Aborted;
        debug!(session_id = %self.session_id, "multipart session aborted");
        Ok(())
    }

    fn check_open(&self, operation: &str) -> LodeResult<()> {
        match self.state {
            SessionState::Open => Ok(()),
            state => Err(LodeError::Session(format!(
                "{operation} on a {state:?} session ({})",
                self.session_id
            ))),
        }
    }
}

/// Scoped multipart session: open, run `body`, then complete. Any error out
/// of the body (or out of completion itself) triggers an abort before the
/// error propagates.
///
/// When the abort also fails, the original error stays primary: the abort
/// failure is logged at `warn` and folded into the returned error's context.
pub fn with_multipart<C, T, F>(
    client: &C,
    request: PutRequest,
    body: F,
) -> LodeResult<(T, PutResponse)>
where
    C: ObjectClient + ?Sized,
    F: FnOnce(&mut MultipartUpload<'_, C>) -> LodeResult<T>,
{
    let mut upload = MultipartUpload::open(client, request)?;
    let result = body(&mut upload).and_then(|value| {
        let response = upload.complete()?;
        Ok((value, response))
    });
    match result {
        Ok(done) => Ok(done),
        Err(primary) => {
            if let Err(abort_err) = upload.abort() {
                warn!(
                    session_id = %upload.session_id,
                    error = %abort_err,
                    "abort after failed multipart upload also failed; session may linger"
                );
                return Err(LodeError::Other(anyhow::Error::new(primary).context(
                    format!("multipart abort also failed: {abort_err}"),
                )));
            }
            Err(primary)
        }
    }
}
