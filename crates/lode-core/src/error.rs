use thiserror::Error;

pub type LodeResult<T> = Result<T, LodeError>;

#[derive(Debug, Error)]
pub enum LodeError {
    /// Symmetric master key is not 16, 24, or 32 bytes, or the asymmetric
    /// half needed for the requested operation is missing.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// No exact or estimated content length was available where a transfer
    /// decision required one.
    #[error("missing size hint: {0}")]
    MissingSizeHint(String),

    /// Materials location tag not recognized.
    #[error("invalid materials location: {0:?}")]
    InvalidMaterialsLocation(String),

    /// Unwrap or decrypt failed in a way consistent with the wrong master
    /// key. Kept distinct from generic corruption so callers can present an
    /// actionable message.
    #[error("key mismatch: {0}")]
    KeyMismatch(String),

    /// Decryption was requested but the wrapped key or IV could not be found
    /// at the configured location.
    #[error("encryption materials not found: {0}")]
    MaterialsNotFound(String),

    /// Operation attempted on a multipart session already in a terminal
    /// state.
    #[error("multipart session error: {0}")]
    Session(String),

    /// Remote-service error, passed through unmodified. Retry and backoff
    /// are the transport's responsibility.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LodeError {
    /// Recover a `LodeError` smuggled through an `io::Error` by a reader
    /// adapter. Non-lode io errors come back as `Io`.
    pub fn from_io(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|e| e.is::<LodeError>()) {
            match err.into_inner().map(|e| e.downcast::<LodeError>()) {
                Some(Ok(inner)) => *inner,
                Some(Err(e)) => LodeError::Io(std::io::Error::other(e)),
                None => LodeError::Io(std::io::Error::other("lost io error payload")),
            }
        } else {
            LodeError::Io(err)
        }
    }

    /// Wrap this error into an `io::Error` so it can cross a `Read` boundary
    /// and be recovered by `from_io` on the other side.
    pub fn into_io(self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, self)
    }
}
