//! lode-transfer: the orchestration layer over lode-crypto and lode-store
//!
//! An outbound write runs: envelope generation (when a master key is
//! configured) → wrap → materials persistence → streaming encryption →
//! transfer planning → direct put or multipart session. An inbound read
//! reverses it: materials retrieval → unwrap → streaming decryption.
//!
//! No cross-step atomicity is provided between the materials write and the
//! data write; a crash between the two leaves inconsistent state that this
//! layer documents rather than repairs.

pub mod engine;
pub mod materials;
pub mod multipart;
pub mod planner;

pub use engine::{Body, GetOptions, PutOptions, PutResult, TransferEngine};
pub use multipart::{with_multipart, MultipartUpload};
