//! lode-store: the storage-client collaborator contract and an in-memory
//! backend for tests and local development.
//!
//! The transfer layer treats the store as opaque: it only ever speaks the
//! [`ObjectClient`] trait. Transport concerns (retry, backoff, TLS) belong
//! to the implementation behind the trait, never to the callers.

pub mod client;
pub mod memory;

pub use client::{
    CopyRequest, GetRequest, HeadResponse, ObjectClient, PutRequest, PutResponse,
};
pub use memory::MemoryClient;
