use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LodeError;

/// String-valued user metadata attached to an object write.
pub type ObjectMeta = BTreeMap<String, String>;

/// Metadata / instruction-file field names for persisted encryption
/// materials.
pub mod fields {
    /// Base64 of the wrapped (master-key-encrypted) data key.
    pub const KEY: &str = "x-amz-key";
    /// Base64 of the wrapped IV.
    pub const IV: &str = "x-amz-iv";
    /// Opaque materials description string.
    pub const MATDESC: &str = "x-amz-matdesc";
    /// Plaintext length hint, metadata location only.
    pub const UNENCRYPTED_LENGTH: &str = "x-amz-unencrypted-content-length";
    /// Plaintext MD5 hint, metadata location only.
    pub const UNENCRYPTED_MD5: &str = "x-amz-unencrypted-content-md5";
}

/// Names one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    /// Specific object version, when the bucket is versioned.
    pub version_id: Option<String>,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    /// Key of the sibling instruction object carrying wrapped materials.
    pub fn instruction_ref(&self) -> ObjectRef {
        ObjectRef {
            bucket: self.bucket.clone(),
            key: instruction_key(&self.key),
            version_id: None,
        }
    }
}

/// Append the instruction-file suffix to an object key.
pub fn instruction_key(key: &str) -> String {
    format!("{key}.instruction")
}

/// Where wrapped key material is persisted. Writer and reader must agree
/// out of band; the location is never auto-discovered on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialsLocation {
    /// Inline, as string-valued metadata entries on the data object.
    Metadata,
    /// A separate `<key>.instruction` sibling object.
    InstructionFile,
}

impl FromStr for MaterialsLocation {
    type Err = LodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata" => Ok(MaterialsLocation::Metadata),
            "instruction_file" => Ok(MaterialsLocation::InstructionFile),
            other => Err(LodeError::InvalidMaterialsLocation(other.to_string())),
        }
    }
}

/// How a payload travels to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// One round trip.
    Direct,
    /// Chunked multipart session.
    Multipart,
}

/// Derived transfer decision. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    pub mode: TransferMode,
    /// Chunk size in bytes; present only for `Multipart`.
    pub part_size: Option<u64>,
}

/// One uploaded chunk of a multipart session. Parts are assembled
/// server-side strictly by `number`, regardless of upload order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// 1-based part number.
    pub number: u32,
    /// Opaque receipt issued by the store for this part.
    pub etag: String,
    /// Uploaded byte count.
    pub size: u64,
}
