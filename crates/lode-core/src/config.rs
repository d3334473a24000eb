use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LodeResult;
use crate::types::MaterialsLocation;

/// Transfer-layer configuration (loadable from lodestore.toml).
///
/// An immutable value threaded explicitly through every operation; there is
/// no process-wide default lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes above which a write switches to a chunked multipart session.
    /// Inclusive on the direct side: a payload of exactly this size still
    /// goes through a single round trip.
    pub multipart_threshold: u64,
    /// Lower bound per chunk, in bytes.
    pub multipart_min_part_size: u64,
    /// Service-imposed ceiling on chunk count.
    pub multipart_max_parts: u64,
    /// Force single-request transfers regardless of size.
    pub force_single_request: bool,
    /// Server-side encryption algorithm tag forwarded with each write
    /// (e.g. "AES256"), if any.
    pub server_side_encryption: Option<String>,
    /// Default location for wrapped key material.
    pub materials_location: MaterialsLocation,
    /// Default materials description string persisted alongside the
    /// wrapped key.
    pub materials_descriptor: String,
}

impl TransferConfig {
    /// Load from a TOML file. Absent entries take their defaults.
    pub fn load(path: impl AsRef<Path>) -> LodeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("config parse: {e}"))?;
        Ok(config)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: 16 * 1024 * 1024,
            multipart_min_part_size: 5 * 1024 * 1024,
            multipart_max_parts: 10_000,
            force_single_request: false,
            server_side_encryption: None,
            materials_location: MaterialsLocation::Metadata,
            materials_descriptor: "{}".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
multipart_threshold = 33554432
multipart_min_part_size = 10485760
multipart_max_parts = 1000
force_single_request = false
server_side_encryption = "AES256"
materials_location = "instruction_file"
materials_descriptor = "{\"team\":\"ops\"}"
"#;
        let config: TransferConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.multipart_threshold, 32 * 1024 * 1024);
        assert_eq!(config.multipart_min_part_size, 10 * 1024 * 1024);
        assert_eq!(config.multipart_max_parts, 1000);
        assert_eq!(config.server_side_encryption.as_deref(), Some("AES256"));
        assert_eq!(
            config.materials_location,
            MaterialsLocation::InstructionFile
        );
        assert_eq!(config.materials_descriptor, "{\"team\":\"ops\"}");
    }

    #[test]
    fn test_parse_defaults() {
        let config: TransferConfig = toml::from_str("").unwrap();

        assert_eq!(config.multipart_threshold, 16 * 1024 * 1024);
        assert_eq!(config.multipart_min_part_size, 5_242_880);
        assert_eq!(config.multipart_max_parts, 10_000);
        assert!(!config.force_single_request);
        assert!(config.server_side_encryption.is_none());
        assert_eq!(config.materials_location, MaterialsLocation::Metadata);
        assert_eq!(config.materials_descriptor, "{}");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
multipart_threshold = 1048576
"#;
        let config: TransferConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.multipart_threshold, 1024 * 1024);
        // Defaults
        assert_eq!(config.multipart_min_part_size, 5_242_880);
        assert_eq!(config.materials_location, MaterialsLocation::Metadata);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = TransferConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: TransferConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.multipart_threshold, parsed.multipart_threshold);
        assert_eq!(config.materials_location, parsed.materials_location);
        assert_eq!(config.materials_descriptor, parsed.materials_descriptor);
    }
}
