//! Transfer-mode and part-size decisions
//!
//! Pure functions over size estimates and configured bounds; nothing here
//! touches the network. The system never guesses an unbounded size: when a
//! chunking decision is required and no estimate exists, that is an error.

use lode_core::config::TransferConfig;
use lode_core::types::{TransferMode, TransferPlan};
use lode_core::{LodeError, LodeResult};

/// `Direct` iff `force_single` is set or the estimate fits the threshold.
/// The threshold is inclusive on the `Direct` side.
pub fn decide(
    size_estimate: Option<u64>,
    threshold: u64,
    force_single: bool,
) -> LodeResult<TransferMode> {
    if force_single {
        return Ok(TransferMode::Direct);
    }
    match size_estimate {
        Some(estimate) if estimate <= threshold => Ok(TransferMode::Direct),
        Some(_) => Ok(TransferMode::Multipart),
        None => Err(LodeError::MissingSizeHint(
            "a transfer-mode decision requires an exact or estimated content length".into(),
        )),
    }
}

/// Chunk size bounding the part count from above while respecting the
/// configured minimum: `max(ceil(estimate / max_parts), min_part_size)`.
pub fn part_size(size_estimate: u64, min_part_size: u64, max_parts: u64) -> u64 {
    size_estimate.div_ceil(max_parts).max(min_part_size)
}

/// Compose [`decide`] and [`part_size`] into a full plan.
pub fn plan(size_estimate: Option<u64>, config: &TransferConfig) -> LodeResult<TransferPlan> {
    let mode = decide(
        size_estimate,
        config.multipart_threshold,
        config.force_single_request,
    )?;
    let part_size = match (mode, size_estimate) {
        (TransferMode::Multipart, Some(estimate)) => Some(part_size(
            estimate,
            config.multipart_min_part_size,
            config.multipart_max_parts,
        )),
        _ => None,
    };
    Ok(TransferPlan { mode, part_size })
}
