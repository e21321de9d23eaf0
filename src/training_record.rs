//! Validation and outcome-labeling of supplemental training records.
//!
//! Agents emit fixed-size binary records during a game, hex-encoded on the wire.
//! The final byte of each record is a win/draw/loss placeholder that only becomes
//! known when the game ends; normalization decodes the payload, enforces the size
//! gate and patches that byte. Everything before the final byte passes through
//! verbatim.

use crate::error::CorruptRecordError;

/// Exact size of a valid training record, in bytes.
pub const TRAINING_RECORD_LEN: usize = 8276;

/// Wire encoding of a normalized outcome: `-1` wraps to `255`, `0` and `1` map to
/// themselves.
pub fn outcome_byte(outcome: i8) -> u8 {
    outcome as u8
}

/// Validate a decoded record and patch its outcome byte.
///
/// # Errors
/// [`CorruptRecordError::WrongLength`] when `raw` is not exactly
/// [`TRAINING_RECORD_LEN`] bytes; `raw` is never partially mutated.
pub fn normalize_record(raw: &[u8], outcome: i8) -> Result<Vec<u8>, CorruptRecordError> {
    if raw.len() != TRAINING_RECORD_LEN {
        return Err(CorruptRecordError::WrongLength { got: raw.len() });
    }
    let mut fixed = raw.to_vec();
    fixed[TRAINING_RECORD_LEN - 1] = outcome_byte(outcome);
    Ok(fixed)
}

/// Decode a hex payload as received from an agent, then normalize it.
///
/// # Errors
/// [`CorruptRecordError::InvalidHex`] on a malformed payload, otherwise the same
/// size gate as [`normalize_record`].
pub fn normalize_hex_record(payload: &str, outcome: i8) -> Result<Vec<u8>, CorruptRecordError> {
    let raw = hex::decode(payload.trim())?;
    normalize_record(&raw, outcome)
}
