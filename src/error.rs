//! Error taxonomy for the league core.
//!
//! Each kind maps to a distinct recovery policy:
//! - [`CorruptRecordError`]: drop the offending training record, keep the match result.
//! - [`MatchAbortedError`]: the match yields no usable result and must not be reported,
//!   but both agent handles are still terminated.
//! - [`UnknownOpponentError`]: the worker iteration is logged and skipped.
//! - [`AgentTransportError`]: surfaced by [`AgentHandle`](crate::agent_interface::AgentHandle)
//!   implementations; a `Terminated` value is what turns into a [`MatchAbortedError`].
//!
//! Persistence failures stay plain [`anyhow::Error`]s and are retried by the worker on
//! its next iteration.

use thiserror::Error;

use crate::training_record::TRAINING_RECORD_LEN;

/// A supplemental training payload failed validation.
#[derive(Debug, Error)]
pub enum CorruptRecordError {
    /// Decoded payload is not exactly [`TRAINING_RECORD_LEN`] bytes.
    #[error("wrong size for training record: {got} bytes (expected {TRAINING_RECORD_LEN})")]
    WrongLength {
        /// Length of the rejected payload.
        got: usize,
    },
    /// Payload was not valid hex.
    #[error("training record is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A match could not run to completion because an agent stopped responding.
#[derive(Debug, Error)]
#[error("match aborted: agent '{agent}' became unresponsive")]
pub struct MatchAbortedError {
    /// Id of the agent that failed.
    pub agent: String,
    /// Underlying transport condition.
    #[source]
    pub source: AgentTransportError,
}

/// The live tuning table and the static roster disagree about an opponent id.
#[derive(Debug, Error)]
pub enum UnknownOpponentError {
    /// The id has live tuning but no static template.
    #[error("no static template for agent '{0}'")]
    MissingTemplate(String),
    /// The id has a static template but no live tuning entry.
    #[error("no live tuning entry for agent '{0}'")]
    MissingTuning(String),
    /// Every eligible opponent has selection weight 0 (or the tables share no id).
    #[error("no opponent eligible for selection")]
    NoneEligible,
}

/// Failure reported by an [`AgentHandle`](crate::agent_interface::AgentHandle) request.
///
/// `Terminated` is the distinguished "process died under us" condition; everything
/// else is an ordinary transport problem.
#[derive(Debug, Error)]
pub enum AgentTransportError {
    /// The agent process terminated unexpectedly.
    #[error("agent terminated unexpectedly")]
    Terminated,
    /// The request failed without the agent dying.
    #[error("agent transport error: {0}")]
    Request(String),
}
