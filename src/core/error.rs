//! Core domain errors (parsing and validation).
//!
//! Bounded and stable: these represent refusal states for malformed domain
//! input, not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("record key `{raw}` is invalid: {reason}")]
    RecordKey { raw: String, reason: String },
    #[error("space name `{raw}` is invalid: {reason}")]
    Space { raw: String, reason: String },
    #[error("user id `{raw}` is invalid: {reason}")]
    User { raw: String, reason: String },
    #[error("guest id `{raw}` is invalid: {reason}")]
    Guest { raw: String, reason: String },
}

/// Record content that violates a size or shape limit.
#[derive(Debug, Error, Clone)]
#[error("record for key `{key}` rejected: {reason}")]
pub struct InvalidRecord {
    pub key: String,
    pub reason: String,
}

/// Canonical error enum for the core layer.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    InvalidRecord(#[from] InvalidRecord),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Pure domain/input failures; retrying the same input cannot help.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        // Validation happens before any state is touched.
        Effect::None
    }
}
