//! The error taxonomy surfaced at every public boundary (§7).
//!
//! Validation errors never leave a partial mutation behind: every
//! public operation validates its arguments before touching the
//! entity store or node store.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpatialError {
    #[error("coordinate is negative, NaN, or infinite")]
    InvalidCoordinate,

    #[error("level exceeds the configured max_depth, or is negative")]
    InvalidLevel,

    #[error("degenerate volume (zero extent, non-normalizable direction, max <= min)")]
    InvalidVolume,

    #[error("configuration value must be positive")]
    InvalidConfig,

    #[error("entity id is not currently live in this index")]
    UnknownEntity,

    #[error("entity id is already live in this index")]
    DuplicateEntity,

    #[error("coordinate exceeds 2^21 at the target level")]
    Overflow,
}

pub type Result<T> = core::result::Result<T, SpatialError>;

impl From<sfc3d::morton::MortonError> for SpatialError {
    fn from(_: sfc3d::morton::MortonError) -> Self {
        SpatialError::Overflow
    }
}

impl From<sfc3d::tetree::TetreeError> for SpatialError {
    fn from(e: sfc3d::tetree::TetreeError) -> Self {
        use sfc3d::tetree::TetreeError::*;
        match e {
            Overflow => SpatialError::Overflow,
            InvalidLevel => SpatialError::InvalidLevel,
            InvalidLocalIndex | InvalidFace => SpatialError::InvalidCoordinate,
            InvalidType => SpatialError::InvalidCoordinate,
        }
    }
}

/// A per-entity failure recorded by a bulk operation rather than
/// aborting the whole call (§7, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkEntityError<Id> {
    pub id: Option<Id>,
    pub index: usize,
    pub error: SpatialError,
}
