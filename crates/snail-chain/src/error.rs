#![forbid(unsafe_code)]

use snail_db::store::StoreError;
use snail_types::{Hash256, Height};
use thiserror::Error;

use crate::engine::EngineError;

/// Failures of snail block construction (header factory and assemblers).
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid parent {parent:?}: not resolvable as a snail block")]
    InvalidParent { parent: Hash256 },

    #[error("stale fast number {fast_number}: head already aggregates up to {last}")]
    StaleFastNumber { fast_number: u64, last: u64 },

    #[error("non-monotonic start fast number {start}: head already aggregates up to {last}")]
    NonMonotonicFastNumber { start: u64, last: u64 },

    #[error("insufficient fruits: got {got}, minimum {minimum}")]
    InsufficientFruits { got: u64, minimum: u64 },

    #[error("fruit count mismatch: expected {expected}, got {got}")]
    FruitCountMismatch { expected: u64, got: u64 },

    #[error("chain has no usable head")]
    EmptyChain,

    #[error("no ancestor block at height {height:?}")]
    MissingBlock { height: Height },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, ChainError>;
