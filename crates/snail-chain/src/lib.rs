#![forbid(unsafe_code)]

use snail_crypto::{hash_block_header, hash_fruit_header, meets_difficulty};
use snail_types::{BlockHeader, FruitHeader, Hash256};

pub mod assembler;
pub mod chainspec;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod generator;
pub mod header;
pub mod miner;
pub mod state;

pub use assembler::Assembler;
pub use engine::{engine_for_spec, Engine, EngineError, FakeEngine, PowEngine};
pub use error::ChainError;
pub use generator::{generate_chain, BlockGen, GenError};
pub use header::MinerIdentity;
pub use state::{InsertOutcome, SnailChain};

pub fn block_id(header: &BlockHeader) -> Hash256 {
    hash_block_header(header)
}

pub fn fruit_id(header: &FruitHeader) -> Hash256 {
    hash_fruit_header(header)
}

/// Seal check independent of the configured engine.
pub fn block_pow_valid(header: &BlockHeader) -> bool {
    meets_difficulty(&block_id(header), header.difficulty)
}

pub fn fruit_pow_valid(header: &FruitHeader) -> bool {
    meets_difficulty(&fruit_id(header), header.difficulty)
}
