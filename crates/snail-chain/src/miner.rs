#![forbid(unsafe_code)]

use snail_db::store::{ChainStore, SnailChainReader};
use snail_types::{Hash256, PbftSign};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ChainError;
use crate::header::MinerIdentity;
use crate::state::{ChainStateError, InsertOutcome, SnailChain};

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("chain state error: {0}")]
    State(#[from] ChainStateError),

    #[error("block assembly error: {0}")]
    Chain(#[from] ChainError),
}

pub type Result<T> = std::result::Result<T, MiningError>;

/// Extends a chain one block at a time, each block aggregating the next
/// `fruits_per_block` fast heights.
#[derive(Clone, Debug)]
pub struct Miner {
    identity: MinerIdentity,
    fruits_per_block: u64,
    signs: Vec<PbftSign>,
}

impl Miner {
    pub fn new(identity: MinerIdentity, fruits_per_block: u64) -> Self {
        Self {
            identity,
            fruits_per_block,
            signs: vec![],
        }
    }

    pub fn with_signs(mut self, signs: Vec<PbftSign>) -> Self {
        self.signs = signs;
        self
    }

    pub fn identity(&self) -> &MinerIdentity {
        &self.identity
    }

    pub fn mine_next<S>(&self, chain: &mut SnailChain<S>) -> Result<(Hash256, InsertOutcome)>
    where
        S: ChainStore + SnailChainReader,
    {
        let head = chain.head_block()?;
        let start = head.last_fast_number().unwrap_or(0).saturating_add(1);
        let block = chain
            .assembler()
            .make_block(start, self.fruits_per_block, &self.identity, &self.signs)?;
        Ok(chain.insert_block(block)?)
    }

    /// Runs `rounds` attempts and returns how many extended the chain.
    /// Failed attempts are logged and skipped.
    pub fn run<S>(&self, chain: &mut SnailChain<S>, rounds: usize) -> usize
    where
        S: ChainStore + SnailChainReader,
    {
        let mut mined = 0;
        for round in 0..rounds {
            match self.mine_next(chain) {
                Ok((id, InsertOutcome::NewHead)) => {
                    mined += 1;
                    debug!(round, id = ?id, height = chain.tip().height.0, "mined snail block");
                }
                Ok((id, outcome)) => {
                    warn!(round, id = ?id, ?outcome, "mined block did not extend head");
                }
                Err(e) => {
                    warn!(round, error = %e, "snail mining attempt failed");
                }
            }
        }
        mined
    }
}
