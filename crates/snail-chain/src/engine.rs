#![forbid(unsafe_code)]

use snail_crypto::{fruits_root, meets_difficulty, uncles_root};
use snail_types::{BlockHeader, ChainSpec, EngineKind, Fruit, FruitHeader, Hash256, PbftSign, SnailBlock};
use thiserror::Error;

use crate::difficulty::{self, DifficultyError, DifficultyParams};
use crate::{block_id, fruit_id};

const DEFAULT_MAX_NONCE_TRIES: u64 = 50_000_000;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("difficulty error: {0}")]
    Difficulty(#[from] DifficultyError),

    #[error("pow not found within {max_tries} nonce tries")]
    PowNotFound { max_tries: u64 },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Difficulty and sealing rules. Both implementations share the difficulty
/// calculation; they differ only in whether seals carry real proof of work.
pub trait Engine {
    fn difficulty_params(&self) -> &DifficultyParams;

    fn calc_snail_difficulty(&self, time: u64, parents: &[BlockHeader]) -> Result<u64> {
        Ok(difficulty::calc_snail_difficulty(
            self.difficulty_params(),
            time,
            parents,
        )?)
    }

    fn calc_fruit_difficulty(&self, time: u64, parents: &[BlockHeader]) -> Result<u64> {
        Ok(difficulty::calc_fruit_difficulty(
            self.difficulty_params(),
            time,
            parents,
        )?)
    }

    fn finalize_fruit(&self, header: FruitHeader, signs: Vec<PbftSign>) -> Result<Fruit>;

    /// Commits `fruits` and `uncles` into the header, then seals it.
    fn finalize_snail(
        &self,
        header: BlockHeader,
        uncles: Vec<BlockHeader>,
        fruits: Vec<Fruit>,
        signs: Vec<PbftSign>,
    ) -> Result<SnailBlock>;

    fn verify_block_seal(&self, header: &BlockHeader) -> bool;
    fn verify_fruit_seal(&self, header: &FruitHeader) -> bool;
}

/// Fills in the fruit/uncle commitments and the block's own fast number.
pub fn assemble_block(
    mut header: BlockHeader,
    uncles: Vec<BlockHeader>,
    fruits: Vec<Fruit>,
    signs: Vec<PbftSign>,
) -> SnailBlock {
    if let Some(first) = fruits.first() {
        header.fast_number = first.fast_number();
    }
    header.fruits_hash = fruits_root(&fruits);
    header.uncle_hash = uncles_root(&uncles);
    SnailBlock {
        header,
        fruits,
        signs,
        uncles,
    }
}

trait Nonced {
    fn seal_id(&self) -> Hash256;
    fn target_difficulty(&self) -> u64;
    fn set_nonce(&mut self, nonce: u64);
}

impl Nonced for BlockHeader {
    fn seal_id(&self) -> Hash256 {
        block_id(self)
    }
    fn target_difficulty(&self) -> u64 {
        self.difficulty
    }
    fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }
}

impl Nonced for FruitHeader {
    fn seal_id(&self) -> Hash256 {
        fruit_id(self)
    }
    fn target_difficulty(&self) -> u64 {
        self.difficulty
    }
    fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }
}

fn seal_valid<H: Nonced>(header: &H) -> bool {
    meets_difficulty(&header.seal_id(), header.target_difficulty())
}

/// Nonce search from 0, so equal inputs always produce equal seals.
fn search_nonce<H: Nonced>(header: &mut H, max_tries: u64) -> Result<()> {
    for nonce in 0..max_tries {
        header.set_nonce(nonce);
        if seal_valid(header) {
            return Ok(());
        }
    }
    Err(EngineError::PowNotFound { max_tries })
}

#[derive(Clone, Debug)]
pub struct PowEngine {
    params: DifficultyParams,
    max_nonce_tries: u64,
}

impl PowEngine {
    pub fn new(params: DifficultyParams) -> Self {
        Self {
            params,
            max_nonce_tries: DEFAULT_MAX_NONCE_TRIES,
        }
    }

    pub fn with_max_nonce_tries(mut self, max_nonce_tries: u64) -> Self {
        self.max_nonce_tries = max_nonce_tries;
        self
    }
}

impl Engine for PowEngine {
    fn difficulty_params(&self) -> &DifficultyParams {
        &self.params
    }

    fn finalize_fruit(&self, mut header: FruitHeader, signs: Vec<PbftSign>) -> Result<Fruit> {
        search_nonce(&mut header, self.max_nonce_tries)?;
        Ok(Fruit { header, signs })
    }

    fn finalize_snail(
        &self,
        header: BlockHeader,
        uncles: Vec<BlockHeader>,
        fruits: Vec<Fruit>,
        signs: Vec<PbftSign>,
    ) -> Result<SnailBlock> {
        let mut block = assemble_block(header, uncles, fruits, signs);
        search_nonce(&mut block.header, self.max_nonce_tries)?;
        Ok(block)
    }

    fn verify_block_seal(&self, header: &BlockHeader) -> bool {
        seal_valid(header)
    }

    fn verify_fruit_seal(&self, header: &FruitHeader) -> bool {
        seal_valid(header)
    }
}

/// Non-validating engine for tests and simulation: no nonce search, every
/// seal verifies.
#[derive(Clone, Debug)]
pub struct FakeEngine {
    params: DifficultyParams,
}

impl FakeEngine {
    pub fn new(params: DifficultyParams) -> Self {
        Self { params }
    }
}

impl Engine for FakeEngine {
    fn difficulty_params(&self) -> &DifficultyParams {
        &self.params
    }

    fn finalize_fruit(&self, header: FruitHeader, signs: Vec<PbftSign>) -> Result<Fruit> {
        Ok(Fruit { header, signs })
    }

    fn finalize_snail(
        &self,
        header: BlockHeader,
        uncles: Vec<BlockHeader>,
        fruits: Vec<Fruit>,
        signs: Vec<PbftSign>,
    ) -> Result<SnailBlock> {
        Ok(assemble_block(header, uncles, fruits, signs))
    }

    fn verify_block_seal(&self, _header: &BlockHeader) -> bool {
        true
    }

    fn verify_fruit_seal(&self, _header: &FruitHeader) -> bool {
        true
    }
}

/// Engine selected by `consensus.engine`.
pub fn engine_for_spec(spec: &ChainSpec) -> Box<dyn Engine> {
    let params = DifficultyParams::from(&spec.consensus);
    match spec.consensus.engine {
        EngineKind::Pow => Box::new(PowEngine::new(params)),
        EngineKind::Fake => Box::new(FakeEngine::new(params)),
    }
}
