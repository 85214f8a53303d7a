#![forbid(unsafe_code)]

use std::path::Path;

use snail_crypto::{fruits_root, uncles_root};
use snail_types::{
    Address, BlockHeader, ChainParams, ChainSpec, ConsensusParams, EngineKind, Fruit,
    FruitHeader, GenesisSpec, Hash256, Height, Pointer, PublicKey, SnailBlock,
};
use thiserror::Error;

use crate::block_id;

#[derive(Debug, Error)]
pub enum ChainSpecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml decode error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("chainspec invalid: {0}")]
    Invalid(&'static str),
}

pub type Result<T> = std::result::Result<T, ChainSpecError>;

pub const DEFAULT_MINIMUM_FRUITS: u64 = 60;
pub const DEFAULT_BLOCK_INTERVAL: u64 = 10;
pub const DEFAULT_POINTER_FRESHNESS: u64 = 100;
pub const DEFAULT_MINIMUM_DIFFICULTY: u64 = 256;
pub const DEFAULT_DIFFICULTY_BOUND_DIVISOR: u64 = 2048;
pub const DEFAULT_FRUIT_DIFFICULTY_DIVISOR: u64 = 8;

/// Parameters used by test chains and by chain generation without a `ChainSpec`.
pub fn test_chainspec() -> ChainSpec {
    ChainSpec {
        spec_version: 1,
        chain: ChainParams {
            chain_name: "SNAIL-TEST".to_string(),
            chain_id: 100,
        },
        consensus: ConsensusParams {
            minimum_fruits: DEFAULT_MINIMUM_FRUITS,
            block_interval: DEFAULT_BLOCK_INTERVAL,
            pointer_freshness: DEFAULT_POINTER_FRESHNESS,
            minimum_difficulty: DEFAULT_MINIMUM_DIFFICULTY,
            difficulty_bound_divisor: DEFAULT_DIFFICULTY_BOUND_DIVISOR,
            fruit_difficulty_divisor: DEFAULT_FRUIT_DIFFICULTY_DIVISOR,
            engine: EngineKind::Fake,
        },
        genesis: GenesisSpec {
            time: 1_700_000_000,
            difficulty: 1024,
            nonce: 0,
            coinbase: Address::zero(),
            extra: b"snail genesis".to_vec(),
        },
    }
}

pub fn validate_chainspec(spec: &ChainSpec) -> Result<()> {
    if spec.spec_version == 0 {
        return Err(ChainSpecError::Invalid("spec_version must be > 0"));
    }
    if spec.chain.chain_name.trim().is_empty() {
        return Err(ChainSpecError::Invalid("chain.chain_name must be non-empty"));
    }
    let c = &spec.consensus;
    if c.minimum_fruits == 0 {
        return Err(ChainSpecError::Invalid("consensus.minimum_fruits must be > 0"));
    }
    if c.block_interval == 0 {
        return Err(ChainSpecError::Invalid("consensus.block_interval must be > 0"));
    }
    if c.minimum_difficulty == 0 {
        return Err(ChainSpecError::Invalid("consensus.minimum_difficulty must be > 0"));
    }
    if c.difficulty_bound_divisor == 0 {
        return Err(ChainSpecError::Invalid(
            "consensus.difficulty_bound_divisor must be > 0",
        ));
    }
    if c.fruit_difficulty_divisor == 0 {
        return Err(ChainSpecError::Invalid(
            "consensus.fruit_difficulty_divisor must be > 0",
        ));
    }
    if spec.genesis.difficulty < c.minimum_difficulty {
        return Err(ChainSpecError::Invalid(
            "genesis.difficulty must be >= consensus.minimum_difficulty",
        ));
    }
    Ok(())
}

pub fn save_chainspec_to_path<P: AsRef<Path>>(path: P, spec: &ChainSpec) -> Result<()> {
    validate_chainspec(spec)?;
    let s = toml::to_string(spec)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn load_chainspec_from_path<P: AsRef<Path>>(path: P) -> Result<ChainSpec> {
    let s = std::fs::read_to_string(path)?;
    let spec: ChainSpec = toml::from_str(&s)?;
    validate_chainspec(&spec)?;
    Ok(spec)
}

fn origin_pointer() -> Pointer {
    Pointer {
        hash: Hash256::zero(),
        number: Height(0),
    }
}

/// The single fruit carried by genesis, attesting fast height 0, so the first
/// mined block can start aggregating at fast number 1.
pub fn genesis_fruit(spec: &ChainSpec) -> Fruit {
    Fruit {
        header: FruitHeader {
            parent: Hash256::zero(),
            coinbase: spec.genesis.coinbase,
            public_key: PublicKey::default(),
            time: spec.genesis.time,
            difficulty: spec.genesis.difficulty,
            fast_number: 0,
            pointer: origin_pointer(),
            extra: vec![],
            nonce: 0,
        },
        signs: vec![],
    }
}

/// Genesis block: height 0, parent zero, one genesis fruit, no uncles.
pub fn genesis_block(spec: &ChainSpec) -> Result<SnailBlock> {
    validate_chainspec(spec)?;

    let fruits = vec![genesis_fruit(spec)];
    let header = BlockHeader {
        parent: Hash256::zero(),
        coinbase: spec.genesis.coinbase,
        public_key: PublicKey::default(),
        number: Height(0),
        time: spec.genesis.time,
        difficulty: spec.genesis.difficulty,
        fast_number: 0,
        pointer: origin_pointer(),
        uncle_hash: uncles_root(&[]),
        fruits_hash: fruits_root(&fruits),
        extra: spec.genesis.extra.clone(),
        nonce: spec.genesis.nonce,
    };

    Ok(SnailBlock {
        header,
        fruits,
        signs: vec![],
        uncles: vec![],
    })
}

pub fn genesis_header(spec: &ChainSpec) -> Result<BlockHeader> {
    Ok(genesis_block(spec)?.header)
}

pub fn genesis_id(spec: &ChainSpec) -> Result<Hash256> {
    let header = genesis_header(spec)?;
    Ok(block_id(&header))
}
