#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod canonical;

pub const HASH256_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH256_LEN]);

impl Hash256 {
    pub fn zero() -> Self {
        Self([0u8; HASH256_LEN])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Height(pub u64);

impl Height {
    pub fn next(self) -> Self {
        Height(self.0.saturating_add(1))
    }
}

/// Reward recipient.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub fn zero() -> Self {
        Self([0u8; ADDRESS_LEN])
    }
}

/// Miner identity key, opaque to the snail core.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

/// Freshness anchor: a snail block a header commits to so it cannot be
/// prepared against an arbitrarily old chain view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    pub hash: Hash256,
    pub number: Height,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FruitHeader {
    pub parent: Hash256,
    pub coinbase: Address,
    pub public_key: PublicKey,
    pub time: u64,
    pub difficulty: u64,
    /// Fast-chain height this fruit attests to.
    pub fast_number: u64,
    pub pointer: Pointer,
    pub extra: Vec<u8>,
    pub nonce: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent: Hash256,
    pub coinbase: Address,
    pub public_key: PublicKey,
    pub number: Height,
    pub time: u64,
    pub difficulty: u64,
    /// Fast-chain height of the first aggregated fruit.
    pub fast_number: u64,
    pub pointer: Pointer,
    pub uncle_hash: Hash256,
    pub fruits_hash: Hash256,
    pub extra: Vec<u8>,
    pub nonce: u64,
}

/// Either kind of snail header. Fields that only make sense for one kind
/// live on that kind's struct, so accessors below match exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnailHeader {
    Fruit(FruitHeader),
    Block(BlockHeader),
}

impl SnailHeader {
    pub fn parent(&self) -> Hash256 {
        match self {
            SnailHeader::Fruit(h) => h.parent,
            SnailHeader::Block(h) => h.parent,
        }
    }

    pub fn time(&self) -> u64 {
        match self {
            SnailHeader::Fruit(h) => h.time,
            SnailHeader::Block(h) => h.time,
        }
    }

    pub fn difficulty(&self) -> u64 {
        match self {
            SnailHeader::Fruit(h) => h.difficulty,
            SnailHeader::Block(h) => h.difficulty,
        }
    }

    pub fn coinbase(&self) -> Address {
        match self {
            SnailHeader::Fruit(h) => h.coinbase,
            SnailHeader::Block(h) => h.coinbase,
        }
    }

    pub fn fast_number(&self) -> u64 {
        match self {
            SnailHeader::Fruit(h) => h.fast_number,
            SnailHeader::Block(h) => h.fast_number,
        }
    }

    pub fn pointer(&self) -> Pointer {
        match self {
            SnailHeader::Fruit(h) => h.pointer,
            SnailHeader::Block(h) => h.pointer,
        }
    }

    /// Snail height; fruits do not occupy one.
    pub fn number(&self) -> Option<Height> {
        match self {
            SnailHeader::Fruit(_) => None,
            SnailHeader::Block(h) => Some(h.number),
        }
    }

    pub fn is_fruit(&self) -> bool {
        matches!(self, SnailHeader::Fruit(_))
    }

    pub fn as_block(&self) -> Option<&BlockHeader> {
        match self {
            SnailHeader::Fruit(_) => None,
            SnailHeader::Block(h) => Some(h),
        }
    }
}

impl From<FruitHeader> for SnailHeader {
    fn from(h: FruitHeader) -> Self {
        SnailHeader::Fruit(h)
    }
}

impl From<BlockHeader> for SnailHeader {
    fn from(h: BlockHeader) -> Self {
        SnailHeader::Block(h)
    }
}

/// Committee signature over a fast-chain block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbftSign {
    pub fast_height: u64,
    pub result: u8,
    pub fast_hash: Hash256,
    pub sign: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fruit {
    pub header: FruitHeader,
    pub signs: Vec<PbftSign>,
}

impl Fruit {
    pub fn fast_number(&self) -> u64 {
        self.header.fast_number
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnailBlock {
    pub header: BlockHeader,
    pub fruits: Vec<Fruit>,
    pub signs: Vec<PbftSign>,
    pub uncles: Vec<BlockHeader>,
}

impl SnailBlock {
    pub fn with_header(header: BlockHeader) -> Self {
        Self {
            header,
            fruits: vec![],
            signs: vec![],
            uncles: vec![],
        }
    }

    pub fn number(&self) -> Height {
        self.header.number
    }

    pub fn time(&self) -> u64 {
        self.header.time
    }

    /// Fast number of the last aggregated fruit, if any.
    pub fn last_fast_number(&self) -> Option<u64> {
        self.fruits.last().map(Fruit::fast_number)
    }
}

/// ChainSpec defines network parameters, consensus constants and genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub spec_version: u32,
    pub chain: ChainParams,
    pub consensus: ConsensusParams,
    pub genesis: GenesisSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_name: String,
    pub chain_id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Pow,
    Fake,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// A block aggregates at least this many fruits.
    pub minimum_fruits: u64,
    /// Target spacing between snail blocks, in seconds.
    pub block_interval: u64,
    /// How far behind its parent a header's pointer anchor sits.
    pub pointer_freshness: u64,
    pub minimum_difficulty: u64,
    pub difficulty_bound_divisor: u64,
    pub fruit_difficulty_divisor: u64,
    pub engine: EngineKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisSpec {
    /// UTC timestamp (seconds)
    pub time: u64,
    pub difficulty: u64,
    pub nonce: u64,
    pub coinbase: Address,
    pub extra: Vec<u8>,
}
