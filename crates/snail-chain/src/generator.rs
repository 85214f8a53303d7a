#![forbid(unsafe_code)]

use std::slice;

use snail_db::store::{self, SnailChainReader};
use snail_types::{
    Address, BlockHeader, ChainSpec, Fruit, Hash256, Height, PbftSign, SnailBlock, SnailHeader,
};
use thiserror::Error;
use tracing::debug;

use crate::assembler::Assembler;
use crate::block_id;
use crate::chainspec::test_chainspec;
use crate::engine::{Engine, EngineError};
use crate::error::ChainError;
use crate::header::{make_header, MinerIdentity};

/// Misuse of a [`BlockGen`] context. Raising one aborts the generation run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CustomizeError {
    #[error("block index {index} out of range: only {current} generated so far")]
    OutOfRangeIndex { index: usize, current: usize },

    #[error("time offset {offset} gives time {time}, not after parent time {parent_time}")]
    OffsetViolatesOrdering {
        offset: i64,
        time: u64,
        parent_time: u64,
    },

    #[error("time offset {offset} overflows")]
    TimeOutOfRange { offset: i64 },

    #[error("coinbase must be set before fruits are added")]
    CoinbaseAfterFruits,

    #[error("engine error: {0}")]
    Engine(EngineError),
}

#[derive(Debug, Error)]
pub enum GenError {
    #[error("customize error: {0}")]
    Customize(#[from] CustomizeError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

pub type Result<T> = std::result::Result<T, GenError>;

/// Chain reader for one generation run: the backing store, plus the run's
/// parent and every block sealed so far in the run.
struct GenChainView<'a, S: ?Sized> {
    store: &'a S,
    origin: &'a SnailBlock,
    generated: &'a [SnailBlock],
}

impl<'a, S: SnailChainReader + ?Sized> GenChainView<'a, S> {
    fn run_blocks(&self) -> impl Iterator<Item = &'a SnailBlock> {
        slice::from_ref(self.origin).iter().chain(self.generated.iter())
    }
}

impl<'a, S: SnailChainReader + ?Sized> SnailChainReader for GenChainView<'a, S> {
    fn current_block(&self) -> store::Result<Option<SnailBlock>> {
        Ok(Some(self.generated.last().unwrap_or(self.origin).clone()))
    }

    /// Only blocks of this run are numbered; older ancestors are reached
    /// through parent links, never the store's canonical index.
    fn block_by_number(&self, number: Height) -> store::Result<Option<SnailBlock>> {
        Ok(self.run_blocks().find(|b| b.number() == number).cloned())
    }

    fn header_by_hash(&self, id: Hash256) -> store::Result<Option<SnailHeader>> {
        for b in self.run_blocks() {
            if block_id(&b.header) == id {
                return Ok(Some(SnailHeader::Block(b.header.clone())));
            }
        }
        self.store.header_by_hash(id)
    }
}

/// Per-height generation context handed to the customisation hook.
pub struct BlockGen<'a> {
    index: usize,
    parent: &'a SnailBlock,
    chain: &'a [SnailBlock],
    chain_reader: &'a dyn SnailChainReader,
    spec: &'a ChainSpec,
    engine: &'a dyn Engine,
    header: BlockHeader,
    uncles: Vec<BlockHeader>,
    fruits: Vec<Fruit>,
    signs: Vec<PbftSign>,
    failure: Option<CustomizeError>,
}

impl<'a> BlockGen<'a> {
    fn fail(&mut self, err: CustomizeError) -> CustomizeError {
        if self.failure.is_none() {
            self.failure = Some(err.clone());
        }
        err
    }

    /// Index of the block being generated within this run.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn number(&self) -> Height {
        self.header.number
    }

    pub fn parent(&self) -> &'a SnailBlock {
        self.parent
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn set_coinbase(&mut self, coinbase: Address) -> std::result::Result<(), CustomizeError> {
        if !self.fruits.is_empty() {
            return Err(self.fail(CustomizeError::CoinbaseAfterFruits));
        }
        self.header.coinbase = coinbase;
        Ok(())
    }

    pub fn set_extra(&mut self, extra: Vec<u8>) {
        self.header.extra = extra;
    }

    pub fn add_fruit(&mut self, fruit: Fruit) {
        self.fruits.push(fruit);
    }

    pub fn add_uncle(&mut self, uncle: BlockHeader) {
        self.uncles.push(uncle);
    }

    pub fn add_sign(&mut self, sign: PbftSign) {
        self.signs.push(sign);
    }

    /// A block sealed earlier in this run.
    pub fn prev_block(&mut self, index: usize) -> std::result::Result<&'a SnailBlock, CustomizeError> {
        let chain = self.chain;
        match chain.get(index) {
            Some(b) if index < self.index => Ok(b),
            _ => Err(self.fail(CustomizeError::OutOfRangeIndex {
                index,
                current: self.index,
            })),
        }
    }

    /// Moves the block time by `seconds` and recomputes its difficulty.
    pub fn offset_time(&mut self, seconds: i64) -> std::result::Result<(), CustomizeError> {
        let time = if seconds >= 0 {
            match self.header.time.checked_add(seconds.unsigned_abs()) {
                Some(t) => t,
                None => return Err(self.fail(CustomizeError::TimeOutOfRange { offset: seconds })),
            }
        } else {
            self.header.time.saturating_sub(seconds.unsigned_abs())
        };

        let parent_time = self.parent.time();
        if time <= parent_time {
            return Err(self.fail(CustomizeError::OffsetViolatesOrdering {
                offset: seconds,
                time,
                parent_time,
            }));
        }

        let difficulty = match self
            .engine
            .calc_snail_difficulty(time, slice::from_ref(&self.parent.header))
        {
            Ok(d) => d,
            Err(e) => return Err(self.fail(CustomizeError::Engine(e))),
        };
        self.header.time = time;
        self.header.difficulty = difficulty;
        Ok(())
    }

    /// Fruit for `fast_number` on this block's parent, sealed with the run's
    /// engine.
    pub fn make_fruit(&self, fast_number: u64, miner: &MinerIdentity) -> Result<Fruit> {
        let asm = Assembler::new(self.chain_reader, self.engine, &self.spec.consensus);
        Ok(asm.make_fruit(fast_number, miner, &[])?)
    }

    fn seal(self) -> Result<SnailBlock> {
        let block = self
            .engine
            .finalize_snail(self.header, self.uncles, self.fruits, self.signs)
            .map_err(ChainError::from)?;
        Ok(block)
    }
}

/// Customisation hook run once per generated block.
pub type Customize<'f> = dyn FnMut(usize, &mut BlockGen<'_>) -> Result<()> + 'f;

/// Generates `n` blocks on top of `parent`. Without a `ChainSpec` the test chain
/// parameters apply. Either all `n` blocks are returned or an error.
pub fn generate_chain<S>(
    spec: Option<&ChainSpec>,
    parent: &SnailBlock,
    engine: &dyn Engine,
    store: &S,
    n: usize,
    mut customize: Option<&mut Customize<'_>>,
) -> Result<Vec<SnailBlock>>
where
    S: SnailChainReader + ?Sized,
{
    let fallback;
    let spec = match spec {
        Some(s) => s,
        None => {
            fallback = test_chainspec();
            &fallback
        }
    };

    let mut blocks: Vec<SnailBlock> = Vec::with_capacity(n);
    for i in 0..n {
        let block = {
            let view = GenChainView {
                store,
                origin: parent,
                generated: &blocks,
            };
            let prev = blocks.last().unwrap_or(parent);
            let header = make_header(&view, prev, engine, &spec.consensus)?;

            let mut ctx = BlockGen {
                index: i,
                parent: prev,
                chain: &blocks,
                chain_reader: &view,
                spec,
                engine,
                header,
                uncles: vec![],
                fruits: vec![],
                signs: vec![],
                failure: None,
            };
            if let Some(f) = customize.as_deref_mut() {
                f(i, &mut ctx)?;
            }
            if let Some(err) = ctx.failure.take() {
                return Err(err.into());
            }
            ctx.seal()?
        };

        debug!(
            index = i,
            number = block.number().0,
            time = block.time(),
            difficulty = block.header.difficulty,
            fruits = block.fruits.len(),
            "generated snail block"
        );
        blocks.push(block);
    }
    Ok(blocks)
}

/// `n` blocks on `parent` whose coinbases are `[seed, 0, .., i]`.
pub fn make_block_chain<S>(
    parent: &SnailBlock,
    n: usize,
    engine: &dyn Engine,
    store: &S,
    seed: u8,
) -> Result<Vec<SnailBlock>>
where
    S: SnailChainReader + ?Sized,
{
    let mut stamp = |i: usize, b: &mut BlockGen<'_>| -> Result<()> {
        let mut coinbase = [0u8; 20];
        coinbase[0] = seed;
        coinbase[19] = i as u8;
        b.set_coinbase(Address(coinbase))?;
        Ok(())
    };
    generate_chain(None, parent, engine, store, n, Some(&mut stamp))
}

/// Headers of [`make_block_chain`] built on a bare parent header.
pub fn make_header_chain<S>(
    parent: &BlockHeader,
    n: usize,
    engine: &dyn Engine,
    store: &S,
    seed: u8,
) -> Result<Vec<BlockHeader>>
where
    S: SnailChainReader + ?Sized,
{
    let parent = SnailBlock::with_header(parent.clone());
    let blocks = make_block_chain(&parent, n, engine, store, seed)?;
    Ok(blocks.into_iter().map(|b| b.header).collect())
}
