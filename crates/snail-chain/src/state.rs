#![forbid(unsafe_code)]

use std::slice;

use snail_crypto::{fruits_root, hash_chainspec, uncles_root};
use snail_db::store::{self, ChainMeta, ChainStore, ChainTip, SnailChainReader, StoreError};
use snail_types::{BlockHeader, ChainSpec, Fruit, Hash256, Height, SnailBlock, SnailHeader};
use thiserror::Error;
use tracing::{debug, info};

use crate::assembler::Assembler;
use crate::chainspec::{genesis_block, validate_chainspec, ChainSpecError};
use crate::engine::{engine_for_spec, Engine, EngineError};
use crate::error::ChainError;
use crate::header::{ancestry, pointer_number};
use crate::{block_id, fruit_id};

#[derive(Debug, Error)]
pub enum ChainStateError {
    #[error("chainspec error: {0}")]
    Spec(#[from] ChainSpecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("chainstore missing meta (required)")]
    MetaMissing,

    #[error("chain meta mismatch: expected={expected:?} got={got:?}")]
    MetaMismatch { expected: ChainMeta, got: ChainMeta },

    #[error("unknown parent {parent:?}")]
    UnknownParent { parent: Hash256 },

    #[error("block height does not match parent+1: parent_height={parent_height:?} child_height={child_height:?}")]
    HeightNotParentPlusOne {
        parent_height: Height,
        child_height: Height,
    },

    #[error("block time {time} not after parent time {parent_time}")]
    TimeNotAfterParent { time: u64, parent_time: u64 },

    #[error("difficulty mismatch: expected {expected}, got {got}")]
    DifficultyMismatch { expected: u64, got: u64 },

    #[error("pointer mismatch: expected {expected_number:?}/{expected_hash:?}, got {got_number:?}/{got_hash:?}")]
    PointerMismatch {
        expected_number: Height,
        expected_hash: Hash256,
        got_number: Height,
        got_hash: Hash256,
    },

    #[error("fruit gap: expected fast number {expected}, got {got}")]
    FruitGap { expected: u64, got: u64 },

    #[error("header fast number {header} differs from first fruit {first}")]
    FastNumberMismatch { header: u64, first: u64 },

    #[error("fruit {fast_number} pointer {pointer:?} outside freshness window")]
    StalePointer { fast_number: u64, pointer: Height },

    #[error("fruit {fast_number} pointer does not match chain at {pointer:?}")]
    UnknownPointer { fast_number: u64, pointer: Height },

    #[error("fruit {fast_number} built on {got:?}, block parent is {expected:?}")]
    FruitParentMismatch {
        fast_number: u64,
        expected: Hash256,
        got: Hash256,
    },

    #[error("fruit {fast_number} time {time} not after parent time {parent_time}")]
    FruitTimeNotAfterParent {
        fast_number: u64,
        time: u64,
        parent_time: u64,
    },

    #[error("fruit {fast_number} difficulty mismatch: expected {expected}, got {got}")]
    FruitDifficultyMismatch {
        fast_number: u64,
        expected: u64,
        got: u64,
    },

    #[error("fruits hash mismatch")]
    FruitsHashMismatch,

    #[error("uncle hash mismatch")]
    UncleHashMismatch,

    #[error("invalid pow for header")]
    InvalidPow,

    #[error("invalid pow for fruit {fast_number}")]
    InvalidFruitPow { fast_number: u64 },

    #[error("canonical chain broken at height {height:?}")]
    CanonicalBroken { height: Height },
}

pub type Result<T> = std::result::Result<T, ChainStateError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    AlreadyKnown,
    SideChain,
    NewHead,
}

/// Persistent snail chain: validates and appends blocks, tracks the head and
/// the canonical height index.
pub struct SnailChain<S: ChainStore + SnailChainReader> {
    spec: ChainSpec,
    meta: ChainMeta,
    tip: ChainTip,
    store: S,
    engine: Box<dyn Engine>,
}

impl<S: ChainStore + SnailChainReader> SnailChain<S> {
    fn expected_meta(spec: &ChainSpec) -> Result<(ChainMeta, SnailBlock)> {
        let genesis = genesis_block(spec)?;
        let meta = ChainMeta {
            chain_id: spec.chain.chain_id,
            genesis_id: block_id(&genesis.header),
            chainspec_hash: hash_chainspec(spec),
        };
        Ok((meta, genesis))
    }

    /// Opens a store with the engine named by `consensus.engine`.
    pub fn open_or_init(store: S, spec: ChainSpec) -> Result<Self> {
        let engine = engine_for_spec(&spec);
        Self::open_or_init_with_engine(store, spec, engine)
    }

    pub fn open_or_init_with_engine(store: S, spec: ChainSpec, engine: Box<dyn Engine>) -> Result<Self> {
        validate_chainspec(&spec)?;
        let (expected, genesis) = Self::expected_meta(&spec)?;

        match store.get_tip()? {
            Some(tip) => {
                let got = store.get_meta()?.ok_or(ChainStateError::MetaMissing)?;
                if got != expected {
                    return Err(ChainStateError::MetaMismatch { expected, got });
                }
                info!(height = tip.height.0, "opened snail chain");
                Ok(Self {
                    spec,
                    meta: got,
                    tip,
                    store,
                    engine,
                })
            }
            None => {
                let gid = expected.genesis_id;
                store.set_meta(expected)?;
                Self::put_block_indexed(&store, gid, &genesis)?;
                store.set_canon_hash(Height(0), gid)?;

                let tip = ChainTip {
                    height: Height(0),
                    hash: gid,
                };
                store.set_tip(tip)?;
                info!(genesis = ?gid, chain_id = spec.chain.chain_id, "initialised snail chain");

                Ok(Self {
                    spec,
                    meta: expected,
                    tip,
                    store,
                    engine,
                })
            }
        }
    }

    fn put_block_indexed(store: &S, id: Hash256, block: &SnailBlock) -> Result<()> {
        store.put_block(id, block)?;
        store.put_header(id, &SnailHeader::Block(block.header.clone()))?;
        for f in &block.fruits {
            store.put_header(fruit_id(&f.header), &SnailHeader::Fruit(f.header.clone()))?;
        }
        Ok(())
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    pub fn meta(&self) -> ChainMeta {
        self.meta
    }

    pub fn tip(&self) -> ChainTip {
        self.tip
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn head_block(&self) -> Result<SnailBlock> {
        Ok(self.store.get_block(self.tip.hash)?)
    }

    pub fn get_block(&self, id: Hash256) -> Result<Option<SnailBlock>> {
        if !self.store.has_block(id)? {
            return Ok(None);
        }
        Ok(Some(self.store.get_block(id)?))
    }

    pub fn get_block_by_number(&self, number: Height) -> Result<Option<SnailBlock>> {
        Ok(self.store.block_by_number(number)?)
    }

    /// Assembler building on this chain's head with its engine and consensus
    /// parameters.
    pub fn assembler(&self) -> Assembler<'_, Self, dyn Engine> {
        Assembler::new(self, self.engine.as_ref(), &self.spec.consensus)
    }

    fn block_header(&self, id: Hash256) -> Result<BlockHeader> {
        match self.store.header_by_hash(id)? {
            Some(SnailHeader::Block(h)) => Ok(h),
            _ => Err(ChainStateError::UnknownParent { parent: id }),
        }
    }

    /// `ancestors[i]` is the parent's ancestor at `parent.number - i`, down to
    /// the oldest height a pointer may name.
    fn validate_fruit(
        &self,
        fruit: &Fruit,
        parent: &SnailBlock,
        parent_id: Hash256,
        ancestors: &[Hash256],
    ) -> Result<()> {
        let h = &fruit.header;
        let fast_number = h.fast_number;

        if !self.engine.verify_fruit_seal(h) {
            return Err(ChainStateError::InvalidFruitPow { fast_number });
        }
        if h.parent != parent_id {
            return Err(ChainStateError::FruitParentMismatch {
                fast_number,
                expected: parent_id,
                got: h.parent,
            });
        }
        if h.time <= parent.time() {
            return Err(ChainStateError::FruitTimeNotAfterParent {
                fast_number,
                time: h.time,
                parent_time: parent.time(),
            });
        }
        let expected = self
            .engine
            .calc_fruit_difficulty(h.time, slice::from_ref(&parent.header))?;
        if h.difficulty != expected {
            return Err(ChainStateError::FruitDifficultyMismatch {
                fast_number,
                expected,
                got: h.difficulty,
            });
        }

        let oldest = pointer_number(parent.number(), self.spec.consensus.pointer_freshness);
        if h.pointer.number < oldest || h.pointer.number > parent.number() {
            return Err(ChainStateError::StalePointer {
                fast_number,
                pointer: h.pointer.number,
            });
        }
        let depth = (parent.number().0 - h.pointer.number.0) as usize;
        if ancestors.get(depth) != Some(&h.pointer.hash) {
            return Err(ChainStateError::UnknownPointer {
                fast_number,
                pointer: h.pointer.number,
            });
        }
        Ok(())
    }

    /// Full consensus check of `block` against its stored parent.
    pub fn validate_block(&self, block: &SnailBlock) -> Result<()> {
        let h = &block.header;
        let consensus = &self.spec.consensus;

        let parent_id = h.parent;
        if !self.store.has_block(parent_id)? {
            return Err(ChainStateError::UnknownParent { parent: parent_id });
        }
        let parent = self.store.get_block(parent_id)?;

        if h.number != parent.number().next() {
            return Err(ChainStateError::HeightNotParentPlusOne {
                parent_height: parent.number(),
                child_height: h.number,
            });
        }
        if h.time <= parent.time() {
            return Err(ChainStateError::TimeNotAfterParent {
                time: h.time,
                parent_time: parent.time(),
            });
        }

        let expected = self
            .engine
            .calc_snail_difficulty(h.time, slice::from_ref(&parent.header))?;
        if h.difficulty != expected {
            return Err(ChainStateError::DifficultyMismatch {
                expected,
                got: h.difficulty,
            });
        }

        let anchor = pointer_number(parent.number(), consensus.pointer_freshness);
        let ancestors = ancestry(self, &parent.header, anchor)?;
        let anchor_hash = ancestors
            .last()
            .copied()
            .ok_or(ChainError::MissingBlock { height: anchor })?;
        if h.pointer.number != anchor || h.pointer.hash != anchor_hash {
            return Err(ChainStateError::PointerMismatch {
                expected_number: anchor,
                expected_hash: anchor_hash,
                got_number: h.pointer.number,
                got_hash: h.pointer.hash,
            });
        }

        let count = block.fruits.len() as u64;
        if count < consensus.minimum_fruits {
            return Err(ChainError::InsufficientFruits {
                got: count,
                minimum: consensus.minimum_fruits,
            }
            .into());
        }
        let last = parent.last_fast_number().ok_or(ChainError::EmptyChain)?;
        let first = block.fruits[0].fast_number();
        if first <= last {
            return Err(ChainError::NonMonotonicFastNumber { start: first, last }.into());
        }
        for (want, fruit) in (first..).zip(&block.fruits) {
            if fruit.fast_number() != want {
                return Err(ChainStateError::FruitGap {
                    expected: want,
                    got: fruit.fast_number(),
                });
            }
        }
        if h.fast_number != first {
            return Err(ChainStateError::FastNumberMismatch {
                header: h.fast_number,
                first,
            });
        }

        for fruit in &block.fruits {
            self.validate_fruit(fruit, &parent, parent_id, &ancestors)?;
        }

        if h.fruits_hash != fruits_root(&block.fruits) {
            return Err(ChainStateError::FruitsHashMismatch);
        }
        if h.uncle_hash != uncles_root(&block.uncles) {
            return Err(ChainStateError::UncleHashMismatch);
        }
        if !self.engine.verify_block_seal(h) {
            return Err(ChainStateError::InvalidPow);
        }
        Ok(())
    }

    /// Rewrites the canonical index from `new_tip` down to the first height
    /// that already points at the new branch.
    fn reorg_canonical(&self, new_tip: ChainTip) -> Result<()> {
        let mut id = new_tip.hash;
        let mut height = new_tip.height;
        loop {
            if self.store.get_canon_hash(height)? == Some(id) {
                break;
            }
            self.store.set_canon_hash(height, id)?;
            if height == Height(0) {
                break;
            }
            id = self.block_header(id)?.parent;
            height = Height(height.0 - 1);
        }
        Ok(())
    }

    /// Validates and stores `block`. The longest chain wins; on equal height
    /// the current head is kept.
    pub fn insert_block(&mut self, block: SnailBlock) -> Result<(Hash256, InsertOutcome)> {
        let id = block_id(&block.header);
        if self.store.has_block(id)? {
            return Ok((id, InsertOutcome::AlreadyKnown));
        }

        self.validate_block(&block)?;
        Self::put_block_indexed(&self.store, id, &block)?;

        if block.number() <= self.tip.height {
            debug!(number = block.number().0, id = ?id, "stored side chain block");
            return Ok((id, InsertOutcome::SideChain));
        }

        let reorg = block.header.parent != self.tip.hash;
        let new_tip = ChainTip {
            height: block.number(),
            hash: id,
        };
        self.reorg_canonical(new_tip)?;
        self.store.set_tip(new_tip)?;
        self.tip = new_tip;
        info!(
            number = new_tip.height.0,
            id = ?id,
            fruits = block.fruits.len(),
            reorg,
            "new snail head"
        );
        Ok((id, InsertOutcome::NewHead))
    }

    /// Walks the canonical index from genesis to the head, re-validating
    /// every block and its linkage.
    pub fn verify_canonical_chain(&self) -> Result<()> {
        let canon = self.store.canonical_hashes()?;
        let mut prev: Option<Hash256> = None;

        for (expect, (height, id)) in (0u64..).zip(canon.iter().copied()) {
            if height != Height(expect) || height > self.tip.height {
                return Err(ChainStateError::CanonicalBroken { height });
            }
            let block = self.store.get_block(id)?;
            if block_id(&block.header) != id || block.number() != height {
                return Err(ChainStateError::CanonicalBroken { height });
            }
            match prev {
                None => {
                    if id != self.meta.genesis_id {
                        return Err(ChainStateError::CanonicalBroken { height });
                    }
                }
                Some(p) => {
                    if block.header.parent != p {
                        return Err(ChainStateError::CanonicalBroken { height });
                    }
                    self.validate_block(&block)?;
                }
            }
            prev = Some(id);
        }

        if prev != Some(self.tip.hash) {
            return Err(ChainStateError::CanonicalBroken {
                height: self.tip.height,
            });
        }
        Ok(())
    }
}

impl<S: ChainStore + SnailChainReader> SnailChainReader for SnailChain<S> {
    fn current_block(&self) -> store::Result<Option<SnailBlock>> {
        self.store.current_block()
    }

    fn block_by_number(&self, number: Height) -> store::Result<Option<SnailBlock>> {
        self.store.block_by_number(number)
    }

    fn header_by_hash(&self, id: Hash256) -> store::Result<Option<SnailHeader>> {
        self.store.header_by_hash(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainspec::test_chainspec;
    use crate::difficulty::DifficultyParams;
    use crate::engine::PowEngine;
    use crate::generator::{generate_chain, BlockGen, GenError};
    use crate::header::MinerIdentity;
    use snail_db::store::DbChainStore;
    use snail_db::MemKv;
    use snail_types::{Address, PublicKey};

    type MemChain = SnailChain<DbChainStore<MemKv>>;

    fn miner(tag: u8) -> MinerIdentity {
        MinerIdentity {
            public_key: PublicKey(vec![tag; 33]),
            coinbase: Address([tag; 20]),
        }
    }

    fn open(spec: ChainSpec) -> MemChain {
        SnailChain::open_or_init(DbChainStore::new(MemKv::new()), spec).unwrap()
    }

    fn next_block(chain: &MemChain, tag: u8) -> SnailBlock {
        let head = chain.head_block().unwrap();
        let start = head.last_fast_number().unwrap() + 1;
        let minimum = chain.spec().consensus.minimum_fruits;
        chain
            .assembler()
            .make_block(start, minimum, &miner(tag), &[])
            .unwrap()
    }

    #[test]
    fn init_writes_genesis_and_meta() {
        let spec = test_chainspec();
        let chain = open(spec.clone());

        assert_eq!(chain.tip().height, Height(0));
        assert_eq!(chain.meta().chain_id, spec.chain.chain_id);
        assert_eq!(chain.meta().genesis_id, chain.tip().hash);
        let head = chain.head_block().unwrap();
        assert_eq!(head, genesis_block(&spec).unwrap());
        // genesis fruit is indexed by its own id
        let fid = fruit_id(&head.fruits[0].header);
        assert!(chain.header_by_hash(fid).unwrap().unwrap().is_fruit());
    }

    #[test]
    fn reopen_checks_meta() {
        let spec = test_chainspec();
        let chain = open(spec.clone());
        let store = chain.store().clone();

        let again = SnailChain::open_or_init(store.clone(), spec.clone()).unwrap();
        assert_eq!(again.tip(), chain.tip());

        let mut other = spec;
        other.chain.chain_id = 999;
        assert!(matches!(
            SnailChain::open_or_init(store, other),
            Err(ChainStateError::MetaMismatch { .. })
        ));
    }

    #[test]
    fn assembled_blocks_extend_head() {
        let mut chain = open(test_chainspec());
        for expect in 1..=3u64 {
            let blk = next_block(&chain, 1);
            let (id, outcome) = chain.insert_block(blk.clone()).unwrap();
            assert_eq!(outcome, InsertOutcome::NewHead);
            assert_eq!(chain.tip().hash, id);
            assert_eq!(chain.tip().height, Height(expect));
            assert_eq!(chain.get_block(id).unwrap(), Some(blk));
        }
        let again = chain.head_block().unwrap();
        assert_eq!(
            chain.insert_block(again).unwrap().1,
            InsertOutcome::AlreadyKnown
        );
        assert_eq!(chain.head_block().unwrap().last_fast_number(), Some(180));
        chain.verify_canonical_chain().unwrap();
    }

    #[test]
    fn tampered_blocks_are_rejected() {
        let chain = open(test_chainspec());
        let good = next_block(&chain, 1);
        chain.validate_block(&good).unwrap();

        let mut b = good.clone();
        b.header.time = chain.head_block().unwrap().time();
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::TimeNotAfterParent { .. })
        ));

        let mut b = good.clone();
        b.header.difficulty += 1;
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::DifficultyMismatch { .. })
        ));

        let mut b = good.clone();
        b.fruits[0].header.time = chain.head_block().unwrap().time();
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::FruitTimeNotAfterParent { fast_number: 1, .. })
        ));

        let mut b = good.clone();
        b.fruits.pop();
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::Chain(ChainError::InsufficientFruits {
                got: 59,
                minimum: 60
            }))
        ));

        let mut b = good.clone();
        b.fruits.swap(3, 4);
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::FruitGap {
                expected: 4,
                got: 5
            })
        ));

        let mut b = good.clone();
        b.header.fast_number = 2;
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::FastNumberMismatch { header: 2, first: 1 })
        ));

        let mut b = good.clone();
        b.fruits[10].header.extra = b"x".to_vec();
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::FruitsHashMismatch)
        ));

        let mut b = good.clone();
        b.uncles.push(good.header.clone());
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::UncleHashMismatch)
        ));

        let mut b = good;
        b.header.pointer.hash = Hash256([1u8; 32]);
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::PointerMismatch { .. })
        ));
    }

    #[test]
    fn unknown_parent_and_height_are_rejected() {
        let chain = open(test_chainspec());
        let good = next_block(&chain, 1);

        let mut b = good.clone();
        b.header.parent = Hash256([5u8; 32]);
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::UnknownParent { .. })
        ));

        let mut b = good;
        b.header.number = Height(2);
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::HeightNotParentPlusOne { .. })
        ));
    }

    #[test]
    fn pow_chain_rejects_bad_seals() {
        let mut spec = test_chainspec();
        spec.consensus.engine = snail_types::EngineKind::Pow;
        spec.consensus.minimum_fruits = 4;
        let chain = open(spec);
        let good = next_block(&chain, 1);
        chain.validate_block(&good).unwrap();

        let engine = PowEngine::new(DifficultyParams::from(&chain.spec().consensus));
        let mut b = good;
        let mut idx = 0;
        while engine.verify_fruit_seal(&b.fruits[0].header) {
            idx += 1;
            b.fruits[0].header.nonce = idx;
        }
        assert!(matches!(
            chain.validate_block(&b),
            Err(ChainStateError::InvalidFruitPow { fast_number: 1 })
        ));
    }

    /// `n` full blocks on `parent` from miner `tag`, generated against the
    /// chain's store.
    fn fork_from(chain: &MemChain, parent: &SnailBlock, n: usize, tag: u8) -> Vec<SnailBlock> {
        let who = miner(tag);
        let fruits = chain.spec().consensus.minimum_fruits;
        let mut hook = |_: usize, b: &mut BlockGen<'_>| -> std::result::Result<(), GenError> {
            b.set_coinbase(who.coinbase)?;
            let start = b.parent().last_fast_number().unwrap_or(0) + 1;
            for fast in start..start + fruits {
                let fruit = b.make_fruit(fast, &who)?;
                b.add_fruit(fruit);
            }
            Ok(())
        };
        generate_chain(
            Some(chain.spec()),
            parent,
            chain.engine(),
            chain.store(),
            n,
            Some(&mut hook),
        )
        .unwrap()
    }

    #[test]
    fn longer_side_chain_takes_over() {
        let mut chain = open(test_chainspec());
        let genesis = chain.head_block().unwrap();

        let a1 = next_block(&chain, 1);
        let (a1_id, _) = chain.insert_block(a1).unwrap();

        let fork = fork_from(&chain, &genesis, 2, 2);

        let (b1_id, outcome) = chain.insert_block(fork[0].clone()).unwrap();
        assert_eq!(outcome, InsertOutcome::SideChain);
        assert_eq!(chain.tip().hash, a1_id);

        let (b2_id, outcome) = chain.insert_block(fork[1].clone()).unwrap();
        assert_eq!(outcome, InsertOutcome::NewHead);
        assert_eq!(chain.tip().hash, b2_id);
        assert_eq!(chain.store().get_canon_hash(Height(1)).unwrap(), Some(b1_id));
        assert_eq!(chain.store().get_canon_hash(Height(2)).unwrap(), Some(b2_id));
        chain.verify_canonical_chain().unwrap();
    }

    #[test]
    fn generation_on_side_chain_parent_anchors_on_that_branch() {
        let mut spec = test_chainspec();
        spec.consensus.pointer_freshness = 1;
        let mut chain = open(spec);
        let genesis = chain.head_block().unwrap();

        for _ in 0..2 {
            let blk = next_block(&chain, 1);
            assert_eq!(chain.insert_block(blk).unwrap().1, InsertOutcome::NewHead);
        }
        let main_h1 = chain.store().get_canon_hash(Height(1)).unwrap().unwrap();

        let side = fork_from(&chain, &genesis, 2, 2);
        for blk in &side {
            assert_eq!(
                chain.insert_block(blk.clone()).unwrap().1,
                InsertOutcome::SideChain
            );
        }

        let next = fork_from(&chain, &side[1], 1, 2);
        let pointer = next[0].header.pointer;
        assert_eq!(pointer.number, Height(1));
        assert_eq!(pointer.hash, block_id(&side[0].header));
        assert_ne!(pointer.hash, main_h1);
        for fruit in &next[0].fruits {
            assert_eq!(fruit.header.pointer, pointer);
        }

        chain.validate_block(&next[0]).unwrap();
        let (id, outcome) = chain.insert_block(next[0].clone()).unwrap();
        assert_eq!(outcome, InsertOutcome::NewHead);
        assert_eq!(chain.tip().hash, id);
        assert_eq!(
            chain.store().get_canon_hash(Height(1)).unwrap(),
            Some(block_id(&side[0].header))
        );
        chain.verify_canonical_chain().unwrap();
    }

    #[test]
    fn broken_canonical_index_is_detected() {
        let mut chain = open(test_chainspec());
        let blk = next_block(&chain, 1);
        chain.insert_block(blk).unwrap();
        chain.verify_canonical_chain().unwrap();

        chain
            .store()
            .set_canon_hash(Height(1), Hash256([7u8; 32]))
            .unwrap();
        assert!(chain.verify_canonical_chain().is_err());
    }
}
