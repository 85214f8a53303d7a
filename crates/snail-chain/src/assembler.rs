#![forbid(unsafe_code)]

use snail_db::store::SnailChainReader;
use snail_types::{ConsensusParams, Fruit, PbftSign, SnailBlock};
use tracing::debug;

use crate::engine::Engine;
use crate::error::{ChainError, Result};
use crate::header::{make_fruit_header, make_header, MinerIdentity};

/// Builds fruits and blocks on top of the chain reader's current head.
pub struct Assembler<'a, C: ?Sized, E: ?Sized> {
    chain: &'a C,
    engine: &'a E,
    consensus: &'a ConsensusParams,
}

impl<'a, C, E> Assembler<'a, C, E>
where
    C: SnailChainReader + ?Sized,
    E: Engine + ?Sized,
{
    pub fn new(chain: &'a C, engine: &'a E, consensus: &'a ConsensusParams) -> Self {
        Self {
            chain,
            engine,
            consensus,
        }
    }

    /// Current head and the last fast number it aggregates.
    fn head(&self) -> Result<(SnailBlock, u64)> {
        let head = self.chain.current_block()?.ok_or(ChainError::EmptyChain)?;
        let last = head.last_fast_number().ok_or(ChainError::EmptyChain)?;
        Ok((head, last))
    }

    fn fruit_on(
        &self,
        head: &SnailBlock,
        fast_number: u64,
        miner: &MinerIdentity,
        signs: Vec<PbftSign>,
    ) -> Result<Fruit> {
        let header = make_fruit_header(
            self.chain,
            head,
            self.engine,
            self.consensus,
            fast_number,
            miner,
        )?;
        Ok(self.engine.finalize_fruit(header, signs)?)
    }

    pub fn make_fruit(
        &self,
        fast_number: u64,
        miner: &MinerIdentity,
        signs: &[PbftSign],
    ) -> Result<Fruit> {
        let (head, last) = self.head()?;
        if fast_number <= last {
            return Err(ChainError::StaleFastNumber { fast_number, last });
        }
        self.fruit_on(&head, fast_number, miner, signs.to_vec())
    }

    /// Aggregates fruits for fast numbers `[start, start + count)` into a block
    /// on the current head. Each fruit carries the signatures for its own fast
    /// height; the block carries all of `signs`.
    pub fn make_block(
        &self,
        start: u64,
        count: u64,
        miner: &MinerIdentity,
        signs: &[PbftSign],
    ) -> Result<SnailBlock> {
        let (head, last) = self.head()?;
        if count < self.consensus.minimum_fruits {
            return Err(ChainError::InsufficientFruits {
                got: count,
                minimum: self.consensus.minimum_fruits,
            });
        }
        if start <= last {
            return Err(ChainError::NonMonotonicFastNumber { start, last });
        }

        let end = start.saturating_add(count);
        let fruits = (start..end)
            .map(|n| {
                let fruit_signs = signs.iter().filter(|s| s.fast_height == n).cloned().collect();
                self.fruit_on(&head, n, miner, fruit_signs)
            })
            .collect::<Result<Vec<_>>>()?;
        if fruits.len() as u64 != count {
            return Err(ChainError::FruitCountMismatch {
                expected: count,
                got: fruits.len() as u64,
            });
        }

        let mut header = make_header(self.chain, &head, self.engine, self.consensus)?;
        header.coinbase = miner.coinbase;
        header.public_key = miner.public_key.clone();
        header.fast_number = start;

        debug!(
            number = header.number.0,
            start,
            count,
            difficulty = header.difficulty,
            "assembled snail block"
        );
        Ok(self
            .engine
            .finalize_snail(header, vec![], fruits, signs.to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainspec::{genesis_block, test_chainspec};
    use crate::engine::{engine_for_spec, PowEngine};
    use crate::difficulty::DifficultyParams;
    use crate::{block_id, fruit_pow_valid};
    use snail_crypto::fruits_root;
    use snail_db::store::{BlockStore, ChainStore, ChainTip, DbChainStore};
    use snail_db::MemKv;
    use snail_types::{Address, Hash256, Height, PublicKey, SnailHeader};

    fn miner() -> MinerIdentity {
        MinerIdentity {
            public_key: PublicKey(vec![2u8; 33]),
            coinbase: Address([7u8; 20]),
        }
    }

    fn store_at(head: &SnailBlock) -> DbChainStore<MemKv> {
        let store = DbChainStore::new(MemKv::new());
        let id = block_id(&head.header);
        store.put_block(id, head).unwrap();
        store.put_header(id, &SnailHeader::Block(head.header.clone())).unwrap();
        store.set_canon_hash(head.number(), id).unwrap();
        store
            .set_tip(ChainTip {
                height: head.number(),
                hash: id,
            })
            .unwrap();
        store
    }

    #[test]
    fn minimum_fruit_scenario() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_at(&genesis);
        let engine = engine_for_spec(&spec);
        let asm = Assembler::new(&store, engine.as_ref(), &spec.consensus);

        let err = asm.make_block(1, 59, &miner(), &[]).unwrap_err();
        assert!(matches!(
            err,
            ChainError::InsufficientFruits {
                got: 59,
                minimum: 60
            }
        ));

        let blk = asm.make_block(1, 60, &miner(), &[]).unwrap();
        assert_eq!(blk.number(), Height(1));
        assert_eq!(blk.header.fast_number, 1);
        assert_eq!(blk.header.coinbase, miner().coinbase);
        let fast: Vec<u64> = blk.fruits.iter().map(|f| f.fast_number()).collect();
        assert_eq!(fast, (1..=60).collect::<Vec<_>>());
        assert_eq!(blk.header.fruits_hash, fruits_root(&blk.fruits));
    }

    #[test]
    fn stale_and_non_monotonic_are_rejected() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_at(&genesis);
        let engine = engine_for_spec(&spec);
        let asm = Assembler::new(&store, engine.as_ref(), &spec.consensus);

        assert!(matches!(
            asm.make_block(0, 60, &miner(), &[]).unwrap_err(),
            ChainError::NonMonotonicFastNumber { start: 0, last: 0 }
        ));
        assert!(matches!(
            asm.make_fruit(0, &miner(), &[]).unwrap_err(),
            ChainError::StaleFastNumber {
                fast_number: 0,
                last: 0
            }
        ));
        assert_eq!(asm.make_fruit(1, &miner(), &[]).unwrap().fast_number(), 1);
    }

    #[test]
    fn headless_or_fruitless_chain_is_empty() {
        let spec = test_chainspec();
        let engine = engine_for_spec(&spec);

        let store = DbChainStore::new(MemKv::new());
        let asm = Assembler::new(&store, engine.as_ref(), &spec.consensus);
        assert!(matches!(
            asm.make_block(1, 60, &miner(), &[]).unwrap_err(),
            ChainError::EmptyChain
        ));

        let mut bare = genesis_block(&spec).unwrap();
        bare.fruits.clear();
        let store = store_at(&bare);
        let asm = Assembler::new(&store, engine.as_ref(), &spec.consensus);
        assert!(matches!(
            asm.make_fruit(1, &miner(), &[]).unwrap_err(),
            ChainError::EmptyChain
        ));
    }

    #[test]
    fn overflowing_range_is_a_count_mismatch() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_at(&genesis);
        let engine = engine_for_spec(&spec);
        let asm = Assembler::new(&store, engine.as_ref(), &spec.consensus);

        let err = asm.make_block(u64::MAX - 10, 60, &miner(), &[]).unwrap_err();
        assert!(matches!(
            err,
            ChainError::FruitCountMismatch {
                expected: 60,
                got: 10
            }
        ));
    }

    #[test]
    fn fruits_carry_signs_for_their_height() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_at(&genesis);
        let engine = engine_for_spec(&spec);
        let asm = Assembler::new(&store, engine.as_ref(), &spec.consensus);

        let signs: Vec<PbftSign> = [3u64, 3, 5]
            .iter()
            .map(|&h| PbftSign {
                fast_height: h,
                result: 1,
                fast_hash: Hash256([h as u8; 32]),
                sign: vec![h as u8; 65],
            })
            .collect();
        let blk = asm.make_block(1, 60, &miner(), &signs).unwrap();
        assert_eq!(blk.signs, signs);
        assert_eq!(blk.fruits[2].signs.len(), 2);
        assert_eq!(blk.fruits[4].signs.len(), 1);
        assert!(blk.fruits[0].signs.is_empty());
    }

    #[test]
    fn pow_engine_seals_every_fruit() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_at(&genesis);
        let engine = PowEngine::new(DifficultyParams::from(&spec.consensus));
        let asm = Assembler::new(&store, &engine, &spec.consensus);

        let blk = asm.make_block(1, 60, &miner(), &[]).unwrap();
        assert!(blk.fruits.iter().all(|f| fruit_pow_valid(&f.header)));
        assert!(engine.verify_block_seal(&blk.header));
    }
}
