#![forbid(unsafe_code)]

use std::slice;

use snail_db::store::SnailChainReader;
use snail_types::{
    Address, BlockHeader, ConsensusParams, FruitHeader, Hash256, Height, Pointer, PublicKey,
    SnailBlock, SnailHeader,
};

use crate::block_id;
use crate::engine::Engine;
use crate::error::{ChainError, Result};

/// Who is credited for a fruit or block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MinerIdentity {
    pub public_key: PublicKey,
    pub coinbase: Address,
}

/// Height of the freshness anchor for a header built on `parent_number`,
/// clamped at the chain origin.
pub fn pointer_number(parent_number: Height, freshness: u64) -> Height {
    Height(parent_number.0.saturating_sub(freshness))
}

/// Block ids of `from` and its ancestors down to `down_to`, walking parent
/// links. Entry `i` is the block at height `from.number - i`.
pub fn ancestry<C>(chain: &C, from: &BlockHeader, down_to: Height) -> Result<Vec<Hash256>>
where
    C: SnailChainReader + ?Sized,
{
    let mut ids = vec![block_id(from)];
    let mut cur = from.clone();
    while cur.number > down_to {
        let parent_height = Height(cur.number.0 - 1);
        cur = match chain.header_by_hash(cur.parent)? {
            Some(SnailHeader::Block(h)) if h.number == parent_height => h,
            _ => return Err(ChainError::MissingBlock { height: parent_height }),
        };
        ids.push(block_id(&cur));
    }
    Ok(ids)
}

/// Resolves the anchor for a child of `parent` along the parent's own
/// ancestry, so side-chain parents anchor on their own branch.
pub fn resolve_pointer<C>(chain: &C, parent: &SnailBlock, freshness: u64) -> Result<Pointer>
where
    C: SnailChainReader + ?Sized,
{
    let number = pointer_number(parent.number(), freshness);
    let ids = ancestry(chain, &parent.header, number)?;
    let hash = ids
        .last()
        .copied()
        .ok_or(ChainError::MissingBlock { height: number })?;
    Ok(Pointer { hash, number })
}

fn check_parent<C>(chain: &C, parent: &SnailBlock) -> Result<Hash256>
where
    C: SnailChainReader + ?Sized,
{
    let id = block_id(&parent.header);
    match chain.header_by_hash(id)? {
        Some(SnailHeader::Block(_)) => Ok(id),
        _ => Err(ChainError::InvalidParent { parent: id }),
    }
}

/// Draft header for the block after `parent`. `fast_number` holds the
/// parent's last fast number until fruits are committed at finalisation.
pub fn make_header<C, E>(
    chain: &C,
    parent: &SnailBlock,
    engine: &E,
    consensus: &ConsensusParams,
) -> Result<BlockHeader>
where
    C: SnailChainReader + ?Sized,
    E: Engine + ?Sized,
{
    let parent_id = check_parent(chain, parent)?;
    let time = parent.time().saturating_add(consensus.block_interval);
    let difficulty = engine.calc_snail_difficulty(time, slice::from_ref(&parent.header))?;
    let pointer = resolve_pointer(chain, parent, consensus.pointer_freshness)?;

    Ok(BlockHeader {
        parent: parent_id,
        coinbase: parent.header.coinbase,
        public_key: parent.header.public_key.clone(),
        number: parent.number().next(),
        time,
        difficulty,
        fast_number: parent
            .last_fast_number()
            .unwrap_or(parent.header.fast_number),
        pointer,
        uncle_hash: Hash256::zero(),
        fruits_hash: Hash256::zero(),
        extra: vec![],
        nonce: 0,
    })
}

/// Unsealed fruit header attesting `fast_number`, mined on top of `parent`.
pub fn make_fruit_header<C, E>(
    chain: &C,
    parent: &SnailBlock,
    engine: &E,
    consensus: &ConsensusParams,
    fast_number: u64,
    miner: &MinerIdentity,
) -> Result<FruitHeader>
where
    C: SnailChainReader + ?Sized,
    E: Engine + ?Sized,
{
    let parent_id = check_parent(chain, parent)?;
    let time = parent.time().saturating_add(consensus.block_interval);
    let difficulty = engine.calc_fruit_difficulty(time, slice::from_ref(&parent.header))?;
    let pointer = resolve_pointer(chain, parent, consensus.pointer_freshness)?;

    Ok(FruitHeader {
        parent: parent_id,
        coinbase: miner.coinbase,
        public_key: miner.public_key.clone(),
        time,
        difficulty,
        fast_number,
        pointer,
        extra: vec![],
        nonce: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainspec::{genesis_block, test_chainspec};
    use crate::difficulty::{calc_fruit_difficulty, calc_snail_difficulty, DifficultyParams};
    use crate::engine::engine_for_spec;
    use snail_db::store::{BlockStore, ChainStore, ChainTip, DbChainStore};
    use snail_db::MemKv;

    fn store_with(blocks: &[SnailBlock]) -> DbChainStore<MemKv> {
        let store = DbChainStore::new(MemKv::new());
        for b in blocks {
            let id = block_id(&b.header);
            store.put_block(id, b).unwrap();
            store.put_header(id, &SnailHeader::Block(b.header.clone())).unwrap();
            store.set_canon_hash(b.number(), id).unwrap();
            store
                .set_tip(ChainTip {
                    height: b.number(),
                    hash: id,
                })
                .unwrap();
        }
        store
    }

    fn child_of(parent: &SnailBlock) -> SnailBlock {
        let mut header = parent.header.clone();
        header.parent = block_id(&parent.header);
        header.number = parent.number().next();
        header.time = parent.time() + 10;
        SnailBlock::with_header(header)
    }

    #[test]
    fn pointer_number_clamps_at_origin() {
        assert_eq!(pointer_number(Height(0), 100), Height(0));
        assert_eq!(pointer_number(Height(50), 100), Height(0));
        assert_eq!(pointer_number(Height(150), 100), Height(50));
        assert_eq!(pointer_number(Height(7), 0), Height(7));
    }

    #[test]
    fn header_follows_parent() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_with(&[genesis.clone()]);
        let engine = engine_for_spec(&spec);

        let h = make_header(&store, &genesis, engine.as_ref(), &spec.consensus).unwrap();
        assert_eq!(h.parent, block_id(&genesis.header));
        assert_eq!(h.number, Height(1));
        assert_eq!(h.time, genesis.time() + spec.consensus.block_interval);
        assert_eq!(h.coinbase, genesis.header.coinbase);
        assert_eq!(h.fast_number, 0);
        assert_eq!(h.pointer.number, Height(0));
        assert_eq!(h.pointer.hash, block_id(&genesis.header));

        let params = DifficultyParams::from(&spec.consensus);
        assert_eq!(
            h.difficulty,
            calc_snail_difficulty(&params, h.time, &[genesis.header.clone()]).unwrap()
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_with(&[genesis.clone()]);
        let engine = engine_for_spec(&spec);

        let orphan = child_of(&child_of(&genesis));
        let err = make_header(&store, &orphan, engine.as_ref(), &spec.consensus).unwrap_err();
        assert!(matches!(err, ChainError::InvalidParent { parent } if parent == block_id(&orphan.header)));
    }

    #[test]
    fn pointer_tracks_freshness_window() {
        let mut spec = test_chainspec();
        spec.consensus.pointer_freshness = 2;
        let genesis = genesis_block(&spec).unwrap();
        let b1 = child_of(&genesis);
        let b2 = child_of(&b1);
        let b3 = child_of(&b2);
        let store = store_with(&[genesis, b1.clone(), b2, b3.clone()]);
        let engine = engine_for_spec(&spec);

        let h = make_header(&store, &b3, engine.as_ref(), &spec.consensus).unwrap();
        assert_eq!(h.pointer.number, Height(1));
        assert_eq!(h.pointer.hash, block_id(&b1.header));
    }

    #[test]
    fn missing_anchor_is_a_hard_failure() {
        let mut spec = test_chainspec();
        spec.consensus.pointer_freshness = 1;
        let genesis = genesis_block(&spec).unwrap();
        let b1 = child_of(&genesis);
        let b2 = child_of(&b1);
        // b1 is unknown, so the walk from b2 cannot reach height 1
        let store = store_with(&[b2.clone()]);
        let engine = engine_for_spec(&spec);

        let err = make_header(&store, &b2, engine.as_ref(), &spec.consensus).unwrap_err();
        assert!(matches!(err, ChainError::MissingBlock { height: Height(1) }));
    }

    #[test]
    fn pointer_follows_parent_branch_not_canonical_index() {
        let mut spec = test_chainspec();
        spec.consensus.pointer_freshness = 1;
        let genesis = genesis_block(&spec).unwrap();
        let a1 = child_of(&genesis);
        let mut b1 = child_of(&genesis);
        b1.header.extra = b"side".to_vec();
        let b2 = child_of(&b1);
        // canonical index holds a1 at height 1; b1/b2 are known by header only
        let store = store_with(&[genesis, a1.clone()]);
        for b in [&b1, &b2] {
            store
                .put_header(block_id(&b.header), &SnailHeader::Block(b.header.clone()))
                .unwrap();
        }
        let engine = engine_for_spec(&spec);

        let h = make_header(&store, &b2, engine.as_ref(), &spec.consensus).unwrap();
        assert_eq!(h.pointer.number, Height(1));
        assert_eq!(h.pointer.hash, block_id(&b1.header));
        assert_ne!(h.pointer.hash, block_id(&a1.header));

        let ids = ancestry(&store, &b2.header, Height(0)).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[1], block_id(&b1.header));
    }

    #[test]
    fn fruit_header_uses_miner_and_fruit_difficulty() {
        let spec = test_chainspec();
        let genesis = genesis_block(&spec).unwrap();
        let store = store_with(&[genesis.clone()]);
        let engine = engine_for_spec(&spec);
        let miner = MinerIdentity {
            public_key: PublicKey(vec![9u8; 33]),
            coinbase: Address([4u8; 20]),
        };

        let f = make_fruit_header(&store, &genesis, engine.as_ref(), &spec.consensus, 12, &miner)
            .unwrap();
        assert_eq!(f.fast_number, 12);
        assert_eq!(f.coinbase, miner.coinbase);
        assert_eq!(f.public_key, miner.public_key);
        assert_eq!(f.parent, block_id(&genesis.header));

        let params = DifficultyParams::from(&spec.consensus);
        assert_eq!(
            f.difficulty,
            calc_fruit_difficulty(&params, f.time, &[genesis.header.clone()]).unwrap()
        );
    }
}
