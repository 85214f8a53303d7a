#![forbid(unsafe_code)]

use snail_types::{BlockHeader, ConsensusParams};
use thiserror::Error;

/// Largest downward adjustment, in bound-divisor steps, for one block.
const MAX_DOWN_STEPS: u64 = 99;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DifficultyParams {
    pub block_interval: u64,
    pub minimum_difficulty: u64,
    pub bound_divisor: u64,
    pub fruit_divisor: u64,
}

impl From<&ConsensusParams> for DifficultyParams {
    fn from(c: &ConsensusParams) -> Self {
        Self {
            block_interval: c.block_interval,
            minimum_difficulty: c.minimum_difficulty,
            bound_divisor: c.difficulty_bound_divisor,
            fruit_divisor: c.fruit_difficulty_divisor,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DifficultyError {
    #[error("ancestor window is empty")]
    EmptyWindow,
}

pub type Result<T> = std::result::Result<T, DifficultyError>;

/// Difficulty of a block sealed at `time` on top of `window` (oldest first,
/// last entry is the parent).
///
/// The average spacing over the window is measured in whole block intervals:
/// under one interval raises difficulty by one step, exactly one keeps it,
/// and each further interval lowers it by one step (at most 99 steps). A step
/// is `parent.difficulty / bound_divisor`, at least 1. The result never drops
/// below `minimum_difficulty`.
pub fn calc_snail_difficulty(
    params: &DifficultyParams,
    time: u64,
    window: &[BlockHeader],
) -> Result<u64> {
    let (first, parent) = match (window.first(), window.last()) {
        (Some(f), Some(p)) => (f, p),
        _ => return Err(DifficultyError::EmptyWindow),
    };

    let elapsed = time.saturating_sub(first.time) / window.len() as u64;
    let slots = elapsed / params.block_interval.max(1);
    let step = (parent.difficulty / params.bound_divisor.max(1)).max(1);

    let next = if slots == 0 {
        parent.difficulty.saturating_add(step)
    } else {
        let down = (slots - 1).min(MAX_DOWN_STEPS);
        parent.difficulty.saturating_sub(step.saturating_mul(down))
    };

    Ok(next.max(params.minimum_difficulty))
}

/// Fruits are sealed at a fixed fraction of the block difficulty.
pub fn calc_fruit_difficulty(
    params: &DifficultyParams,
    time: u64,
    window: &[BlockHeader],
) -> Result<u64> {
    let block = calc_snail_difficulty(params, time, window)?;
    Ok((block / params.fruit_divisor.max(1)).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use snail_types::{Address, Hash256, Height, Pointer, PublicKey};

    fn params() -> DifficultyParams {
        DifficultyParams {
            block_interval: 10,
            minimum_difficulty: 256,
            bound_divisor: 2048,
            fruit_divisor: 8,
        }
    }

    fn header(number: u64, time: u64, difficulty: u64) -> BlockHeader {
        BlockHeader {
            parent: Hash256::zero(),
            coinbase: Address::zero(),
            public_key: PublicKey::default(),
            number: Height(number),
            time,
            difficulty,
            fast_number: 0,
            pointer: Pointer {
                hash: Hash256::zero(),
                number: Height(0),
            },
            uncle_hash: Hash256::zero(),
            fruits_hash: Hash256::zero(),
            extra: vec![],
            nonce: 0,
        }
    }

    #[test]
    fn empty_window_is_rejected() {
        assert_eq!(
            calc_snail_difficulty(&params(), 10, &[]),
            Err(DifficultyError::EmptyWindow)
        );
    }

    #[test]
    fn on_target_spacing_keeps_difficulty() {
        let parent = header(1, 100, 1 << 20);
        let d = calc_snail_difficulty(&params(), 110, &[parent]).unwrap();
        assert_eq!(d, 1 << 20);
    }

    #[test]
    fn fast_block_raises_and_slow_block_lowers() {
        let parent = header(1, 100, 1 << 20);
        let step = (1u64 << 20) / 2048;
        let fast = calc_snail_difficulty(&params(), 105, &[parent.clone()]).unwrap();
        let slow = calc_snail_difficulty(&params(), 130, &[parent]).unwrap();
        assert_eq!(fast, (1 << 20) + step);
        assert_eq!(slow, (1 << 20) - 2 * step);
    }

    #[test]
    fn adjustment_is_capped_and_floored() {
        let parent = header(1, 100, 1 << 20);
        let step = (1u64 << 20) / 2048;
        let very_slow = calc_snail_difficulty(&params(), 100 + 10_000, &[parent]).unwrap();
        assert_eq!(very_slow, (1 << 20) - 99 * step);

        let low = header(1, 100, 300);
        let d = calc_snail_difficulty(&params(), 100 + 10_000, &[low]).unwrap();
        assert_eq!(d, 256);
    }

    #[test]
    fn window_averages_spacing() {
        let a = header(1, 100, 4096);
        let b = header(2, 110, 4096);
        // (130 - 100) / 2 = 15 → one interval, unchanged
        assert_eq!(calc_snail_difficulty(&params(), 130, &[a, b]).unwrap(), 4096);
    }

    #[test]
    fn fruit_difficulty_is_fraction_of_block() {
        let parent = header(1, 100, 4096);
        let p = params();
        let block = calc_snail_difficulty(&p, 110, &[parent.clone()]).unwrap();
        let fruit = calc_fruit_difficulty(&p, 110, &[parent]).unwrap();
        assert_eq!(fruit, block / 8);
    }

    proptest! {
        #[test]
        fn non_increasing_in_elapsed(
            diff in 256u64..1u64 << 40,
            e1 in 0u64..5_000,
            e2 in 0u64..5_000,
        ) {
            let parent = header(3, 1_000, diff);
            let (short, long) = if e1 <= e2 { (e1, e2) } else { (e2, e1) };
            let d_short = calc_snail_difficulty(&params(), 1_000 + short, &[parent.clone()]).unwrap();
            let d_long = calc_snail_difficulty(&params(), 1_000 + long, &[parent]).unwrap();
            prop_assert!(d_short >= d_long);
        }

        #[test]
        fn bounded_below_and_deterministic(
            diff in 0u64..1u64 << 40,
            elapsed in 0u64..100_000,
        ) {
            let parent = header(3, 1_000, diff);
            let a = calc_snail_difficulty(&params(), 1_000 + elapsed, &[parent.clone()]).unwrap();
            let b = calc_snail_difficulty(&params(), 1_000 + elapsed, &[parent]).unwrap();
            prop_assert_eq!(a, b);
            prop_assert!(a >= params().minimum_difficulty);
        }
    }
}
