#![forbid(unsafe_code)]

use snail_types::Hash256;

use crate::{hash_domain, DOMAIN_MERKLE};

fn merkle_parent(left: Hash256, right: Hash256) -> Hash256 {
    let mut buf = [0u8; 64];
    buf[0..32].copy_from_slice(&left.0);
    buf[32..64].copy_from_slice(&right.0);
    hash_domain(DOMAIN_MERKLE, &buf)
}

/// Deterministic merkle root over a list of ids.
/// - empty list => Hash256::zero()
/// - odd layer => last leaf is paired with itself
pub fn merkle_root(ids: &[Hash256]) -> Hash256 {
    if ids.is_empty() {
        return Hash256::zero();
    }

    let mut layer: Vec<Hash256> = ids.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for pair in layer.chunks(2) {
            let l = pair[0];
            let r = if pair.len() == 2 { pair[1] } else { pair[0] };
            next.push(merkle_parent(l, r));
        }
        layer = next;
    }
    layer[0]
}
