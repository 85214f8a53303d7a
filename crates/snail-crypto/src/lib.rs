#![forbid(unsafe_code)]

use blake3::Hasher;
use snail_types::{canonical, BlockHeader, ChainSpec, Fruit, FruitHeader, Hash256};

pub mod merkle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Domain(pub [u8; 16]);

impl Domain {
    pub const fn new(tag: [u8; 16]) -> Self {
        Self(tag)
    }
}

pub const DOMAIN_FRUIT_HEADER: Domain = Domain::new(*b"SNL:FRH:V0\0\0\0\0\0\0");
pub const DOMAIN_BLOCK_HEADER: Domain = Domain::new(*b"SNL:BKH:V0\0\0\0\0\0\0");
pub const DOMAIN_MERKLE: Domain = Domain::new(*b"SNL:MRK:V0\0\0\0\0\0\0");
pub const DOMAIN_CHAINSPEC: Domain = Domain::new(*b"SNL:CSP:V0\0\0\0\0\0\0");

pub fn hash_domain(domain: Domain, bytes: &[u8]) -> Hash256 {
    let mut hasher = Hasher::new();
    hasher.update(&domain.0);
    hasher.update(bytes);
    let out = hasher.finalize();
    Hash256(*out.as_bytes())
}

pub fn hash_fruit_header(header: &FruitHeader) -> Hash256 {
    let enc = canonical::encode_fruit_header(header);
    hash_domain(DOMAIN_FRUIT_HEADER, &enc)
}

pub fn hash_block_header(header: &BlockHeader) -> Hash256 {
    let enc = canonical::encode_block_header(header);
    hash_domain(DOMAIN_BLOCK_HEADER, &enc)
}

pub fn hash_chainspec(spec: &ChainSpec) -> Hash256 {
    let enc = canonical::encode_chainspec(spec);
    hash_domain(DOMAIN_CHAINSPEC, &enc)
}

/// Commitment to a block's fruit run (order-sensitive).
pub fn fruits_root(fruits: &[Fruit]) -> Hash256 {
    let ids: Vec<Hash256> = fruits.iter().map(|f| hash_fruit_header(&f.header)).collect();
    merkle::merkle_root(&ids)
}

pub fn uncles_root(uncles: &[BlockHeader]) -> Hash256 {
    let ids: Vec<Hash256> = uncles.iter().map(hash_block_header).collect();
    merkle::merkle_root(&ids)
}

/// Largest acceptable 64-bit hash prefix for `difficulty`.
pub fn difficulty_target(difficulty: u64) -> u64 {
    u64::MAX / difficulty.max(1)
}

/// A hash satisfies `difficulty` when its big-endian 64-bit prefix is at or
/// below `u64::MAX / difficulty`.
pub fn meets_difficulty(h: &Hash256, difficulty: u64) -> bool {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&h.0[..8]);
    u64::from_be_bytes(prefix) <= difficulty_target(difficulty)
}
