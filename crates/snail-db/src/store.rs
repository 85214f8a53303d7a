#![forbid(unsafe_code)]

use snail_types::{canonical, Hash256, Height, SnailBlock, SnailHeader};
use thiserror::Error;

use crate::{DbError, KvStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] DbError),

    #[error("decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub height: Height,
    pub hash: Hash256,
}

/// Identity of the chain a store was initialised for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainMeta {
    pub chain_id: u32,
    pub genesis_id: Hash256,
    pub chainspec_hash: Hash256,
}

pub trait BlockStore {
    /// Fruit and block headers share one keyspace, keyed by their id.
    fn put_header(&self, id: Hash256, header: &SnailHeader) -> Result<()>;
    fn get_header(&self, id: Hash256) -> Result<SnailHeader>;
    fn has_header(&self, id: Hash256) -> Result<bool>;

    fn put_block(&self, id: Hash256, block: &SnailBlock) -> Result<()>;
    fn get_block(&self, id: Hash256) -> Result<SnailBlock>;
    fn has_block(&self, id: Hash256) -> Result<bool>;
}

pub trait ChainStore: BlockStore {
    fn set_tip(&self, tip: ChainTip) -> Result<()>;
    fn get_tip(&self) -> Result<Option<ChainTip>>;

    fn set_meta(&self, meta: ChainMeta) -> Result<()>;
    fn get_meta(&self) -> Result<Option<ChainMeta>>;

    fn set_canon_hash(&self, height: Height, id: Hash256) -> Result<()>;
    fn get_canon_hash(&self, height: Height) -> Result<Option<Hash256>>;
    /// Canonical index in ascending height order.
    fn canonical_hashes(&self) -> Result<Vec<(Height, Hash256)>>;
}

/// Read side of a snail chain as seen by block construction. Lookups that
/// find nothing return `None`; callers decide whether that is fatal.
pub trait SnailChainReader {
    fn current_block(&self) -> Result<Option<SnailBlock>>;
    fn block_by_number(&self, number: Height) -> Result<Option<SnailBlock>>;
    fn header_by_hash(&self, id: Hash256) -> Result<Option<SnailHeader>>;
}

#[derive(Clone)]
pub struct DbChainStore<S: KvStore> {
    kv: S,
}

const TIP_MAGIC: [u8; 8] = *b"SNL_TIP0";
const META_MAGIC: [u8; 8] = *b"SNL_MTA0";

impl<S: KvStore> DbChainStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    fn k_prefixed(prefix: &[u8; 4], id: &[u8]) -> Vec<u8> {
        let mut k = Vec::with_capacity(4 + id.len());
        k.extend_from_slice(prefix);
        k.extend_from_slice(id);
        k
    }

    fn k_header(id: Hash256) -> Vec<u8> {
        Self::k_prefixed(b"hdr:", &id.0)
    }

    fn k_block(id: Hash256) -> Vec<u8> {
        Self::k_prefixed(b"blk:", &id.0)
    }

    fn k_canon(height: Height) -> Vec<u8> {
        Self::k_prefixed(b"can:", &height.0.to_be_bytes())
    }

    fn k_tip() -> &'static [u8] {
        b"tip:"
    }

    fn k_meta() -> &'static [u8] {
        b"mta:"
    }

    fn read_hash(bytes: &[u8], what: &str) -> Result<Hash256> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::Decode(format!("{}: bad hash bytes", what)))?;
        Ok(Hash256(arr))
    }

    fn encode_tip(tip: ChainTip) -> Vec<u8> {
        // 8 (magic) + 8 (height u64) + 32 (hash)
        let mut out = Vec::with_capacity(48);
        out.extend_from_slice(&TIP_MAGIC);
        out.extend_from_slice(&tip.height.0.to_be_bytes());
        out.extend_from_slice(&tip.hash.0);
        out
    }

    fn decode_tip(bytes: &[u8]) -> Result<ChainTip> {
        if bytes.len() != 8 + 8 + 32 {
            return Err(StoreError::Decode("tip: bad length".to_string()));
        }
        if bytes[0..8] != TIP_MAGIC {
            return Err(StoreError::Decode("tip: invalid magic".to_string()));
        }
        let h_bytes: [u8; 8] = bytes[8..16]
            .try_into()
            .map_err(|_| StoreError::Decode("tip: bad height bytes".to_string()))?;
        Ok(ChainTip {
            height: Height(u64::from_be_bytes(h_bytes)),
            hash: Self::read_hash(&bytes[16..48], "tip")?,
        })
    }

    fn encode_meta(meta: ChainMeta) -> Vec<u8> {
        // 8 (magic) + 4 (chain id) + 32 + 32
        let mut out = Vec::with_capacity(76);
        out.extend_from_slice(&META_MAGIC);
        out.extend_from_slice(&meta.chain_id.to_be_bytes());
        out.extend_from_slice(&meta.genesis_id.0);
        out.extend_from_slice(&meta.chainspec_hash.0);
        out
    }

    fn decode_meta(bytes: &[u8]) -> Result<ChainMeta> {
        if bytes.len() != 8 + 4 + 32 + 32 {
            return Err(StoreError::Decode("meta: bad length".to_string()));
        }
        if bytes[0..8] != META_MAGIC {
            return Err(StoreError::Decode("meta: invalid magic".to_string()));
        }
        let id_bytes: [u8; 4] = bytes[8..12]
            .try_into()
            .map_err(|_| StoreError::Decode("meta: bad chain id bytes".to_string()))?;
        Ok(ChainMeta {
            chain_id: u32::from_be_bytes(id_bytes),
            genesis_id: Self::read_hash(&bytes[12..44], "meta genesis")?,
            chainspec_hash: Self::read_hash(&bytes[44..76], "meta chainspec")?,
        })
    }
}

impl<S: KvStore> BlockStore for DbChainStore<S> {
    fn put_header(&self, id: Hash256, header: &SnailHeader) -> Result<()> {
        let key = Self::k_header(id);
        let val = canonical::encode_header(header);
        self.kv.put(key, val)?;
        Ok(())
    }

    fn get_header(&self, id: Hash256) -> Result<SnailHeader> {
        let key = Self::k_header(id);
        let val = self.kv.get(&key)?;
        canonical::decode_header(&val).map_err(|e| StoreError::Decode(format!("header decode: {}", e)))
    }

    fn has_header(&self, id: Hash256) -> Result<bool> {
        Ok(self.kv.has(&Self::k_header(id))?)
    }

    fn put_block(&self, id: Hash256, block: &SnailBlock) -> Result<()> {
        let key = Self::k_block(id);
        let val = canonical::encode_block(block);
        self.kv.put(key, val)?;
        Ok(())
    }

    fn get_block(&self, id: Hash256) -> Result<SnailBlock> {
        let key = Self::k_block(id);
        let val = self.kv.get(&key)?;
        canonical::decode_block(&val).map_err(|e| StoreError::Decode(format!("block decode: {}", e)))
    }

    fn has_block(&self, id: Hash256) -> Result<bool> {
        Ok(self.kv.has(&Self::k_block(id))?)
    }
}

impl<S: KvStore> ChainStore for DbChainStore<S> {
    fn set_tip(&self, tip: ChainTip) -> Result<()> {
        self.kv.put(Self::k_tip().to_vec(), Self::encode_tip(tip))?;
        Ok(())
    }

    fn get_tip(&self) -> Result<Option<ChainTip>> {
        let key = Self::k_tip();
        if !self.kv.has(key)? {
            return Ok(None);
        }
        let val = self.kv.get(key)?;
        Ok(Some(Self::decode_tip(&val)?))
    }

    fn set_meta(&self, meta: ChainMeta) -> Result<()> {
        self.kv.put(Self::k_meta().to_vec(), Self::encode_meta(meta))?;
        Ok(())
    }

    fn get_meta(&self) -> Result<Option<ChainMeta>> {
        let key = Self::k_meta();
        if !self.kv.has(key)? {
            return Ok(None);
        }
        let val = self.kv.get(key)?;
        Ok(Some(Self::decode_meta(&val)?))
    }

    fn set_canon_hash(&self, height: Height, id: Hash256) -> Result<()> {
        self.kv.put(Self::k_canon(height), id.0.to_vec())?;
        Ok(())
    }

    fn get_canon_hash(&self, height: Height) -> Result<Option<Hash256>> {
        let key = Self::k_canon(height);
        if !self.kv.has(&key)? {
            return Ok(None);
        }
        let val = self.kv.get(&key)?;
        Ok(Some(Self::read_hash(&val, "canon")?))
    }

    fn canonical_hashes(&self) -> Result<Vec<(Height, Hash256)>> {
        let mut out = Vec::new();
        for (k, v) in self.kv.scan_prefix(b"can:")? {
            let h_bytes: [u8; 8] = k
                .get(4..)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| StoreError::Decode("canon: bad height key".to_string()))?;
            out.push((Height(u64::from_be_bytes(h_bytes)), Self::read_hash(&v, "canon")?));
        }
        Ok(out)
    }
}

impl<S: KvStore> SnailChainReader for DbChainStore<S> {
    fn current_block(&self) -> Result<Option<SnailBlock>> {
        match self.get_tip()? {
            Some(tip) => Ok(Some(self.get_block(tip.hash)?)),
            None => Ok(None),
        }
    }

    fn block_by_number(&self, number: Height) -> Result<Option<SnailBlock>> {
        match self.get_canon_hash(number)? {
            Some(id) => Ok(Some(self.get_block(id)?)),
            None => Ok(None),
        }
    }

    fn header_by_hash(&self, id: Hash256) -> Result<Option<SnailHeader>> {
        if !self.has_header(id)? {
            return Ok(None);
        }
        Ok(Some(self.get_header(id)?))
    }
}
