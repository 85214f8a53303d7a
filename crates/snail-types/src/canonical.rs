use crate::{
    Address, BlockHeader, ChainParams, ChainSpec, ConsensusParams, EngineKind, Fruit,
    FruitHeader, GenesisSpec, Hash256, Height, PbftSign, Pointer, PublicKey, SnailBlock,
    SnailHeader, ADDRESS_LEN, HASH256_LEN,
};

const MAGIC_FRH: [u8; 8] = *b"SNL_FRH0";
const MAGIC_BKH: [u8; 8] = *b"SNL_BKH0";
const MAGIC_HDR: [u8; 8] = *b"SNL_HDR0";
const MAGIC_SGN: [u8; 8] = *b"SNL_SGN0";
const MAGIC_FRT: [u8; 8] = *b"SNL_FRT0";
const MAGIC_BLK: [u8; 8] = *b"SNL_BLK0";
const MAGIC_CSP: [u8; 8] = *b"SNL_CSP0";

const TAG_FRUIT: u8 = 0;
const TAG_BLOCK: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    UnexpectedEof { at: usize, needed: usize, remaining: usize },
    InvalidMagic { at: usize },
    InvalidTag { at: usize, tag: u8 },
    InvalidUtf8 { at: usize },
    LengthOverflow { at: usize },
}

impl core::fmt::Display for CanonicalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CanonicalError::UnexpectedEof { at, needed, remaining } => write!(
                f,
                "unexpected eof at {} (needed {}, remaining {})",
                at, needed, remaining
            ),
            CanonicalError::InvalidMagic { at } => write!(f, "invalid magic at {}", at),
            CanonicalError::InvalidTag { at, tag } => write!(f, "invalid tag {} at {}", tag, at),
            CanonicalError::InvalidUtf8 { at } => write!(f, "invalid utf8 at {}", at),
            CanonicalError::LengthOverflow { at } => write!(f, "length overflow at {}", at),
        }
    }
}

impl std::error::Error for CanonicalError {}

type Result<T> = core::result::Result<T, CanonicalError>;

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let rem = self.remaining();
        if rem < n {
            return Err(CanonicalError::UnexpectedEof {
                at: self.pos,
                needed: n,
                remaining: rem,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u32_be(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_u64_be(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn take_hash256(&mut self) -> Result<Hash256> {
        let b = self.take(HASH256_LEN)?;
        let mut out = [0u8; HASH256_LEN];
        out.copy_from_slice(b);
        Ok(Hash256(out))
    }

    fn take_address(&mut self) -> Result<Address> {
        let b = self.take(ADDRESS_LEN)?;
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(b);
        Ok(Address(out))
    }

    fn expect_magic(&mut self, m: &[u8; 8]) -> Result<()> {
        let at = self.pos;
        let b = self.take(8)?;
        if b != m {
            return Err(CanonicalError::InvalidMagic { at });
        }
        Ok(())
    }

    fn take_bytes_len_u32(&mut self) -> Result<Vec<u8>> {
        let at = self.pos;
        let len = self.take_u32_be()? as usize;
        if len > self.remaining() {
            return Err(CanonicalError::UnexpectedEof {
                at,
                needed: len,
                remaining: self.remaining(),
            });
        }
        Ok(self.take(len)?.to_vec())
    }

    fn take_string_len_u32(&mut self) -> Result<String> {
        let at = self.pos;
        let bytes = self.take_bytes_len_u32()?;
        String::from_utf8(bytes).map_err(|_| CanonicalError::InvalidUtf8 { at })
    }

    /// Element count for a sequence; each element needs at least `min_elem` bytes.
    fn take_count(&mut self, min_elem: usize) -> Result<usize> {
        let at = self.pos;
        let n = self.take_u32_be()? as usize;
        let needed = n.saturating_mul(min_elem);
        if needed > self.remaining() {
            return Err(CanonicalError::UnexpectedEof {
                at,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(n)
    }

    fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(CanonicalError::LengthOverflow { at: self.pos });
        }
        Ok(())
    }
}

fn push_u32_be(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}
fn push_u64_be(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_len_u32(out: &mut Vec<u8>, len: usize) {
    let len_u32: u32 = len.try_into().unwrap_or(u32::MAX);
    push_u32_be(out, len_u32);
}

fn push_bytes_len_u32(out: &mut Vec<u8>, bytes: &[u8]) {
    push_len_u32(out, bytes.len());
    out.extend_from_slice(bytes);
}

fn push_pointer(out: &mut Vec<u8>, p: &Pointer) {
    out.extend_from_slice(&p.hash.0);
    push_u64_be(out, p.number.0);
}

fn take_pointer(c: &mut Cursor<'_>) -> Result<Pointer> {
    let hash = c.take_hash256()?;
    let number = Height(c.take_u64_be()?);
    Ok(Pointer { hash, number })
}

// ---------------- FruitHeader ----------------

fn write_fruit_header(out: &mut Vec<u8>, h: &FruitHeader) {
    out.extend_from_slice(&MAGIC_FRH);
    out.extend_from_slice(&h.parent.0);
    out.extend_from_slice(&h.coinbase.0);
    push_bytes_len_u32(out, &h.public_key.0);
    push_u64_be(out, h.time);
    push_u64_be(out, h.difficulty);
    push_u64_be(out, h.fast_number);
    push_pointer(out, &h.pointer);
    push_bytes_len_u32(out, &h.extra);
    push_u64_be(out, h.nonce);
}

fn read_fruit_header(c: &mut Cursor<'_>) -> Result<FruitHeader> {
    c.expect_magic(&MAGIC_FRH)?;
    let parent = c.take_hash256()?;
    let coinbase = c.take_address()?;
    let public_key = PublicKey(c.take_bytes_len_u32()?);
    let time = c.take_u64_be()?;
    let difficulty = c.take_u64_be()?;
    let fast_number = c.take_u64_be()?;
    let pointer = take_pointer(c)?;
    let extra = c.take_bytes_len_u32()?;
    let nonce = c.take_u64_be()?;
    Ok(FruitHeader {
        parent,
        coinbase,
        public_key,
        time,
        difficulty,
        fast_number,
        pointer,
        extra,
        nonce,
    })
}

pub fn encode_fruit_header(h: &FruitHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(160 + h.public_key.0.len() + h.extra.len());
    write_fruit_header(&mut out, h);
    out
}

pub fn decode_fruit_header(bytes: &[u8]) -> Result<FruitHeader> {
    let mut c = Cursor::new(bytes);
    let h = read_fruit_header(&mut c)?;
    c.finish()?;
    Ok(h)
}

// ---------------- BlockHeader ----------------

fn write_block_header(out: &mut Vec<u8>, h: &BlockHeader) {
    out.extend_from_slice(&MAGIC_BKH);
    out.extend_from_slice(&h.parent.0);
    out.extend_from_slice(&h.coinbase.0);
    push_bytes_len_u32(out, &h.public_key.0);
    push_u64_be(out, h.number.0);
    push_u64_be(out, h.time);
    push_u64_be(out, h.difficulty);
    push_u64_be(out, h.fast_number);
    push_pointer(out, &h.pointer);
    out.extend_from_slice(&h.uncle_hash.0);
    out.extend_from_slice(&h.fruits_hash.0);
    push_bytes_len_u32(out, &h.extra);
    push_u64_be(out, h.nonce);
}

fn read_block_header(c: &mut Cursor<'_>) -> Result<BlockHeader> {
    c.expect_magic(&MAGIC_BKH)?;
    let parent = c.take_hash256()?;
    let coinbase = c.take_address()?;
    let public_key = PublicKey(c.take_bytes_len_u32()?);
    let number = Height(c.take_u64_be()?);
    let time = c.take_u64_be()?;
    let difficulty = c.take_u64_be()?;
    let fast_number = c.take_u64_be()?;
    let pointer = take_pointer(c)?;
    let uncle_hash = c.take_hash256()?;
    let fruits_hash = c.take_hash256()?;
    let extra = c.take_bytes_len_u32()?;
    let nonce = c.take_u64_be()?;
    Ok(BlockHeader {
        parent,
        coinbase,
        public_key,
        number,
        time,
        difficulty,
        fast_number,
        pointer,
        uncle_hash,
        fruits_hash,
        extra,
        nonce,
    })
}

pub fn encode_block_header(h: &BlockHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(240 + h.public_key.0.len() + h.extra.len());
    write_block_header(&mut out, h);
    out
}

pub fn decode_block_header(bytes: &[u8]) -> Result<BlockHeader> {
    let mut c = Cursor::new(bytes);
    let h = read_block_header(&mut c)?;
    c.finish()?;
    Ok(h)
}

// ---------------- SnailHeader (tagged) ----------------

pub fn encode_header(h: &SnailHeader) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC_HDR);
    match h {
        SnailHeader::Fruit(f) => {
            out.push(TAG_FRUIT);
            write_fruit_header(&mut out, f);
        }
        SnailHeader::Block(b) => {
            out.push(TAG_BLOCK);
            write_block_header(&mut out, b);
        }
    }
    out
}

pub fn decode_header(bytes: &[u8]) -> Result<SnailHeader> {
    let mut c = Cursor::new(bytes);
    c.expect_magic(&MAGIC_HDR)?;
    let at = c.pos;
    let h = match c.take_u8()? {
        TAG_FRUIT => SnailHeader::Fruit(read_fruit_header(&mut c)?),
        TAG_BLOCK => SnailHeader::Block(read_block_header(&mut c)?),
        tag => return Err(CanonicalError::InvalidTag { at, tag }),
    };
    c.finish()?;
    Ok(h)
}

// ---------------- PbftSign ----------------

fn write_sign(out: &mut Vec<u8>, s: &PbftSign) {
    out.extend_from_slice(&MAGIC_SGN);
    push_u64_be(out, s.fast_height);
    out.push(s.result);
    out.extend_from_slice(&s.fast_hash.0);
    push_bytes_len_u32(out, &s.sign);
}

fn read_sign(c: &mut Cursor<'_>) -> Result<PbftSign> {
    c.expect_magic(&MAGIC_SGN)?;
    let fast_height = c.take_u64_be()?;
    let result = c.take_u8()?;
    let fast_hash = c.take_hash256()?;
    let sign = c.take_bytes_len_u32()?;
    Ok(PbftSign {
        fast_height,
        result,
        fast_hash,
        sign,
    })
}

fn write_signs(out: &mut Vec<u8>, signs: &[PbftSign]) {
    push_len_u32(out, signs.len());
    for s in signs {
        write_sign(out, s);
    }
}

fn read_signs(c: &mut Cursor<'_>) -> Result<Vec<PbftSign>> {
    // magic + height + result + hash + len
    let n = c.take_count(8 + 8 + 1 + HASH256_LEN + 4)?;
    let mut signs = Vec::with_capacity(n);
    for _ in 0..n {
        signs.push(read_sign(c)?);
    }
    Ok(signs)
}

// ---------------- Fruit ----------------

fn write_fruit(out: &mut Vec<u8>, f: &Fruit) {
    out.extend_from_slice(&MAGIC_FRT);
    write_fruit_header(out, &f.header);
    write_signs(out, &f.signs);
}

fn read_fruit(c: &mut Cursor<'_>) -> Result<Fruit> {
    c.expect_magic(&MAGIC_FRT)?;
    let header = read_fruit_header(c)?;
    let signs = read_signs(c)?;
    Ok(Fruit { header, signs })
}

pub fn encode_fruit(f: &Fruit) -> Vec<u8> {
    let mut out = Vec::new();
    write_fruit(&mut out, f);
    out
}

pub fn decode_fruit(bytes: &[u8]) -> Result<Fruit> {
    let mut c = Cursor::new(bytes);
    let f = read_fruit(&mut c)?;
    c.finish()?;
    Ok(f)
}

// ---------------- SnailBlock ----------------

pub fn encode_block(b: &SnailBlock) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC_BLK);
    write_block_header(&mut out, &b.header);

    push_len_u32(&mut out, b.fruits.len());
    for f in &b.fruits {
        write_fruit(&mut out, f);
    }
    write_signs(&mut out, &b.signs);
    push_len_u32(&mut out, b.uncles.len());
    for u in &b.uncles {
        write_block_header(&mut out, u);
    }
    out
}

pub fn decode_block(bytes: &[u8]) -> Result<SnailBlock> {
    let mut c = Cursor::new(bytes);
    c.expect_magic(&MAGIC_BLK)?;
    let header = read_block_header(&mut c)?;

    let fruit_count = c.take_count(16)?;
    let mut fruits = Vec::with_capacity(fruit_count);
    for _ in 0..fruit_count {
        fruits.push(read_fruit(&mut c)?);
    }

    let signs = read_signs(&mut c)?;

    let uncle_count = c.take_count(8)?;
    let mut uncles = Vec::with_capacity(uncle_count);
    for _ in 0..uncle_count {
        uncles.push(read_block_header(&mut c)?);
    }

    c.finish()?;
    Ok(SnailBlock {
        header,
        fruits,
        signs,
        uncles,
    })
}

// ---------------- ChainSpec ----------------

fn engine_tag(kind: EngineKind) -> u8 {
    match kind {
        EngineKind::Pow => 0,
        EngineKind::Fake => 1,
    }
}

pub fn encode_chainspec(spec: &ChainSpec) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC_CSP);
    push_u32_be(&mut out, spec.spec_version);
    push_u32_be(&mut out, spec.chain.chain_id);
    push_bytes_len_u32(&mut out, spec.chain.chain_name.as_bytes());

    let c = &spec.consensus;
    push_u64_be(&mut out, c.minimum_fruits);
    push_u64_be(&mut out, c.block_interval);
    push_u64_be(&mut out, c.pointer_freshness);
    push_u64_be(&mut out, c.minimum_difficulty);
    push_u64_be(&mut out, c.difficulty_bound_divisor);
    push_u64_be(&mut out, c.fruit_difficulty_divisor);
    out.push(engine_tag(c.engine));

    let g = &spec.genesis;
    push_u64_be(&mut out, g.time);
    push_u64_be(&mut out, g.difficulty);
    push_u64_be(&mut out, g.nonce);
    out.extend_from_slice(&g.coinbase.0);
    push_bytes_len_u32(&mut out, &g.extra);
    out
}

pub fn decode_chainspec(bytes: &[u8]) -> Result<ChainSpec> {
    let mut c = Cursor::new(bytes);
    c.expect_magic(&MAGIC_CSP)?;
    let spec_version = c.take_u32_be()?;
    let chain_id = c.take_u32_be()?;
    let chain_name = c.take_string_len_u32()?;

    let minimum_fruits = c.take_u64_be()?;
    let block_interval = c.take_u64_be()?;
    let pointer_freshness = c.take_u64_be()?;
    let minimum_difficulty = c.take_u64_be()?;
    let difficulty_bound_divisor = c.take_u64_be()?;
    let fruit_difficulty_divisor = c.take_u64_be()?;
    let at = c.pos;
    let engine = match c.take_u8()? {
        0 => EngineKind::Pow,
        1 => EngineKind::Fake,
        tag => return Err(CanonicalError::InvalidTag { at, tag }),
    };

    let time = c.take_u64_be()?;
    let difficulty = c.take_u64_be()?;
    let nonce = c.take_u64_be()?;
    let coinbase = c.take_address()?;
    let extra = c.take_bytes_len_u32()?;
    c.finish()?;

    Ok(ChainSpec {
        spec_version,
        chain: ChainParams { chain_name, chain_id },
        consensus: ConsensusParams {
            minimum_fruits,
            block_interval,
            pointer_freshness,
            minimum_difficulty,
            difficulty_bound_divisor,
            fruit_difficulty_divisor,
            engine,
        },
        genesis: GenesisSpec {
            time,
            difficulty,
            nonce,
            coinbase,
            extra,
        },
    })
}
