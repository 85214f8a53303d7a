#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use snail_chain::chainspec::{load_chainspec_from_path, test_chainspec, ChainSpecError};
use snail_chain::miner::Miner;
use snail_chain::state::ChainStateError;
use snail_chain::{MinerIdentity, SnailChain};
use snail_db::store::{ChainStore, ChainTip, DbChainStore, SnailChainReader};
use snail_db::{DbError, MemKv, SledKv};
use snail_types::{Address, ChainSpec, PublicKey};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_ROUNDS: usize = 3;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("chainspec: {0}")]
    Spec(#[from] ChainSpecError),

    #[error("chain: {0}")]
    Chain(#[from] ChainStateError),

    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("usage: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;

/// Installs the fmt subscriber; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    pub chainspec: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub rounds: usize,
}

impl NodeConfig {
    /// `[chainspec.toml] [rounds]`; the store is persistent when `data_dir`
    /// is set.
    pub fn from_args<I>(args: I, data_dir: Option<PathBuf>) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let chainspec = args.next().map(PathBuf::from);
        let rounds = match args.next() {
            Some(r) => r
                .parse()
                .map_err(|_| NodeError::Usage(format!("rounds must be a number, got {r:?}")))?,
            None => DEFAULT_ROUNDS,
        };
        if let Some(extra) = args.next() {
            return Err(NodeError::Usage(format!("unexpected argument {extra:?}")));
        }
        Ok(Self {
            chainspec,
            data_dir,
            rounds,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeReport {
    pub tip: ChainTip,
    pub mined: usize,
}

pub fn load_spec(path: Option<&Path>) -> Result<ChainSpec> {
    match path {
        Some(p) => Ok(load_chainspec_from_path(p)?),
        None => Ok(test_chainspec()),
    }
}

/// Identity used by the development miner.
pub fn dev_identity() -> MinerIdentity {
    MinerIdentity {
        public_key: PublicKey(vec![0x02; 33]),
        coinbase: Address([0xde; 20]),
    }
}

/// Opens the chain on `store`, mines `rounds` blocks of the minimum fruit
/// count, then re-verifies the canonical chain.
pub fn run_dev_miner<S>(store: S, spec: ChainSpec, rounds: usize) -> Result<NodeReport>
where
    S: ChainStore + SnailChainReader,
{
    let fruits = spec.consensus.minimum_fruits;
    let mut chain = SnailChain::open_or_init(store, spec)?;
    info!(
        chain = %chain.spec().chain.chain_name,
        height = chain.tip().height.0,
        engine = ?chain.spec().consensus.engine,
        "snail node started"
    );

    let miner = Miner::new(dev_identity(), fruits);
    let mined = miner.run(&mut chain, rounds);
    chain.verify_canonical_chain()?;

    let tip = chain.tip();
    info!(height = tip.height.0, mined, "snail node done");
    Ok(NodeReport { tip, mined })
}

pub fn run(config: &NodeConfig) -> Result<NodeReport> {
    let spec = load_spec(config.chainspec.as_deref())?;
    match &config.data_dir {
        Some(dir) => {
            let kv = SledKv::open(dir)?;
            let report = run_dev_miner(DbChainStore::new(kv.clone()), spec, config.rounds)?;
            kv.close()?;
            Ok(report)
        }
        None => run_dev_miner(DbChainStore::new(MemKv::new()), spec, config.rounds),
    }
}
