use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::rpc::ChainBackend;
use hnscan_core::name::hash_name;
use hnscan_core::params::COIN;
use hnscan_core::types::{
    ChainEntry, NameState, NodeInfo, Outpoint, PeerInfo, RpcBlock, RpcCovenant, RpcInput,
    RpcOutput, RpcTx,
};

pub const GENESIS_TIME: u64 = 1_600_000_000;

pub fn block_time(height: u32) -> u64 {
    GENESIS_TIME + u64::from(height) * 600
}

pub fn block_hash(height: u32, fork: u8) -> String {
    format!("{:02x}{:062x}", fork, height + 1)
}

pub fn entry_at(height: u32, fork: u8) -> ChainEntry {
    ChainEntry {
        hash: block_hash(height, fork),
        height,
        time: block_time(height),
        bits: 0x1d00ffff,
        chainwork: format!("{:064x}", u64::from(height + 1) * 0x1_0000),
        prev_block: if height == 0 {
            "00".repeat(32)
        } else {
            block_hash(height - 1, fork)
        },
        merkle_root: "00".repeat(32),
        tree_root: "00".repeat(32),
    }
}

fn covenant(cov_type: u8, items: Vec<String>) -> RpcCovenant {
    RpcCovenant {
        cov_type,
        action: String::new(),
        items,
    }
}

pub fn plain_output(value: u64, address: &str) -> RpcOutput {
    RpcOutput {
        value,
        address: address.into(),
        covenant: covenant(0, vec![]),
    }
}

pub fn open_output(name: &str, address: &str) -> RpcOutput {
    RpcOutput {
        value: 0,
        address: address.into(),
        covenant: covenant(2, vec![hash_name(name), "00000000".into(), hex::encode(name)]),
    }
}

pub fn bid_output(name: &str, lockup: u64, address: &str) -> RpcOutput {
    RpcOutput {
        value: lockup,
        address: address.into(),
        covenant: covenant(3, vec![hash_name(name), "00000000".into(), hex::encode(name)]),
    }
}

pub fn reveal_output(name: &str, value: u64, address: &str) -> RpcOutput {
    RpcOutput {
        value,
        address: address.into(),
        covenant: covenant(4, vec![hash_name(name), "00000000".into(), "00".repeat(32)]),
    }
}

pub fn register_output(name: &str, value: u64, address: &str) -> RpcOutput {
    RpcOutput {
        value,
        address: address.into(),
        covenant: covenant(6, vec![hash_name(name), "00000000".into(), "00".into()]),
    }
}

pub fn txid(salt: &str) -> String {
    hash_name(salt)
}

pub fn coinbase_tx(height: u32, miner: &str) -> RpcTx {
    RpcTx {
        txid: txid(&format!("coinbase-{}", height)),
        inputs: vec![RpcInput {
            prevout: Outpoint {
                hash: "00".repeat(32),
                index: u32::MAX,
            },
            witness: vec![],
            coin: None,
        }],
        outputs: vec![plain_output(2_000 * COIN, miner)],
        height: None,
        block: None,
        time: None,
        fee: None,
    }
}

pub fn spend_tx(salt: &str, spends: Vec<(String, u32)>, outputs: Vec<RpcOutput>) -> RpcTx {
    RpcTx {
        txid: txid(salt),
        inputs: spends
            .into_iter()
            .map(|(hash, index)| RpcInput {
                prevout: Outpoint { hash, index },
                witness: vec![],
                coin: None,
            })
            .collect(),
        outputs,
        height: None,
        block: None,
        time: None,
        fee: None,
    }
}

/// In-memory chain the indexer and query tests drive. Heights are vector
/// indexes; a reorg is `truncate` + new pushes with a different fork tag.
pub struct MockChain {
    blocks: Mutex<Vec<(ChainEntry, RpcBlock)>>,
    name_states: Mutex<HashMap<String, NameState>>,
    names_by_hash: Mutex<HashMap<String, String>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            name_states: Mutex::new(HashMap::new()),
            names_by_hash: Mutex::new(HashMap::new()),
        }
    }

    /// Append a block at the next height. The coinbase must already be the
    /// first transaction.
    pub fn push_block(&self, fork: u8, txs: Vec<RpcTx>) -> u32 {
        let mut blocks = self.blocks.lock();
        let height = blocks.len() as u32;
        let entry = entry_at(height, fork);
        let block = RpcBlock {
            hash: entry.hash.clone(),
            height,
            time: entry.time,
            bits: entry.bits,
            prev_block: entry.prev_block.clone(),
            merkle_root: entry.merkle_root.clone(),
            txs,
        };
        blocks.push((entry, block));
        height
    }

    /// Standard block: coinbase plus the given transactions.
    pub fn push_simple(&self, fork: u8, miner: &str, mut txs: Vec<RpcTx>) -> u32 {
        let height = self.blocks.lock().len() as u32;
        let mut all = vec![coinbase_tx(height, miner)];
        all.append(&mut txs);
        self.push_block(fork, all)
    }

    /// Drop every block above `height`, simulating the fork point of a
    /// reorganization.
    pub fn truncate(&self, height: u32) {
        self.blocks.lock().truncate(height as usize + 1);
    }

    pub fn blocks_len(&self) -> u32 {
        self.blocks.lock().len() as u32
    }

    pub fn set_name_state(&self, name: &str, state: NameState) {
        self.names_by_hash
            .lock()
            .insert(hash_name(name), name.to_string());
        self.name_states.lock().insert(name.to_string(), state);
    }
}

impl ChainBackend for MockChain {
    async fn tip(&self) -> Result<(u32, String)> {
        let blocks = self.blocks.lock();
        let (entry, _) = blocks.last().expect("mock chain is empty");
        Ok((entry.height, entry.hash.clone()))
    }

    async fn entry(&self, height: u32) -> Result<Option<ChainEntry>> {
        Ok(self
            .blocks
            .lock()
            .get(height as usize)
            .map(|(e, _)| e.clone()))
    }

    async fn entry_by_hash(&self, hash: &str) -> Result<Option<ChainEntry>> {
        Ok(self
            .blocks
            .lock()
            .iter()
            .find(|(e, _)| e.hash == hash)
            .map(|(e, _)| e.clone()))
    }

    async fn block(&self, height: u32) -> Result<Option<RpcBlock>> {
        Ok(self
            .blocks
            .lock()
            .get(height as usize)
            .map(|(_, b)| b.clone()))
    }

    async fn tx(&self, txid: &str) -> Result<Option<RpcTx>> {
        let blocks = self.blocks.lock();
        for (entry, block) in blocks.iter() {
            if let Some(tx) = block.txs.iter().find(|t| t.txid == txid) {
                let mut tx = tx.clone();
                tx.height = Some(entry.height);
                tx.block = Some(entry.hash.clone());
                tx.time = Some(entry.time);
                // resolve prevout coins the way the node's view does
                for input in &mut tx.inputs {
                    if let Some(prev) = blocks
                        .iter()
                        .flat_map(|(_, b)| b.txs.iter())
                        .find(|t| t.txid == input.prevout.hash)
                    {
                        if let Some(out) = prev.outputs.get(input.prevout.index as usize) {
                            input.coin = Some(hnscan_core::types::RpcCoin {
                                value: out.value,
                                address: out.address.clone(),
                                height: None,
                                coinbase: false,
                            });
                        }
                    }
                }
                return Ok(Some(tx));
            }
        }
        Ok(None)
    }

    async fn name_state(&self, name: &str) -> Result<Option<NameState>> {
        Ok(self.name_states.lock().get(name).cloned())
    }

    async fn name_by_hash(&self, name_hash: &str) -> Result<Option<String>> {
        Ok(self.names_by_hash.lock().get(name_hash).cloned())
    }

    async fn node_info(&self) -> Result<NodeInfo> {
        let blocks = self.blocks.lock();
        let mut info = NodeInfo::default();
        info.version = "mock/1.0.0".into();
        info.network = "regtest".into();
        if let Some((entry, _)) = blocks.last() {
            info.chain.height = entry.height;
            info.chain.tip = entry.hash.clone();
            info.chain.progress = 1.0;
        }
        Ok(info)
    }

    async fn net_totals(&self) -> Result<(u64, u64)> {
        Ok((0, 0))
    }

    async fn mempool_txids(&self) -> Result<Vec<String>> {
        Ok(vec![])
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>> {
        Ok(vec![])
    }
}
