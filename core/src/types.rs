use serde::{Deserialize, Serialize};

/// Chain entry as served by the node's header endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub hash: String,
    pub height: u32,
    pub time: u64,
    pub bits: u32,
    #[serde(default)]
    pub chainwork: String,
    pub prev_block: String,
    #[serde(default)]
    pub merkle_root: String,
    #[serde(default)]
    pub tree_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outpoint {
    pub hash: String,
    pub index: u32,
}

/// Resolved previous output attached to an input when the node serves a
/// block or transaction view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCoin {
    pub value: u64,
    pub address: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub coinbase: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcInput {
    pub prevout: Outpoint,
    #[serde(default)]
    pub witness: Vec<String>,
    #[serde(default)]
    pub coin: Option<RpcCoin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCovenant {
    #[serde(rename = "type")]
    pub cov_type: u8,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcOutput {
    pub value: u64,
    pub address: String,
    pub covenant: RpcCovenant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTx {
    pub txid: String,
    pub inputs: Vec<RpcInput>,
    pub outputs: Vec<RpcOutput>,
    /// Confirmation metadata, present when fetched by hash.
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub fee: Option<u64>,
}

impl RpcTx {
    /// The coinbase transaction is the first in a block; its inputs spend
    /// the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs
            .iter()
            .all(|i| i.prevout.hash.bytes().all(|b| b == b'0'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub hash: String,
    pub height: u32,
    pub time: u64,
    pub bits: u32,
    pub prev_block: String,
    #[serde(default)]
    pub merkle_root: String,
    pub txs: Vec<RpcTx>,
}

/// Name-state snapshot from the node's name database. Fields are sparse
/// because the node omits the ones a state has not reached yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameState {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_hash: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub renewal: Option<u32>,
    #[serde(default)]
    pub renewals: Option<u32>,
    #[serde(default)]
    pub value: Option<u64>,
    #[serde(default)]
    pub highest: Option<u64>,
    #[serde(default)]
    pub transfer: Option<u32>,
    #[serde(default)]
    pub revoked: Option<u32>,
    #[serde(default)]
    pub expired: Option<bool>,
    #[serde(default)]
    pub weak: Option<bool>,
    #[serde(default)]
    pub registered: Option<bool>,
    #[serde(default)]
    pub stats: Option<NameStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameStats {
    #[serde(default)]
    pub open_period_start: Option<u32>,
    #[serde(default)]
    pub open_period_end: Option<u32>,
    #[serde(default)]
    pub blocks_until_bidding: Option<u32>,
    #[serde(default)]
    pub bid_period_start: Option<u32>,
    #[serde(default)]
    pub bid_period_end: Option<u32>,
    #[serde(default)]
    pub blocks_until_reveal: Option<u32>,
    #[serde(default)]
    pub reveal_period_start: Option<u32>,
    #[serde(default)]
    pub reveal_period_end: Option<u32>,
    #[serde(default)]
    pub blocks_until_close: Option<u32>,
    #[serde(default)]
    pub renewal_period_start: Option<u32>,
    #[serde(default)]
    pub renewal_period_end: Option<u32>,
    #[serde(default)]
    pub blocks_until_expire: Option<u32>,
    #[serde(default)]
    pub days_until_expire: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainInfo {
    pub height: u32,
    #[serde(default)]
    pub tip: String,
    #[serde(default)]
    pub progress: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolInfo {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub outbound: u32,
    #[serde(default)]
    pub inbound: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MempoolInfo {
    #[serde(default)]
    pub tx: u64,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeInfo {
    #[serde(default)]
    pub uptime: u64,
}

/// Snapshot of the upstream node served at its info endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub network: String,
    pub chain: ChainInfo,
    #[serde(default)]
    pub pool: PoolInfo,
    #[serde(default)]
    pub mempool: MempoolInfo,
    #[serde(default)]
    pub time: TimeInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub subver: String,
    #[serde(default)]
    pub inbound: bool,
    #[serde(default)]
    pub bytessent: u64,
    #[serde(default)]
    pub bytesrecv: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_block_with_covenants() {
        let raw = serde_json::json!({
            "hash": "aa".repeat(32),
            "height": 7,
            "time": 1_600_000_000u64,
            "bits": 0x1d00ffffu32,
            "prevBlock": "bb".repeat(32),
            "txs": [{
                "txid": "cc".repeat(32),
                "inputs": [{"prevout": {"hash": "00".repeat(32), "index": 0xffffffffu32}, "witness": []}],
                "outputs": [{
                    "value": 2000000000u64,
                    "address": "hs1qexample",
                    "covenant": {"type": 2, "action": "OPEN", "items": ["ab", "01000000", "616c696365"]}
                }]
            }]
        });
        let block: RpcBlock = serde_json::from_value(raw).unwrap();
        assert_eq!(block.height, 7);
        assert!(block.txs[0].is_coinbase());
        assert_eq!(block.txs[0].outputs[0].covenant.cov_type, 2);
    }

    #[test]
    fn name_state_tolerates_sparse_fields() {
        let ns: NameState = serde_json::from_str(r#"{"state":"BIDDING","height":10}"#).unwrap();
        assert_eq!(ns.state.as_deref(), Some("BIDDING"));
        assert_eq!(ns.value, None);
    }
}
