use serde::{Deserialize, Serialize};

/// One indexed block, keyed by height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub height: u32,
    pub hash: String,
    pub difficulty: f64,
    pub time: u64,
    pub txs: u32,
    pub miner: String,
    pub miner_address: String,
}

/// One indexed transaction, keyed by txid. `addresses` is the set of every
/// address that funded or received the transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    pub txid: String,
    pub height: u32,
    pub hash: String,
    pub time: u64,
    pub addresses: Vec<String>,
}

/// One output, keyed by (txid, index). Spend tracking is denormalized onto
/// the record; `spent_txid`/`spent_index` are present iff `spent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinRecord {
    pub txid: String,
    pub index: u32,
    pub height: u32,
    pub time: u64,
    pub address: String,
    pub value: u64,
    pub covenant_type: u8,
    pub covenant_items: Vec<String>,
    pub name_hash: Option<String>,
    pub spent: bool,
    pub spent_txid: Option<String>,
    pub spent_index: Option<u32>,
}

/// Auction facts per name hash. `value` is the second-highest reveal so far
/// (the price the winner pays), `highest` the highest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRecord {
    pub name_hash: String,
    pub name: String,
    pub open: u32,
    pub value: u64,
    pub highest: u64,
    #[serde(default)]
    pub registered: bool,
}

/// Rolling per-UTC-day counters. `total_txs`, `supply` and `burned` are
/// cumulative; the rest reset each day. Supply and burned are whole coins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub time: u64,
    pub blocks: u32,
    pub txs: u64,
    pub total_txs: u64,
    pub difficulty: f64,
    pub supply: f64,
    pub burned: f64,
}

impl NameRecord {
    /// Second-price update for a revealed bid. The running pair is
    /// (winner, runner-up); `value` never exceeds `highest`.
    pub fn apply_reveal(&mut self, revealed: u64) {
        if revealed <= self.value {
            return;
        }
        if revealed <= self.highest {
            self.value = revealed;
        } else {
            self.value = self.highest;
            self.highest = revealed;
        }
    }
}
