use anyhow::Result;
use primitive_types::U256;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::ExplorerDB;
use crate::rpc::ChainBackend;
use hnscan_core::{
    Covenant, NetworkParams, PoolTable, chainwork_to_u256, difficulty_from_bits, name,
    verify_address_syntax,
};

/// Number of trailing blocks the hashrate estimate spans.
const HASHRATE_LOOKUP: u32 = 120;

/// Mempool transactions examined when filtering by address.
const MEMPOOL_ADDRESS_SCAN_CAP: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
    pub result: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerView {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub height: u32,
    pub hash: String,
    pub prev_block: String,
    pub merkle_root: String,
    pub time: u64,
    pub median_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_hash: Option<String>,
    pub bits: u32,
    pub difficulty: f64,
    pub chainwork: String,
    pub tx_count: usize,
    pub miner: MinerView,
    pub reward: u64,
    pub fees: u64,
    pub average_fee: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txs: Option<Vec<TxView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coinbase_witness: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub coinbase: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub airdrop: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    pub address: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxView {
    pub txid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutpointView {
    pub txid: String,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidView {
    pub txid: String,
    pub index: u32,
    pub lockup: u64,
    pub time: u64,
    pub revealed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal: Option<OutpointView>,
    pub value: u64,
    pub win: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameView {
    pub name: String,
    pub name_hash: String,
    pub state: String,
    pub next_state: String,
    pub reserved: bool,
    pub release: u32,
    pub open: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewals: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<u32>,
    pub weak: bool,
    pub value: u64,
    pub highest: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks_until: Option<u32>,
    pub bids: Vec<BidView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameSummary {
    pub name: String,
    pub name_hash: String,
    pub open: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub value: u64,
    pub highest: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub action: String,
    pub txid: String,
    pub index: u32,
    pub height: u32,
    pub time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBalance {
    pub hash: String,
    pub confirmed: u64,
    pub unconfirmed: u64,
    pub received: u64,
    pub spent: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolShare {
    pub pool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolDistribution {
    pub total: u64,
    pub items: Vec<PoolShare>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    /// Milliseconds, chart-friendly.
    pub date: u64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCounts {
    pub network: String,
    pub chain_work: String,
    pub difficulty: f64,
    pub hashrate: f64,
    pub unconfirmed: u64,
    pub unconfirmed_size: u64,
    pub registered_names: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub host: String,
    pub port: u16,
    pub key: bool,
    pub network: String,
    pub progress: f64,
    pub version: String,
    pub agent: String,
    pub connections: u32,
    pub height: u32,
    pub difficulty: f64,
    pub uptime: u64,
    pub total_bytes_recv: u64,
    pub total_bytes_sent: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStatus {
    Opening,
    Bidding,
    Reveal,
    Closed,
}

impl NameStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "opening" => Some(NameStatus::Opening),
            "bidding" => Some(NameStatus::Bidding),
            "reveal" => Some(NameStatus::Reveal),
            // locked names are closed auctions under claim lockup
            "closed" | "locked" => Some(NameStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Difficulty,
    DailyTransactions,
    DailyTotalTransactions,
    Supply,
    Burned,
}

impl ChartType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "difficulty" => Some(ChartType::Difficulty),
            "dailyTransactions" => Some(ChartType::DailyTransactions),
            "dailyTotalTransactions" => Some(ChartType::DailyTotalTransactions),
            "supply" => Some(ChartType::Supply),
            "burned" => Some(ChartType::Burned),
            _ => None,
        }
    }
}

/// Read-side assembly of explorer responses: indexed records joined with
/// live consensus data from the node. Never writes to the store and never
/// takes the index gate.
pub struct Query<C> {
    db: Arc<ExplorerDB>,
    chain: Arc<C>,
    params: NetworkParams,
    pools: PoolTable,
}

impl<C: ChainBackend> Query<C> {
    pub fn new(db: Arc<ExplorerDB>, chain: Arc<C>, params: NetworkParams, pools: PoolTable) -> Self {
        Self {
            db,
            chain,
            params,
            pools,
        }
    }

    pub fn head(&self) -> Result<Option<u32>> {
        self.db.head()
    }

    // ---- blocks ----

    pub async fn get_block(&self, height: u32, details: bool) -> Result<Option<BlockView>> {
        let Some(entry) = self.chain.entry(height).await? else {
            return Ok(None);
        };
        let Some(block) = self.chain.block(height).await? else {
            return Ok(None);
        };
        let median_time = self.chain.median_time(&entry).await?;
        let next_hash = self.chain.next_hash(&entry).await?;

        let coinbase = block.txs.first();
        let coinbase_value: u64 = coinbase
            .map(|tx| tx.outputs.iter().map(|o| o.value).sum())
            .unwrap_or(0);
        let reward = self.params.get_reward(height);
        let fees = coinbase_value.saturating_sub(reward);
        let tx_count = block.txs.len();
        let average_fee = fees / tx_count.max(1) as u64;

        let miner_address = coinbase
            .and_then(|tx| tx.outputs.first())
            .map(|o| o.address.clone())
            .unwrap_or_default();
        let miner_name = self.pools.attribute(&miner_address).to_string();
        let miner = MinerView {
            url: self.pools.url_of(&miner_name).map(|u| u.to_string()),
            name: miner_name,
            address: miner_address,
        };

        let (txs, coinbase_witness) = if details {
            let mut views = Vec::with_capacity(tx_count);
            for tx in &block.txs {
                if let Some(view) = self.get_transaction(&tx.txid).await? {
                    views.push(view);
                }
            }
            let witness = coinbase
                .and_then(|tx| tx.inputs.first())
                .map(|i| i.witness.clone());
            (Some(views), witness)
        } else {
            (None, None)
        };

        Ok(Some(BlockView {
            height,
            hash: entry.hash,
            prev_block: entry.prev_block,
            merkle_root: entry.merkle_root,
            time: entry.time,
            median_time,
            next_hash,
            bits: entry.bits,
            difficulty: difficulty_from_bits(entry.bits),
            chainwork: entry.chainwork,
            tx_count,
            miner,
            reward,
            fees,
            average_fee,
            txs,
            coinbase_witness,
        }))
    }

    pub async fn get_blocks(&self, offset: usize, limit: usize) -> Result<Page<BlockView>> {
        let head = self.db.head()?.unwrap_or(0);
        let mut result = Vec::with_capacity(limit);
        // offset counts blocks back from the tip
        let mut height = head.saturating_sub(offset as u32);
        loop {
            if let Some(view) = self.get_block(height, false).await? {
                result.push(view);
            }
            if height == 0 || result.len() >= limit {
                break;
            }
            height -= 1;
        }
        Ok(Page {
            total: u64::from(head) + 1,
            limit,
            offset,
            result,
        })
    }

    // ---- transactions ----

    pub async fn get_transaction(&self, txid: &str) -> Result<Option<TxView>> {
        let Some(tx) = self.chain.tx(txid).await? else {
            return Ok(None);
        };
        let is_coinbase = tx.is_coinbase();

        let mut inputs = Vec::with_capacity(tx.inputs.len());
        for (i, input) in tx.inputs.iter().enumerate() {
            let view = if let Some(coin) = &input.coin {
                InputView {
                    value: Some(coin.value),
                    address: Some(coin.address.clone()),
                    coinbase: false,
                    airdrop: false,
                }
            } else if is_coinbase && i == 0 {
                InputView {
                    value: Some(self.params.get_reward(tx.height.unwrap_or(0))),
                    address: None,
                    coinbase: true,
                    airdrop: false,
                }
            } else {
                InputView {
                    value: None,
                    address: None,
                    coinbase: false,
                    airdrop: true,
                }
            };
            inputs.push(view);
        }

        let mut outputs = Vec::with_capacity(tx.outputs.len());
        for output in &tx.outputs {
            let covenant =
                Covenant::from_type(output.covenant.cov_type).unwrap_or(Covenant::None);
            let name_hash = covenant
                .is_name()
                .then(|| output.covenant.items.first().cloned())
                .flatten();
            // OPEN, CLAIM and BID carry the raw name in items[2]
            let mut name = match covenant {
                Covenant::Claim | Covenant::Open | Covenant::Bid => output
                    .covenant
                    .items
                    .get(2)
                    .and_then(|item| name::name_from_item(item)),
                _ => None,
            };
            if name.is_none() && covenant.is_name() {
                if let Some(nh) = &name_hash {
                    name = self.chain.name_by_hash(nh).await?;
                }
            }
            let value = match covenant {
                Covenant::None | Covenant::Bid | Covenant::Reveal => Some(output.value),
                _ => None,
            };
            let nonce = (covenant == Covenant::Reveal)
                .then(|| output.covenant.items.get(2).cloned())
                .flatten();
            outputs.push(OutputView {
                value,
                address: output.address.clone(),
                action: covenant.action_name().to_string(),
                name_hash,
                name,
                nonce,
            });
        }

        Ok(Some(TxView {
            txid: tx.txid,
            height: tx.height,
            block: tx.block,
            time: tx.time,
            fee: tx.fee,
            inputs,
            outputs,
        }))
    }

    async fn join_txs(&self, txids: &[String]) -> Result<Vec<TxView>> {
        let mut views = Vec::with_capacity(txids.len());
        for txid in txids {
            if let Some(view) = self.get_transaction(txid).await? {
                views.push(view);
            }
        }
        Ok(views)
    }

    pub async fn get_transactions_by_address(
        &self,
        address: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<TxView>> {
        let total = self.db.count_txs_by_address(address)?;
        let txids = self.db.txids_by_address(address, offset, limit)?;
        Ok(Page {
            total,
            limit,
            offset,
            result: self.join_txs(&txids).await?,
        })
    }

    pub async fn get_transactions_by_height(
        &self,
        height: u32,
        offset: usize,
        limit: usize,
    ) -> Result<Page<TxView>> {
        let txids = self.db.txids_by_height(height)?;
        let page: Vec<String> = txids.iter().skip(offset).take(limit).cloned().collect();
        Ok(Page {
            total: txids.len() as u64,
            limit,
            offset,
            result: self.join_txs(&page).await?,
        })
    }

    /// All transactions indexed so far, from the newest day summary.
    pub fn total_txs(&self) -> Result<u64> {
        Ok(self
            .db
            .latest_summary()?
            .map(|s| s.total_txs)
            .unwrap_or(0))
    }

    /// Latest transactions, walking the chain backwards from the tip.
    pub async fn get_transactions(&self, limit: usize) -> Result<Vec<TxView>> {
        let Some(head) = self.db.head()? else {
            return Ok(Vec::new());
        };
        let mut txids = Vec::with_capacity(limit);
        let mut height = head;
        loop {
            for txid in self.db.txids_by_height(height)? {
                if txids.len() < limit {
                    txids.push(txid);
                }
            }
            if height == 0 || txids.len() >= limit {
                break;
            }
            height -= 1;
        }
        self.join_txs(&txids).await
    }

    // ---- names ----

    pub async fn get_name(&self, raw_name: &str) -> Result<Option<NameView>> {
        let name_hash = name::hash_name(raw_name);
        let reserved = name::is_reserved(raw_name);
        let release = name::rollout_height(&name_hash, &self.params);
        let state = self.chain.name_state(raw_name).await?;
        let rec = self.db.get_name(&name_hash)?;

        let current = match &state {
            Some(ns) if ns.expired != Some(true) => {
                ns.state.clone().unwrap_or_else(|| "INACTIVE".to_string())
            }
            _ => "INACTIVE".to_string(),
        };
        let next_state = match current.as_str() {
            "OPENING" => "BIDDING",
            "BIDDING" => "REVEAL",
            "REVEAL" => "CLOSED",
            "CLOSED" => "RENEWAL",
            _ => "OPENING",
        };
        let open = rec
            .as_ref()
            .map(|r| r.open)
            .or_else(|| state.as_ref().and_then(|ns| ns.height))
            .unwrap_or(0);
        let blocks_until = state.as_ref().and_then(|ns| ns.stats.as_ref()).and_then(|s| {
            s.blocks_until_bidding
                .or(s.blocks_until_reveal)
                .or(s.blocks_until_close)
                .or(s.blocks_until_expire)
        });
        let bids = self.get_name_bids(&name_hash, open)?;

        Ok(Some(NameView {
            name: raw_name.to_string(),
            name_hash,
            state: current,
            next_state: next_state.to_string(),
            reserved,
            release,
            open,
            height: state.as_ref().and_then(|ns| ns.height),
            renewal: state.as_ref().and_then(|ns| ns.renewal),
            renewals: state.as_ref().and_then(|ns| ns.renewals),
            transfer: state.as_ref().and_then(|ns| ns.transfer).filter(|&t| t != 0),
            revoked: state.as_ref().and_then(|ns| ns.revoked).filter(|&r| r != 0),
            weak: state.as_ref().and_then(|ns| ns.weak).unwrap_or(false),
            value: state
                .as_ref()
                .and_then(|ns| ns.value)
                .or_else(|| rec.as_ref().map(|r| r.value))
                .unwrap_or(0),
            highest: state
                .as_ref()
                .and_then(|ns| ns.highest)
                .or_else(|| rec.as_ref().map(|r| r.highest))
                .unwrap_or(0),
            blocks_until,
            bids,
        }))
    }

    /// All bids for a name, newest first, with reveal joins and the winner
    /// flagged. Bids from before `open_height` belong to an earlier auction
    /// of the same name and never win the current one.
    pub fn get_name_bids(&self, name_hash: &str, open_height: u32) -> Result<Vec<BidView>> {
        let coins = self.db.coins_by_name(name_hash)?;
        let mut bids = Vec::new();
        let mut winner: Option<(String, u32, u64)> = None;

        for coin in &coins {
            if coin.covenant_type != Covenant::Bid as u8 {
                continue;
            }
            let mut bid = BidView {
                txid: coin.txid.clone(),
                index: coin.index,
                lockup: coin.value,
                time: coin.time,
                revealed: false,
                reveal: None,
                value: 0,
                win: false,
            };
            if coin.spent {
                if let (Some(stxid), Some(sidx)) = (&coin.spent_txid, coin.spent_index) {
                    if let Some(reveal) = self.db.get_coin(stxid, sidx)? {
                        if reveal.covenant_type == Covenant::Reveal as u8 {
                            bid.revealed = true;
                            bid.value = reveal.value;
                            bid.reveal = Some(OutpointView {
                                txid: reveal.txid,
                                index: reveal.index,
                            });
                            let beats = winner.as_ref().is_none_or(|(_, _, v)| reveal.value > *v);
                            if coin.height > open_height && beats {
                                winner = Some((coin.txid.clone(), coin.index, reveal.value));
                            }
                        }
                    }
                }
            }
            bids.push(bid);
        }

        if let Some((wtxid, windex, _)) = winner {
            for bid in &mut bids {
                if bid.txid == wtxid && bid.index == windex {
                    bid.win = true;
                }
            }
        }
        bids.sort_by(|a, b| b.time.cmp(&a.time));
        Ok(bids)
    }

    pub fn get_name_history(
        &self,
        name_hash: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<HistoryEvent>> {
        let total = self.db.count_coins_by_name(name_hash)?;
        let coins = self.db.coins_by_name_rev(name_hash, offset, limit)?;
        let result = coins
            .into_iter()
            .filter_map(|coin| {
                let covenant = Covenant::from_type(coin.covenant_type)?;
                Some(HistoryEvent {
                    action: covenant.action_label().to_string(),
                    txid: coin.txid,
                    index: coin.index,
                    height: coin.height,
                    time: coin.time,
                    value: covenant.carries_value().then_some(coin.value),
                })
            })
            .collect();
        Ok(Page {
            total,
            limit,
            offset,
            result,
        })
    }

    /// Height window a lifecycle status occupies, inverted from the auction
    /// phase lengths: a name opened within `(min, max]` is in that phase now.
    fn status_window(&self, status: NameStatus, head: u32) -> (u32, u32) {
        let op = self.params.open_period();
        let bp = self.params.bidding_period;
        let rp = self.params.reveal_period;
        match status {
            NameStatus::Opening => (head.saturating_sub(op), head),
            NameStatus::Bidding => (head.saturating_sub(op + bp), head.saturating_sub(op)),
            NameStatus::Reveal => (
                head.saturating_sub(op + bp + rp),
                head.saturating_sub(op + bp),
            ),
            NameStatus::Closed => (0, head.saturating_sub(op + bp + rp)),
        }
    }

    pub async fn get_names_by_status(
        &self,
        status: NameStatus,
        offset: usize,
        limit: usize,
    ) -> Result<Page<NameSummary>> {
        let head = self.db.head()?.unwrap_or(0);
        let (min, max) = self.status_window(status, head);
        let total = self.db.count_names_by_open_window(min, max)?;
        let records = self.db.names_by_open_window(min, max, offset, limit)?;

        let mut result = Vec::with_capacity(records.len());
        for rec in records {
            let state = self
                .chain
                .name_state(&rec.name)
                .await?
                .and_then(|ns| ns.state);
            result.push(NameSummary {
                name: rec.name,
                name_hash: rec.name_hash,
                open: rec.open,
                state,
                value: rec.value,
                highest: rec.highest,
            });
        }
        Ok(Page {
            total,
            limit,
            offset,
            result,
        })
    }

    /// Top names by the price the winner pays.
    pub fn get_names_by_value(&self, offset: usize, limit: usize) -> Result<Page<NameSummary>> {
        let records = self.db.top_names_by_value(offset, limit)?;
        let result = records
            .into_iter()
            .map(|rec| NameSummary {
                name: rec.name,
                name_hash: rec.name_hash,
                open: rec.open,
                state: None,
                value: rec.value,
                highest: rec.highest,
            })
            .collect();
        Ok(Page {
            total: self.db.count_names()?,
            limit,
            offset,
            result,
        })
    }

    // ---- addresses ----

    pub fn get_address(&self, address: &str) -> Result<AddressBalance> {
        let coins = self.db.coins_by_address(address)?;
        let mut received = 0u64;
        let mut spent = 0u64;
        for coin in &coins {
            received += coin.value;
            if coin.spent {
                spent += coin.value;
            }
        }
        let confirmed = received - spent;
        Ok(AddressBalance {
            hash: address.to_string(),
            confirmed,
            unconfirmed: confirmed,
            received,
            spent,
        })
    }

    pub async fn get_address_mempool(&self, address: &str) -> Result<Vec<TxView>> {
        let txids = self.chain.mempool_txids().await?;
        let mut views = Vec::new();
        for txid in txids.iter().take(MEMPOOL_ADDRESS_SCAN_CAP) {
            let Some(view) = self.get_transaction(txid).await? else {
                continue;
            };
            let touches = view
                .inputs
                .iter()
                .any(|i| i.address.as_deref() == Some(address))
                || view.outputs.iter().any(|o| o.address == address);
            if touches {
                views.push(view);
            }
        }
        Ok(views)
    }

    // ---- mempool / peers / status ----

    pub async fn get_mempool_page(&self, offset: usize, limit: usize) -> Result<(u64, Vec<TxView>)> {
        let txids = self.chain.mempool_txids().await?;
        let page: Vec<String> = txids.iter().skip(offset).take(limit).cloned().collect();
        Ok((txids.len() as u64, self.join_txs(&page).await?))
    }

    pub async fn get_peers(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(u64, Vec<hnscan_core::PeerInfo>)> {
        let peers = self.chain.peers().await?;
        let page = peers.iter().skip(offset).take(limit).cloned().collect();
        Ok((peers.len() as u64, page))
    }

    pub async fn get_peers_all(&self) -> Result<Vec<hnscan_core::PeerInfo>> {
        self.chain.peers().await
    }

    /// Network hashrate over the last `HASHRATE_LOOKUP` blocks, from the
    /// chainwork delta per elapsed second.
    async fn hashrate(&self, tip_height: u32) -> Result<f64> {
        let lo_height = tip_height.saturating_sub(HASHRATE_LOOKUP);
        let (Some(hi), Some(lo)) = (
            self.chain.entry(tip_height).await?,
            self.chain.entry(lo_height).await?,
        ) else {
            return Ok(0.0);
        };
        let (Some(hi_work), Some(lo_work)) = (
            chainwork_to_u256(&hi.chainwork),
            chainwork_to_u256(&lo.chainwork),
        ) else {
            return Ok(0.0);
        };
        let elapsed = hi.time.saturating_sub(lo.time);
        if elapsed == 0 || hi_work <= lo_work {
            return Ok(0.0);
        }
        let delta = (hi_work - lo_work).min(U256::from(u128::MAX)).as_u128();
        Ok(delta as f64 / elapsed as f64)
    }

    pub async fn get_summary_counts(&self) -> Result<SummaryCounts> {
        let info = self.chain.node_info().await?;
        let tip = self.chain.entry(info.chain.height).await?;
        let (chain_work, difficulty) = tip
            .map(|e| (e.chainwork.clone(), difficulty_from_bits(e.bits)))
            .unwrap_or_default();
        Ok(SummaryCounts {
            network: info.network,
            chain_work,
            difficulty,
            hashrate: self.hashrate(info.chain.height).await?,
            unconfirmed: info.mempool.tx,
            unconfirmed_size: info.mempool.size,
            registered_names: self.db.registered_names()?,
        })
    }

    pub async fn get_status(&self, host: &str, port: u16, has_key: bool) -> Result<StatusView> {
        let info = self.chain.node_info().await?;
        let (recv, sent) = self.chain.net_totals().await?;
        let difficulty = self
            .chain
            .entry(info.chain.height)
            .await?
            .map(|e| difficulty_from_bits(e.bits))
            .unwrap_or(0.0);
        Ok(StatusView {
            host: host.to_string(),
            port,
            key: has_key,
            network: info.network,
            progress: info.chain.progress,
            version: info.version,
            agent: info.pool.agent,
            connections: info.pool.outbound + info.pool.inbound,
            height: info.chain.height,
            difficulty,
            uptime: info.time.uptime,
            total_bytes_recv: recv,
            total_bytes_sent: sent,
        })
    }

    // ---- aggregations ----

    pub fn get_pool_distribution(&self, start: u64, end: u64) -> Result<PoolDistribution> {
        let blocks = self.db.blocks_in_time_window(start, end)?;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for block in &blocks {
            *counts.entry(block.miner.clone()).or_default() += 1;
        }
        let mut items: Vec<PoolShare> = counts
            .into_iter()
            .map(|(pool_name, count)| PoolShare {
                url: self.pools.url_of(&pool_name).map(|u| u.to_string()),
                pool_name,
                count,
            })
            .collect();
        items.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(PoolDistribution {
            total: blocks.len() as u64,
            items,
        })
    }

    pub fn get_series(&self, chart: ChartType, start: u64, end: u64) -> Result<Vec<SeriesPoint>> {
        let summaries = self.db.summaries_in_range(start, end)?;
        let points = summaries
            .into_iter()
            .map(|s| {
                let value = match chart {
                    ChartType::Difficulty => {
                        if s.blocks > 0 {
                            s.difficulty / f64::from(s.blocks)
                        } else {
                            0.0
                        }
                    }
                    ChartType::DailyTransactions => s.txs as f64,
                    ChartType::DailyTotalTransactions => s.total_txs as f64,
                    ChartType::Supply => (s.supply * 100.0).round() / 100.0,
                    ChartType::Burned => (s.burned * 100.0).round() / 100.0,
                };
                SeriesPoint {
                    date: s.time * 1000,
                    value,
                }
            })
            .collect();
        Ok(points)
    }

    // ---- search ----

    pub fn search(&self, q: &str) -> Result<Vec<SearchHit>> {
        let q = q.trim();
        let mut hits = Vec::new();
        if q.is_empty() {
            return Ok(hits);
        }
        let head = self.db.head()?.unwrap_or(0);

        let numeric = q.parse::<u32>().ok();
        if let Some(height) = numeric {
            if height <= head {
                hits.push(SearchHit {
                    kind: "Block",
                    url: format!("/block/{}", height),
                });
            }
        }

        let lower = q.to_ascii_lowercase();
        if lower.len() == 64 && lower.bytes().all(|b| b.is_ascii_hexdigit()) {
            hits.push(SearchHit {
                kind: "Transaction",
                url: format!("/tx/{}", lower),
            });
            if let Some(block) = self.db.get_block_by_hash(&lower)? {
                hits.push(SearchHit {
                    kind: "Block",
                    url: format!("/block/{}", block.height),
                });
            }
        }

        if verify_address_syntax(q, self.params.network.address_hrp()) {
            hits.push(SearchHit {
                kind: "Address",
                url: format!("/address/{}", q),
            });
        }

        // bare numbers are heights, not names
        if numeric.is_none() && name::verify_string(&lower) {
            hits.push(SearchHit {
                kind: "Name",
                url: format!("/name/{}", lower),
            });
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::testutil::*;
    use hnscan_core::Pool;
    use hnscan_core::name::hash_name;
    use hnscan_core::params::COIN;

    fn pool_table() -> PoolTable {
        PoolTable::new(vec![Pool {
            name: "F2Pool".into(),
            url: "https://www.f2pool.com".into(),
            addresses: vec!["hs1qf2pool".into()],
        }])
    }

    async fn index_chain(chain: &MockChain) -> (tempfile::TempDir, Arc<ExplorerDB>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(ExplorerDB::new(dir.path()).unwrap());
        let indexer = Indexer::new(db.clone(), pool_table());
        indexer.sync_to_tip(chain).await.unwrap();
        (dir, db)
    }

    fn query(db: Arc<ExplorerDB>, chain: Arc<MockChain>) -> Query<MockChain> {
        Query::new(db, chain, NetworkParams::regtest(), pool_table())
    }

    fn pad_chain(chain: &MockChain, until: u32) {
        while chain.blocks_len() <= until {
            chain.push_simple(0, "hs1qminer", vec![]);
        }
    }

    #[tokio::test]
    async fn address_balances_are_exact() {
        let chain = Arc::new(MockChain::new());
        chain.push_simple(0, "hs1qmallory", vec![]); // h0 coinbase 2000
        chain.push_simple(0, "hs1qminer", vec![]);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "pay",
            vec![(txid("coinbase-0"), 0)],
            vec![
                plain_output(500 * COIN, "hs1qbob"),
                plain_output(1_500 * COIN, "hs1qmallory"),
            ],
        )]);
        let (_dir, db) = index_chain(&chain).await;
        let q = query(db, chain);

        let mallory = q.get_address("hs1qmallory").unwrap();
        assert_eq!(mallory.received, 3_500 * COIN);
        assert_eq!(mallory.spent, 2_000 * COIN);
        assert_eq!(mallory.confirmed, 1_500 * COIN);

        let bob = q.get_address("hs1qbob").unwrap();
        assert_eq!(bob.confirmed, 500 * COIN);
        assert_eq!(bob.spent, 0);

        let nobody = q.get_address("hs1qnobody").unwrap();
        assert_eq!(nobody.received, 0);
        assert_eq!(nobody.confirmed, 0);
    }

    #[tokio::test]
    async fn stale_auction_bids_never_win() {
        let chain = Arc::new(MockChain::new());
        pad_chain(&chain, 0);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "open-1",
            vec![],
            vec![open_output("alice", "hs1qowner")],
        )]); // h1
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "bid-old",
            vec![],
            vec![bid_output("alice", 900, "hs1qold")],
        )]); // h2
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "reveal-old",
            vec![(txid("bid-old"), 0)],
            vec![reveal_output("alice", 900, "hs1qold")],
        )]); // h3
        pad_chain(&chain, 4);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "open-2",
            vec![],
            vec![open_output("alice", "hs1qowner")],
        )]); // h5
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "bid-new",
            vec![],
            vec![bid_output("alice", 300, "hs1qnew")],
        )]); // h6
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "reveal-new",
            vec![(txid("bid-new"), 0)],
            vec![reveal_output("alice", 300, "hs1qnew")],
        )]); // h7

        let (_dir, db) = index_chain(&chain).await;
        let nh = hash_name("alice");
        let rec = db.get_name(&nh).unwrap().unwrap();
        assert_eq!(rec.open, 5);

        let q = query(db, chain);
        let bids = q.get_name_bids(&nh, rec.open).unwrap();
        assert_eq!(bids.len(), 2);
        // newest first
        assert_eq!(bids[0].txid, txid("bid-new"));
        assert!(bids[0].win, "current auction's only reveal must win");
        assert_eq!(bids[0].value, 300);
        assert!(bids[1].revealed);
        assert_eq!(bids[1].value, 900);
        assert!(!bids[1].win, "a reveal from a prior auction must not win");
    }

    #[tokio::test]
    async fn winner_is_highest_reveal_not_highest_lockup() {
        let chain = Arc::new(MockChain::new());
        pad_chain(&chain, 0);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "open-1",
            vec![],
            vec![open_output("alice", "hs1qowner")],
        )]);
        chain.push_simple(0, "hs1qminer", vec![
            spend_tx("bid-1", vec![], vec![bid_output("alice", 1_000, "hs1qb1")]),
            spend_tx("bid-2", vec![], vec![bid_output("alice", 800, "hs1qb2")]),
        ]);
        chain.push_simple(0, "hs1qminer", vec![
            // bid-1 blinds most of its lockup; its true bid is 100
            spend_tx("reveal-1", vec![(txid("bid-1"), 0)], vec![reveal_output("alice", 100, "hs1qb1")]),
            spend_tx("reveal-2", vec![(txid("bid-2"), 0)], vec![reveal_output("alice", 750, "hs1qb2")]),
        ]);

        let (_dir, db) = index_chain(&chain).await;
        let q = query(db, chain);
        let bids = q.get_name_bids(&hash_name("alice"), 1).unwrap();
        let winner: Vec<_> = bids.iter().filter(|b| b.win).collect();
        assert_eq!(winner.len(), 1);
        assert_eq!(winner[0].value, 750);
        assert_eq!(winner[0].lockup, 800);
    }

    #[tokio::test]
    async fn search_treats_numbers_as_heights() {
        let chain = Arc::new(MockChain::new());
        pad_chain(&chain, 42);
        let (_dir, db) = index_chain(&chain).await;
        let block_hash_42 = db.get_block(42).unwrap().unwrap().hash;
        let q = query(db, chain);

        let hits = q.search("42").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, "Block");
        assert_eq!(hits[0].url, "/block/42");

        // beyond the tip no block hit remains, and numbers are not names
        assert!(q.search("9999").unwrap().is_empty());

        let hits = q.search("handshake").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, "Name");
        assert_eq!(hits[0].url, "/name/handshake");

        let hits = q.search(&block_hash_42).unwrap();
        assert_eq!(hits[0].kind, "Transaction");
        assert_eq!(hits[1].kind, "Block");
        assert_eq!(hits[1].url, "/block/42");

        let hits = q.search("rs1qexampleaddr0").unwrap();
        assert_eq!(hits[0].kind, "Address");
    }

    #[tokio::test]
    async fn status_windows_bucket_names_by_open_height() {
        let chain = Arc::new(MockChain::new());
        let opens = [("aname", 38u32), ("bname", 30), ("cname", 10), ("dname", 2)];
        for height in 0..=40u32 {
            if let Some((name, _)) = opens.iter().find(|(_, h)| *h == height) {
                chain.push_simple(0, "hs1qminer", vec![spend_tx(
                    &format!("open-{}", name),
                    vec![],
                    vec![open_output(name, "hs1qowner")],
                )]);
            } else {
                chain.push_simple(0, "hs1qminer", vec![]);
            }
        }
        let (_dir, db) = index_chain(&chain).await;
        chain.set_name_state("aname", hnscan_core::NameState {
            state: Some("OPENING".into()),
            ..Default::default()
        });
        let q = query(db, chain);

        // regtest: open period 6, bidding 10, reveal 20; head 40
        for (status, expected) in [
            (NameStatus::Opening, "aname"),
            (NameStatus::Bidding, "bname"),
            (NameStatus::Reveal, "cname"),
            (NameStatus::Closed, "dname"),
        ] {
            let page = q.get_names_by_status(status, 0, 10).await.unwrap();
            assert_eq!(page.total, 1, "{:?}", status);
            assert_eq!(page.result[0].name, expected);
            assert!(page.result.len() <= 10);
            if status == NameStatus::Opening {
                // live state joined from the node
                assert_eq!(page.result[0].state.as_deref(), Some("OPENING"));
            }
        }
    }

    #[tokio::test]
    async fn charts_map_summary_fields() {
        let chain = Arc::new(MockChain::new());
        pad_chain(&chain, 74); // crosses one UTC day boundary
        let (_dir, db) = index_chain(&chain).await;
        let q = query(db, chain);

        let supply = q
            .get_series(ChartType::Supply, 0, u64::MAX)
            .unwrap();
        assert_eq!(supply.len(), 2);
        assert_eq!(supply[0].value, 140_000.0);
        assert_eq!(supply[1].value, 150_000.0);
        let day0 = GENESIS_TIME - GENESIS_TIME % 86_400;
        assert_eq!(supply[0].date, day0 * 1000);

        let diff = q
            .get_series(ChartType::Difficulty, 0, u64::MAX)
            .unwrap();
        assert!((diff[0].value - 1.0).abs() < 1e-9);

        let daily = q
            .get_series(ChartType::DailyTransactions, 0, u64::MAX)
            .unwrap();
        assert_eq!(daily[0].value, 70.0);
        assert_eq!(daily[1].value, 5.0);

        let totals = q
            .get_series(ChartType::DailyTotalTransactions, 0, u64::MAX)
            .unwrap();
        assert_eq!(totals[1].value, 75.0);
    }

    #[tokio::test]
    async fn pool_distribution_counts_miners() {
        let chain = Arc::new(MockChain::new());
        chain.push_simple(0, "hs1qf2pool", vec![]);
        chain.push_simple(0, "hs1qf2pool", vec![]);
        chain.push_simple(0, "hs1qsolo", vec![]);
        let (_dir, db) = index_chain(&chain).await;
        let q = query(db, chain);

        let dist = q
            .get_pool_distribution(GENESIS_TIME - 1, u64::MAX)
            .unwrap();
        assert_eq!(dist.total, 3);
        assert_eq!(dist.items[0].pool_name, "F2Pool");
        assert_eq!(dist.items[0].count, 2);
        assert_eq!(dist.items[0].url.as_deref(), Some("https://www.f2pool.com"));
        assert_eq!(dist.items[1].pool_name, "unknown");
        assert_eq!(dist.items[1].count, 1);
    }

    #[tokio::test]
    async fn transactions_normalize_inputs_and_covenants() {
        let chain = Arc::new(MockChain::new());
        pad_chain(&chain, 0);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "open-alice",
            vec![],
            vec![open_output("alice", "hs1qowner")],
        )]);
        let (_dir, db) = index_chain(&chain).await;
        let q = query(db, chain);

        let coinbase = q
            .get_transaction(&txid("coinbase-0"))
            .await
            .unwrap()
            .unwrap();
        assert!(coinbase.inputs[0].coinbase);
        assert_eq!(coinbase.inputs[0].value, Some(2_000 * COIN));
        assert_eq!(coinbase.outputs[0].action, "NONE");
        assert_eq!(coinbase.outputs[0].value, Some(2_000 * COIN));

        let open = q
            .get_transaction(&txid("open-alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open.height, Some(1));
        let out = &open.outputs[0];
        assert_eq!(out.action, "OPEN");
        assert_eq!(out.name.as_deref(), Some("alice"));
        assert_eq!(out.name_hash.as_deref(), Some(hash_name("alice").as_str()));
        assert_eq!(out.value, None);

        assert!(q.get_transaction(&"ff".repeat(32)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pagination_contracts_hold() {
        let chain = Arc::new(MockChain::new());
        pad_chain(&chain, 9);
        let (_dir, db) = index_chain(&chain).await;
        let q = query(db, chain);

        let blocks = q.get_blocks(0, 3).await.unwrap();
        assert_eq!(blocks.total, 10);
        assert_eq!(blocks.result.len(), 3);
        assert_eq!(blocks.result[0].height, 9);

        // offset counts back from the tip
        let offset = q.get_blocks(4, 3).await.unwrap();
        assert_eq!(offset.result[0].height, 5);

        let txs = q.get_transactions_by_height(3, 0, 10).await.unwrap();
        assert_eq!(txs.total, 1);
        assert_eq!(txs.result.len(), 1);

        let by_addr = q
            .get_transactions_by_address("hs1qminer", 0, 4)
            .await
            .unwrap();
        assert_eq!(by_addr.total, 10);
        assert_eq!(by_addr.result.len(), 4);
        assert_eq!(by_addr.result[0].height, Some(9));

        let latest = q.get_transactions(5).await.unwrap();
        assert_eq!(latest.len(), 5);
        assert_eq!(latest[0].height, Some(9));
    }
}
