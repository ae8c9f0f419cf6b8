use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use rocksdb::WriteBatch;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::db::ExplorerDB;
use crate::records::{BlockRecord, CoinRecord, NameRecord, SummaryRecord, TxRecord};
use crate::rpc::ChainBackend;
use hnscan_core::params::COIN;
use hnscan_core::types::{ChainEntry, RpcBlock};
use hnscan_core::{Covenant, PoolTable, difficulty_from_bits, name};

const SECONDS_PER_DAY: u64 = 86_400;

/// Incremental block consumer. Keeps the store consistent with the canonical
/// chain: catch-up scans on startup, forward application of new blocks, and
/// rollback on reorganization. At most one indexing operation is ever in
/// flight; connect notifications that race a running scan are coalesced
/// through the pending flag and drained when the scan releases the gate.
pub struct Indexer {
    db: Arc<ExplorerDB>,
    pools: PoolTable,
    gate: Mutex<()>,
    pending: AtomicBool,
}

impl Indexer {
    pub fn new(db: Arc<ExplorerDB>, pools: PoolTable) -> Self {
        Self {
            db,
            pools,
            gate: Mutex::new(()),
            pending: AtomicBool::new(false),
        }
    }

    pub fn head(&self) -> Result<Option<u32>> {
        self.db.head()
    }

    /// Poll loop: detect reorgs, then scan forward to the node tip. Errors
    /// are logged and retried on the next tick; they never tear down the
    /// process.
    pub async fn run<C: ChainBackend>(self: Arc<Self>, chain: Arc<C>, poll_interval: Duration) {
        info!("Starting chain watch loop");
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.handle_reset(chain.as_ref()).await {
                error!("reorg check failed: {:#}", e);
                continue;
            }
            if let Err(e) = self.sync_to_tip(chain.as_ref()).await {
                error!("indexing failed: {:#}", e);
            }
        }
    }

    /// Connect-event entry point. If a scan is already running the event is
    /// coalesced: the flag makes the running scan re-check the tip before it
    /// releases the gate, so no block is missed and none applied twice.
    pub async fn sync_to_tip<C: ChainBackend>(&self, chain: &C) -> Result<()> {
        let Ok(_guard) = self.gate.try_lock() else {
            self.pending.store(true, Ordering::SeqCst);
            debug!("scan in flight; coalescing connect event");
            return Ok(());
        };
        loop {
            self.pending.store(false, Ordering::SeqCst);
            self.scan(chain).await?;
            if !self.pending.load(Ordering::SeqCst) {
                break;
            }
        }
        Ok(())
    }

    async fn scan<C: ChainBackend>(&self, chain: &C) -> Result<()> {
        let (tip_height, _) = chain.tip().await?;
        let start = match self.db.head()? {
            Some(h) => h + 1,
            None => 0,
        };
        if start > tip_height {
            return Ok(());
        }
        info!("Indexing blocks {}..={}", start, tip_height);
        for height in start..=tip_height {
            let entry = chain
                .entry(height)
                .await?
                .ok_or_else(|| anyhow!("node has no entry at height {}", height))?;
            let block = chain
                .block(height)
                .await?
                .ok_or_else(|| anyhow!("node has no block at height {}", height))?;
            self.apply_block(&entry, &block)?;
        }
        Ok(())
    }

    /// Compare our records against the node's canonical entries and roll
    /// back to the fork point when they diverge. Returns whether a rollback
    /// happened.
    pub async fn handle_reset<C: ChainBackend>(&self, chain: &C) -> Result<bool> {
        let _guard = self.gate.lock().await;
        let Some(head) = self.db.head()? else {
            return Ok(false);
        };
        let (tip_height, _) = chain.tip().await?;
        let mut h = head.min(tip_height);
        loop {
            let ours = self.db.get_block(h)?;
            let theirs = chain.entry(h).await?;
            match (ours, theirs) {
                (Some(b), Some(e)) if b.hash == e.hash => break,
                _ if h == 0 => {
                    warn!("reorg beyond known depth; clearing store for a full rescan");
                    self.db.clear_all()?;
                    return Ok(true);
                }
                (None, _) => {
                    // below our oldest record; nothing left to compare against
                    warn!("reorg beyond known depth; clearing store for a full rescan");
                    self.db.clear_all()?;
                    return Ok(true);
                }
                _ => h -= 1,
            }
        }
        if h < head {
            self.rollback(h)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Apply one connected block. The whole delta (coins, spend marks, txs,
    /// names, block, summary, head) is committed as a single batch, so a
    /// crash mid-block leaves the store at the previous head.
    pub fn apply_block(&self, entry: &ChainEntry, block: &RpcBlock) -> Result<()> {
        if let Some(head) = self.db.head()? {
            if entry.height <= head {
                warn!(
                    "Ignoring stale block event at height {} (head is {})",
                    entry.height, head
                );
                return Ok(());
            }
        }

        let mut batch = WriteBatch::default();
        let mut pending_coins: HashMap<(String, u32), CoinRecord> = HashMap::new();
        // current record plus the stored original, so index rows for stale
        // open/value keys get dropped on write
        let mut pending_names: HashMap<String, (NameRecord, Option<NameRecord>)> = HashMap::new();
        let mut supply_delta = 0u64;
        let mut burned_delta = 0u64;
        let mut registered_delta = 0i64;

        for (tx_index, tx) in block.txs.iter().enumerate() {
            let is_coinbase = tx_index == 0;
            let mut addresses = BTreeSet::new();

            if !is_coinbase {
                for (input_index, input) in tx.inputs.iter().enumerate() {
                    let key = (input.prevout.hash.clone(), input.prevout.index);
                    let known = match pending_coins.get(&key) {
                        Some(c) => Some(c.clone()),
                        None => self.db.get_coin(&key.0, key.1)?,
                    };
                    match known {
                        Some(mut coin) => {
                            addresses.insert(coin.address.clone());
                            coin.spent = true;
                            coin.spent_txid = Some(tx.txid.clone());
                            coin.spent_index = Some(input_index as u32);
                            pending_coins.insert(key, coin);
                        }
                        None => warn!(
                            "Missing prevout {}:{} while indexing block {}",
                            key.0, key.1, entry.height
                        ),
                    }
                }
            }

            for (output_index, output) in tx.outputs.iter().enumerate() {
                if is_coinbase {
                    supply_delta += output.value;
                }
                addresses.insert(output.address.clone());

                let covenant = Covenant::from_type(output.covenant.cov_type);
                let name_hash = covenant
                    .filter(|c| c.is_name())
                    .and_then(|_| output.covenant.items.first().cloned());

                let key = (tx.txid.clone(), output_index as u32);
                let existing = match pending_coins.get(&key) {
                    Some(c) => Some(c.clone()),
                    None => self.db.get_coin(&key.0, key.1)?,
                };
                let mut coin = CoinRecord {
                    txid: tx.txid.clone(),
                    index: output_index as u32,
                    height: entry.height,
                    time: entry.time,
                    address: output.address.clone(),
                    value: output.value,
                    covenant_type: output.covenant.cov_type,
                    covenant_items: output.covenant.items.clone(),
                    name_hash: name_hash.clone(),
                    spent: false,
                    spent_txid: None,
                    spent_index: None,
                };
                // a replayed block must not clear an existing spend mark
                if let Some(existing) = existing {
                    coin.spent = existing.spent;
                    coin.spent_txid = existing.spent_txid;
                    coin.spent_index = existing.spent_index;
                }
                pending_coins.insert(key, coin);

                let (Some(covenant), Some(nh)) = (covenant, name_hash) else {
                    continue;
                };
                match covenant {
                    Covenant::Claim | Covenant::Open => {
                        let ascii = output
                            .covenant
                            .items
                            .get(2)
                            .and_then(|item| name::name_from_item(item))
                            .unwrap_or_default();
                        let original = match pending_names.get(&nh) {
                            Some((_, original)) => original.clone(),
                            None => self.db.get_name(&nh)?,
                        };
                        // a fresh auction voids any lapsed registration
                        if original.as_ref().is_some_and(|o| o.registered) {
                            registered_delta -= 1;
                        }
                        let rec = NameRecord {
                            name_hash: nh.clone(),
                            name: ascii,
                            open: entry.height,
                            value: 0,
                            highest: 0,
                            registered: false,
                        };
                        pending_names.insert(nh, (rec, original));
                    }
                    Covenant::Reveal => {
                        match self.load_pending_name(&mut pending_names, &nh)? {
                            Some(rec) => rec.apply_reveal(output.value),
                            None => warn!("REVEAL for unknown name {} at {}", nh, entry.height),
                        }
                    }
                    Covenant::Register => {
                        burned_delta += output.value;
                        match self.load_pending_name(&mut pending_names, &nh)? {
                            Some(rec) => {
                                if !rec.registered {
                                    rec.registered = true;
                                    registered_delta += 1;
                                }
                            }
                            None => warn!("REGISTER for unknown name {} at {}", nh, entry.height),
                        }
                    }
                    _ => {}
                }
            }

            let tx_rec = TxRecord {
                txid: tx.txid.clone(),
                height: entry.height,
                hash: entry.hash.clone(),
                time: entry.time,
                addresses: addresses.into_iter().collect(),
            };
            ExplorerDB::put_tx(&mut batch, &tx_rec, tx_index as u32)?;
        }

        for coin in pending_coins.values() {
            ExplorerDB::put_coin(&mut batch, coin)?;
        }
        for (rec, original) in pending_names.values() {
            ExplorerDB::put_name(&mut batch, rec, original.as_ref())?;
        }
        if registered_delta != 0 {
            let count = self.db.registered_names()? as i64 + registered_delta;
            ExplorerDB::set_registered_names(&mut batch, count.max(0) as u64);
        }

        let miner_address = block
            .txs
            .first()
            .and_then(|tx| tx.outputs.first())
            .map(|o| o.address.clone())
            .unwrap_or_default();
        let block_rec = BlockRecord {
            height: entry.height,
            hash: entry.hash.clone(),
            difficulty: difficulty_from_bits(entry.bits),
            time: entry.time,
            txs: block.txs.len() as u32,
            miner: self.pools.attribute(&miner_address).to_string(),
            miner_address,
        };
        ExplorerDB::put_block(&mut batch, &block_rec)?;
        self.bump_summary(
            &mut batch,
            entry,
            block.txs.len() as u64,
            block_rec.difficulty,
            supply_delta,
            burned_delta,
        )?;
        ExplorerDB::set_head(&mut batch, entry.height);

        self.db.write(batch)?;
        debug!("Indexed block {} ({} txs)", entry.height, block.txs.len());
        Ok(())
    }

    /// Fetch-or-seed a name into the in-block working set. Seeding from the
    /// store on first touch keeps earlier reveals from being lost.
    fn load_pending_name<'a>(
        &self,
        pending: &'a mut HashMap<String, (NameRecord, Option<NameRecord>)>,
        name_hash: &str,
    ) -> Result<Option<&'a mut NameRecord>> {
        if !pending.contains_key(name_hash) {
            let Some(stored) = self.db.get_name(name_hash)? else {
                return Ok(None);
            };
            pending.insert(
                name_hash.to_string(),
                (stored.clone(), Some(stored)),
            );
        }
        Ok(pending.get_mut(name_hash).map(|(rec, _)| rec))
    }

    fn bump_summary(
        &self,
        batch: &mut WriteBatch,
        entry: &ChainEntry,
        tx_count: u64,
        difficulty: f64,
        supply_delta: u64,
        burned_delta: u64,
    ) -> Result<()> {
        let day_time = entry.time - entry.time % SECONDS_PER_DAY;
        let supply_coins = supply_delta as f64 / COIN as f64;
        let burned_coins = burned_delta as f64 / COIN as f64;
        let rec = match self.db.get_summary(day_time)? {
            Some(mut rec) => {
                rec.blocks += 1;
                rec.txs += tx_count;
                rec.total_txs += tx_count;
                rec.difficulty += difficulty;
                rec.supply += supply_coins;
                rec.burned += burned_coins;
                rec
            }
            None => {
                // first block of a new day: seed cumulative fields from the
                // most recent day that saw a block
                let prev = self.db.latest_summary()?;
                let (total_txs, supply, burned) = prev
                    .map(|p| (p.total_txs, p.supply, p.burned))
                    .unwrap_or((0, 0.0, 0.0));
                SummaryRecord {
                    time: day_time,
                    blocks: 1,
                    txs: tx_count,
                    total_txs: total_txs + tx_count,
                    difficulty,
                    supply: supply + supply_coins,
                    burned: burned + burned_coins,
                }
            }
        };
        ExplorerDB::put_summary(batch, &rec)
    }

    /// Erase every record above `target` and revert the mutations those
    /// blocks made to surviving records. Committed as one batch.
    pub fn rollback(&self, target: u32) -> Result<()> {
        let Some(head) = self.db.head()? else {
            return Ok(());
        };
        if target >= head {
            return Ok(());
        }
        warn!("Rolling back chain from {} to {}", head, target);

        let mut batch = WriteBatch::default();
        let mut registered_delta = 0i64;
        let mut touched_names: HashSet<String> = HashSet::new();
        let mut summaries: HashMap<u64, SummaryRecord> = HashMap::new();

        for height in ((target + 1)..=head).rev() {
            let Some(block_rec) = self.db.get_block(height)? else {
                continue;
            };
            let txids = self.db.txids_by_height(height)?;
            let coinbase_txid = txids.first().cloned();

            let mut supply_delta = 0u64;
            let mut burned_delta = 0u64;
            for coin in self.db.coins_by_height(height)? {
                if Some(&coin.txid) == coinbase_txid.as_ref() {
                    supply_delta += coin.value;
                }
                if coin.covenant_type == Covenant::Register as u8 {
                    burned_delta += coin.value;
                }
                if let Some(nh) = &coin.name_hash {
                    let cov = Covenant::from_type(coin.covenant_type);
                    if matches!(cov, Some(Covenant::Reveal | Covenant::Register)) {
                        touched_names.insert(nh.clone());
                    }
                }
                ExplorerDB::delete_coin(&mut batch, &coin);
            }

            for (idx, txid) in txids.iter().enumerate() {
                if let Some(tx_rec) = self.db.get_tx(txid)? {
                    ExplorerDB::delete_tx(&mut batch, &tx_rec, idx as u32);
                }
                // coins this tx spent that survive the rollback lose their
                // spend mark
                for mut spent in self.db.coins_spent_by(txid)? {
                    if spent.height > target {
                        continue;
                    }
                    if let (Some(stxid), Some(sidx)) = (&spent.spent_txid, spent.spent_index) {
                        ExplorerDB::delete_spent_index(&mut batch, stxid, sidx);
                    }
                    spent.spent = false;
                    spent.spent_txid = None;
                    spent.spent_index = None;
                    ExplorerDB::put_coin(&mut batch, &spent)?;
                }
            }

            ExplorerDB::delete_block(&mut batch, &block_rec);

            let day_time = block_rec.time - block_rec.time % SECONDS_PER_DAY;
            if !summaries.contains_key(&day_time) {
                if let Some(rec) = self.db.get_summary(day_time)? {
                    summaries.insert(day_time, rec);
                }
            }
            if let Some(rec) = summaries.get_mut(&day_time) {
                rec.blocks = rec.blocks.saturating_sub(1);
                rec.txs = rec.txs.saturating_sub(txids.len() as u64);
                rec.total_txs = rec.total_txs.saturating_sub(txids.len() as u64);
                rec.difficulty -= block_rec.difficulty;
                rec.supply -= supply_delta as f64 / COIN as f64;
                rec.burned -= burned_delta as f64 / COIN as f64;
            }
        }

        for (day_time, rec) in &summaries {
            if rec.blocks == 0 {
                ExplorerDB::delete_summary(&mut batch, *day_time);
            } else {
                ExplorerDB::put_summary(&mut batch, rec)?;
            }
        }

        // names opened in rolled-back blocks disappear outright
        for rec in self.db.names_opened_above(target)? {
            if rec.registered {
                registered_delta -= 1;
            }
            touched_names.remove(&rec.name_hash);
            ExplorerDB::delete_name(&mut batch, &rec);
        }

        // surviving names touched by rolled-back reveals/registers get their
        // auction facts re-derived from the coins that remain
        for nh in touched_names {
            let Some(stored) = self.db.get_name(&nh)? else {
                continue;
            };
            let original = stored.clone();
            let mut rec = stored;
            rec.value = 0;
            rec.highest = 0;
            rec.registered = false;
            for coin in self.db.coins_by_name(&nh)? {
                if coin.height > target || coin.height <= rec.open {
                    continue;
                }
                match Covenant::from_type(coin.covenant_type) {
                    Some(Covenant::Reveal) => rec.apply_reveal(coin.value),
                    Some(Covenant::Register) => rec.registered = true,
                    _ => {}
                }
            }
            if original.registered && !rec.registered {
                registered_delta -= 1;
            }
            ExplorerDB::put_name(&mut batch, &rec, Some(&original))?;
        }

        if registered_delta != 0 {
            let count = self.db.registered_names()? as i64 + registered_delta;
            ExplorerDB::set_registered_names(&mut batch, count.max(0) as u64);
        }
        ExplorerDB::set_head(&mut batch, target);
        self.db.write(batch)?;
        info!("Rollback to {} complete", target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use hnscan_core::Pool;
    use hnscan_core::name::hash_name;

    fn pool_table() -> PoolTable {
        PoolTable::new(vec![Pool {
            name: "F2Pool".into(),
            url: "https://www.f2pool.com".into(),
            addresses: vec!["hs1qf2pool".into()],
        }])
    }

    fn indexer() -> (tempfile::TempDir, Arc<ExplorerDB>, Indexer) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(ExplorerDB::new(dir.path()).unwrap());
        let indexer = Indexer::new(db.clone(), pool_table());
        (dir, db, indexer)
    }

    fn pad_chain(chain: &MockChain, until: u32) {
        while chain.blocks_len() <= until {
            chain.push_simple(0, "hs1qminer", vec![]);
        }
    }

    #[tokio::test]
    async fn single_auction_settles_at_second_price() {
        let (_dir, db, indexer) = indexer();
        let chain = MockChain::new();

        pad_chain(&chain, 9);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "open-alice",
            vec![],
            vec![open_output("alice", "hs1qowner")],
        )]); // h10
        pad_chain(&chain, 19);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "bid-1",
            vec![],
            vec![bid_output("alice", 100, "hs1qb1")],
        )]); // h20
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "bid-2",
            vec![],
            vec![bid_output("alice", 300, "hs1qb2")],
        )]); // h21
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "bid-3",
            vec![],
            vec![bid_output("alice", 200, "hs1qb3")],
        )]); // h22
        pad_chain(&chain, 39);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "reveal-2",
            vec![(txid("bid-2"), 0)],
            vec![reveal_output("alice", 300, "hs1qb2")],
        )]); // h40
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "reveal-1",
            vec![(txid("bid-1"), 0)],
            vec![reveal_output("alice", 100, "hs1qb1")],
        )]); // h41
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "reveal-3",
            vec![(txid("bid-3"), 0)],
            vec![reveal_output("alice", 200, "hs1qb3")],
        )]); // h42

        indexer.sync_to_tip(&chain).await.unwrap();

        assert_eq!(db.head().unwrap(), Some(42));
        let rec = db.get_name(&hash_name("alice")).unwrap().unwrap();
        assert_eq!(rec.open, 10);
        assert_eq!(rec.value, 200);
        assert_eq!(rec.highest, 300);
        assert_eq!(rec.name, "alice");

        // the winning bid coin is marked spent by its reveal
        let bid = db.get_coin(&txid("bid-2"), 0).unwrap().unwrap();
        assert!(bid.spent);
        assert_eq!(bid.spent_txid.as_deref(), Some(txid("reveal-2").as_str()));
        assert_eq!(bid.spent_index, Some(0));
        let reveal = db.get_coin(&txid("reveal-2"), 0).unwrap().unwrap();
        assert_eq!(reveal.value, 300);
    }

    #[tokio::test]
    async fn replaying_an_old_block_is_a_noop() {
        let (_dir, db, indexer) = indexer();
        let chain = MockChain::new();
        pad_chain(&chain, 3);
        indexer.sync_to_tip(&chain).await.unwrap();

        let before = db.latest_summary().unwrap().unwrap();
        let entry = chain.entry(2).await.unwrap().unwrap();
        let block = chain.block(2).await.unwrap().unwrap();
        indexer.apply_block(&entry, &block).unwrap();

        let after = db.latest_summary().unwrap().unwrap();
        assert_eq!(before.total_txs, after.total_txs);
        assert_eq!(db.head().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn reorg_discards_reveals_from_the_dead_fork() {
        let (_dir, db, indexer) = indexer();
        let chain = MockChain::new();

        pad_chain(&chain, 1);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "open-alice",
            vec![],
            vec![open_output("alice", "hs1qowner")],
        )]); // h2
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "bid-a",
            vec![],
            vec![bid_output("alice", 500, "hs1qba")],
        )]); // h3
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "bid-b",
            vec![],
            vec![bid_output("alice", 200, "hs1qbb")],
        )]); // h4
        pad_chain(&chain, 5);
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "reveal-a",
            vec![(txid("bid-a"), 0)],
            vec![reveal_output("alice", 500, "hs1qba")],
        )]); // h6
        chain.push_simple(0, "hs1qminer", vec![spend_tx(
            "reveal-b",
            vec![(txid("bid-b"), 0)],
            vec![reveal_output("alice", 200, "hs1qbb")],
        )]); // h7

        indexer.sync_to_tip(&chain).await.unwrap();
        let rec = db.get_name(&hash_name("alice")).unwrap().unwrap();
        assert_eq!((rec.value, rec.highest), (200, 500));

        // fork away the reveal blocks; the new branch only reveals bid-b
        chain.truncate(5);
        chain.push_simple(1, "hs1qminer", vec![spend_tx(
            "reveal-b2",
            vec![(txid("bid-b"), 0)],
            vec![reveal_output("alice", 200, "hs1qbb")],
        )]); // h6'
        chain.push_simple(1, "hs1qminer", vec![]); // h7'

        assert!(indexer.handle_reset(&chain).await.unwrap());
        indexer.sync_to_tip(&chain).await.unwrap();

        assert_eq!(db.head().unwrap(), Some(7));
        let rec = db.get_name(&hash_name("alice")).unwrap().unwrap();
        assert_eq!((rec.value, rec.highest), (0, 200));

        // the bid whose reveal only existed on the dead fork is unspent again
        let bid_a = db.get_coin(&txid("bid-a"), 0).unwrap().unwrap();
        assert!(!bid_a.spent);
        assert_eq!(bid_a.spent_txid, None);
        let bid_b = db.get_coin(&txid("bid-b"), 0).unwrap().unwrap();
        assert!(bid_b.spent);
        assert_eq!(bid_b.spent_txid.as_deref(), Some(txid("reveal-b2").as_str()));
    }

    #[tokio::test]
    async fn reorg_equals_fresh_scan() {
        let make_chain = || {
            let chain = MockChain::new();
            pad_chain(&chain, 1);
            chain.push_simple(0, "hs1qminer", vec![spend_tx(
                "open-alice",
                vec![],
                vec![open_output("alice", "hs1qowner")],
            )]);
            chain.push_simple(0, "hs1qminer", vec![spend_tx(
                "bid-a",
                vec![],
                vec![bid_output("alice", 500, "hs1qba")],
            )]);
            pad_chain(&chain, 4);
            chain
        };

        // chain A indexes five extra blocks and rolls them back
        let dir_a = tempfile::tempdir().unwrap();
        let db_a = Arc::new(ExplorerDB::new(dir_a.path()).unwrap());
        let idx_a = Indexer::new(db_a.clone(), pool_table());
        let chain_a = make_chain();
        for _ in 0..5 {
            chain_a.push_simple(0, "hs1qminer", vec![]);
        }
        idx_a.sync_to_tip(&chain_a).await.unwrap();
        idx_a.rollback(4).unwrap();

        // chain B scans a fresh store to the same height
        let dir_b = tempfile::tempdir().unwrap();
        let db_b = Arc::new(ExplorerDB::new(dir_b.path()).unwrap());
        let idx_b = Indexer::new(db_b.clone(), pool_table());
        idx_b.sync_to_tip(&make_chain()).await.unwrap();

        assert_eq!(db_a.head().unwrap(), db_b.head().unwrap());
        let sum_a = db_a.latest_summary().unwrap().unwrap();
        let sum_b = db_b.latest_summary().unwrap().unwrap();
        assert_eq!(sum_a.blocks, sum_b.blocks);
        assert_eq!(sum_a.total_txs, sum_b.total_txs);
        assert_eq!(sum_a.supply, sum_b.supply);
        let name_a = db_a.get_name(&hash_name("alice")).unwrap().unwrap();
        let name_b = db_b.get_name(&hash_name("alice")).unwrap().unwrap();
        assert_eq!(name_a.value, name_b.value);
        assert_eq!(name_a.highest, name_b.highest);
    }

    #[tokio::test]
    async fn summaries_roll_over_utc_days() {
        let (_dir, db, indexer) = indexer();
        let chain = MockChain::new();
        // blocks are 600s apart; the first UTC day boundary after genesis
        // falls between heights 69 and 70
        pad_chain(&chain, 74);
        indexer.sync_to_tip(&chain).await.unwrap();

        let day0 = GENESIS_TIME - GENESIS_TIME % 86_400;
        let first = db.get_summary(day0).unwrap().unwrap();
        let second = db.get_summary(day0 + 86_400).unwrap().unwrap();
        assert_eq!(first.blocks, 70);
        assert_eq!(second.blocks, 5);
        assert_eq!(first.total_txs, 70);
        assert_eq!(second.total_txs, 75);
        assert_eq!(second.supply, 75.0 * 2_000.0);
        assert!(second.total_txs >= first.total_txs);
    }

    #[tokio::test]
    async fn coinbase_addresses_attribute_to_pools() {
        let (_dir, db, indexer) = indexer();
        let chain = MockChain::new();
        chain.push_simple(0, "hs1qf2pool", vec![]);
        chain.push_simple(0, "hs1qsomebody", vec![]);
        indexer.sync_to_tip(&chain).await.unwrap();

        assert_eq!(db.get_block(0).unwrap().unwrap().miner, "F2Pool");
        assert_eq!(db.get_block(1).unwrap().unwrap().miner, "unknown");
    }

    #[tokio::test]
    async fn racing_syncs_never_double_apply() {
        let (_dir, db, indexer) = indexer();
        let chain = MockChain::new();
        pad_chain(&chain, 49);

        let (a, b) = tokio::join!(
            indexer.sync_to_tip(&chain),
            indexer.sync_to_tip(&chain)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(db.head().unwrap(), Some(49));
        let sum = db.latest_summary().unwrap().unwrap();
        assert_eq!(sum.total_txs, 50);

        // a connect event after the scan drains to the new tip
        chain.push_simple(0, "hs1qminer", vec![]);
        indexer.sync_to_tip(&chain).await.unwrap();
        assert_eq!(db.head().unwrap(), Some(50));
        assert_eq!(db.latest_summary().unwrap().unwrap().total_txs, 51);
    }
}
