use anyhow::{Context, Result};
use log::info;
use rocksdb::{DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::records::{BlockRecord, CoinRecord, NameRecord, SummaryRecord, TxRecord};
use hnscan_core::Covenant;

// Collections are key prefixes; secondary indexes are composite keys written
// in the same batch as their document. Numeric key segments are zero-padded
// decimal so lexicographic order equals numeric order.
//
//   b:{height}                     block document
//   bh:{hash}                      block height by hash
//   t:{txid}                       tx document
//   ta:{addr}:{height}:{txid}      txs by address
//   tb:{height}:{idx}              txs by block, in block order
//   c:{txid}:{idx}                 coin document
//   ca:{addr}:{txid}:{idx}         coins by address
//   cn:{namehash}:{time}:{txid}:{idx}   coins by name, time-ordered
//   ch:{height}:{txid}:{idx}       coins by creation height
//   cs:{spendtxid}:{spendidx}      spent index (value = coin key)
//   cb:{value}:{time}:{txid}:{idx} BID coins by value (value = namehash)
//   n:{namehash}                   name document
//   no:{open}:{namehash}           names by open height
//   nv:{value}:{namehash}          names by second-highest reveal
//   s:{daytime}                    per-day summary
//   meta:*                         head height, counters

const META_HEAD: &str = "meta:head";
const META_REGISTERED: &str = "meta:registered_names";

fn h10(height: u32) -> String {
    format!("{:010}", height)
}

fn t10(time: u64) -> String {
    format!("{:010}", time)
}

fn i5(index: u32) -> String {
    format!("{:05}", index)
}

fn v20(value: u64) -> String {
    format!("{:020}", value)
}

/// Smallest string greater than every key carrying this prefix. All prefixes
/// here end in ':' (0x3a), so bumping the final byte to ';' is enough.
fn prefix_end(prefix: &str) -> String {
    let mut end = prefix.to_string();
    let last = end.pop().expect("prefix is never empty");
    end.push((last as u8 + 1) as char);
    end
}

pub struct ExplorerDB {
    db: DB,
}

impl ExplorerDB {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path.as_ref())
            .with_context(|| format!("opening index store at {:?}", path.as_ref()))?;
        info!("Index store opened at {:?}", path.as_ref());
        Ok(ExplorerDB { db })
    }

    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(
                serde_json::from_slice(&data).with_context(|| format!("decoding {}", key))?,
            )),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(batch: &mut WriteBatch, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec(value)?;
        batch.put(key.as_bytes(), &json);
        Ok(())
    }

    /// Forward scan over `[start, end)`; the callback returns false to stop.
    fn scan_range(
        &self,
        start: &str,
        end: &str,
        mut f: impl FnMut(&str, &[u8]) -> bool,
    ) -> Result<()> {
        let mut iter = self.db.raw_iterator();
        iter.seek(start.as_bytes());
        while iter.valid() {
            let key = iter.key().and_then(|k| std::str::from_utf8(k).ok());
            let Some(key) = key else { break };
            if key >= end {
                break;
            }
            if !f(key, iter.value().unwrap_or(&[])) {
                return Ok(());
            }
            iter.next();
        }
        iter.status()?;
        Ok(())
    }

    /// Reverse scan over `[start, end)`, highest key first.
    fn scan_range_rev(
        &self,
        start: &str,
        end: &str,
        mut f: impl FnMut(&str, &[u8]) -> bool,
    ) -> Result<()> {
        let mut iter = self.db.raw_iterator();
        iter.seek_for_prev(end.as_bytes());
        while iter.valid() {
            let key = iter.key().and_then(|k| std::str::from_utf8(k).ok());
            let Some(key) = key else { break };
            if key < start {
                break;
            }
            // seek_for_prev lands on `end` itself when it exists
            if key < end && !f(key, iter.value().unwrap_or(&[])) {
                return Ok(());
            }
            iter.prev();
        }
        iter.status()?;
        Ok(())
    }

    fn count_prefix(&self, prefix: &str) -> Result<u64> {
        let mut count = 0u64;
        self.scan_range(prefix, &prefix_end(prefix), |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    // ---- meta ----

    pub fn head(&self) -> Result<Option<u32>> {
        match self.db.get(META_HEAD.as_bytes())? {
            Some(data) => {
                let s = String::from_utf8(data.to_vec())?;
                Ok(Some(s.parse()?))
            }
            None => Ok(None),
        }
    }

    pub fn set_head(batch: &mut WriteBatch, height: u32) {
        batch.put(META_HEAD.as_bytes(), height.to_string().as_bytes());
    }

    pub fn registered_names(&self) -> Result<u64> {
        match self.db.get(META_REGISTERED.as_bytes())? {
            Some(data) => Ok(String::from_utf8(data.to_vec())?.parse()?),
            None => Ok(0),
        }
    }

    pub fn set_registered_names(batch: &mut WriteBatch, count: u64) {
        batch.put(META_REGISTERED.as_bytes(), count.to_string().as_bytes());
    }

    /// Drop every record. Used when a reorg reaches below the oldest block
    /// we have and the only safe recovery is a full rescan.
    pub fn clear_all(&self) -> Result<()> {
        info!("Clearing all index data for a full rescan");
        let mut iter = self.db.raw_iterator();
        iter.seek_to_first();
        let mut batch = WriteBatch::default();
        while iter.valid() {
            if let Some(key) = iter.key() {
                batch.delete(key);
            }
            iter.next();
        }
        iter.status()?;
        self.db.write(batch)?;
        Ok(())
    }

    // ---- blocks ----

    pub fn put_block(batch: &mut WriteBatch, rec: &BlockRecord) -> Result<()> {
        Self::put_json(batch, &format!("b:{}", h10(rec.height)), rec)?;
        batch.put(
            format!("bh:{}", rec.hash).as_bytes(),
            rec.height.to_string().as_bytes(),
        );
        Ok(())
    }

    pub fn get_block(&self, height: u32) -> Result<Option<BlockRecord>> {
        self.get_json(&format!("b:{}", h10(height)))
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Result<Option<BlockRecord>> {
        match self.db.get(format!("bh:{}", hash).as_bytes())? {
            Some(data) => {
                let height: u32 = String::from_utf8(data.to_vec())?.parse()?;
                self.get_block(height)
            }
            None => Ok(None),
        }
    }

    /// Blocks with `time ∈ (start, end]`, scanning back from the head.
    /// Block times are only median-past monotone, so the scan keeps going
    /// for a grace window after the first too-old block.
    pub fn blocks_in_time_window(&self, start: u64, end: u64) -> Result<Vec<BlockRecord>> {
        let Some(head) = self.head()? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut grace = 0u32;
        let mut height = head;
        loop {
            if let Some(rec) = self.get_block(height)? {
                if rec.time <= start {
                    grace += 1;
                    if grace > 11 {
                        break;
                    }
                } else {
                    grace = 0;
                    if rec.time <= end {
                        out.push(rec);
                    }
                }
            }
            if height == 0 {
                break;
            }
            height -= 1;
        }
        Ok(out)
    }

    pub fn delete_block(batch: &mut WriteBatch, rec: &BlockRecord) {
        batch.delete(format!("b:{}", h10(rec.height)).as_bytes());
        batch.delete(format!("bh:{}", rec.hash).as_bytes());
    }

    // ---- transactions ----

    pub fn put_tx(batch: &mut WriteBatch, rec: &TxRecord, index_in_block: u32) -> Result<()> {
        Self::put_json(batch, &format!("t:{}", rec.txid), rec)?;
        batch.put(
            format!("tb:{}:{}", h10(rec.height), i5(index_in_block)).as_bytes(),
            rec.txid.as_bytes(),
        );
        for addr in &rec.addresses {
            batch.put(
                format!("ta:{}:{}:{}", addr, h10(rec.height), rec.txid).as_bytes(),
                b"",
            );
        }
        Ok(())
    }

    pub fn get_tx(&self, txid: &str) -> Result<Option<TxRecord>> {
        self.get_json(&format!("t:{}", txid))
    }

    /// Txids of a block, in block order.
    pub fn txids_by_height(&self, height: u32) -> Result<Vec<String>> {
        let prefix = format!("tb:{}:", h10(height));
        let mut txids = Vec::new();
        self.scan_range(&prefix, &prefix_end(&prefix), |_, value| {
            if let Ok(txid) = std::str::from_utf8(value) {
                txids.push(txid.to_string());
            }
            true
        })?;
        Ok(txids)
    }

    /// Txids touching an address, newest block first.
    pub fn txids_by_address(
        &self,
        address: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>> {
        let prefix = format!("ta:{}:", address);
        let mut txids = Vec::new();
        let mut seen = 0usize;
        self.scan_range_rev(&prefix, &prefix_end(&prefix), |key, _| {
            if seen >= offset {
                if let Some(txid) = key.rsplit(':').next() {
                    txids.push(txid.to_string());
                }
            }
            seen += 1;
            txids.len() < limit
        })?;
        Ok(txids)
    }

    pub fn count_txs_by_address(&self, address: &str) -> Result<u64> {
        self.count_prefix(&format!("ta:{}:", address))
    }

    pub fn delete_tx(batch: &mut WriteBatch, rec: &TxRecord, index_in_block: u32) {
        batch.delete(format!("t:{}", rec.txid).as_bytes());
        batch.delete(format!("tb:{}:{}", h10(rec.height), i5(index_in_block)).as_bytes());
        for addr in &rec.addresses {
            batch.delete(format!("ta:{}:{}:{}", addr, h10(rec.height), rec.txid).as_bytes());
        }
    }

    // ---- coins ----

    pub fn put_coin(batch: &mut WriteBatch, rec: &CoinRecord) -> Result<()> {
        Self::put_json(batch, &format!("c:{}:{}", rec.txid, i5(rec.index)), rec)?;
        batch.put(
            format!("ca:{}:{}:{}", rec.address, rec.txid, i5(rec.index)).as_bytes(),
            b"",
        );
        batch.put(
            format!("ch:{}:{}:{}", h10(rec.height), rec.txid, i5(rec.index)).as_bytes(),
            b"",
        );
        if let Some(nh) = &rec.name_hash {
            batch.put(
                format!("cn:{}:{}:{}:{}", nh, t10(rec.time), rec.txid, i5(rec.index)).as_bytes(),
                b"",
            );
            if rec.covenant_type == Covenant::Bid as u8 {
                batch.put(
                    format!(
                        "cb:{}:{}:{}:{}",
                        v20(rec.value),
                        t10(rec.time),
                        rec.txid,
                        i5(rec.index)
                    )
                    .as_bytes(),
                    nh.as_bytes(),
                );
            }
        }
        if rec.spent {
            if let (Some(stxid), Some(sidx)) = (&rec.spent_txid, rec.spent_index) {
                batch.put(
                    format!("cs:{}:{}", stxid, i5(sidx)).as_bytes(),
                    format!("c:{}:{}", rec.txid, i5(rec.index)).as_bytes(),
                );
            }
        }
        Ok(())
    }

    pub fn get_coin(&self, txid: &str, index: u32) -> Result<Option<CoinRecord>> {
        self.get_json(&format!("c:{}:{}", txid, i5(index)))
    }

    fn coin_from_index_key(&self, key: &str) -> Result<Option<CoinRecord>> {
        // composite index keys end in ...:{txid}:{idx}
        let mut parts = key.rsplit(':');
        let (Some(idx), Some(txid)) = (parts.next(), parts.next()) else {
            return Ok(None);
        };
        let index: u32 = idx.parse()?;
        self.get_coin(txid, index)
    }

    /// Every coin carrying this name hash, oldest first.
    pub fn coins_by_name(&self, name_hash: &str) -> Result<Vec<CoinRecord>> {
        let prefix = format!("cn:{}:", name_hash);
        let mut keys = Vec::new();
        self.scan_range(&prefix, &prefix_end(&prefix), |key, _| {
            keys.push(key.to_string());
            true
        })?;
        let mut coins = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(coin) = self.coin_from_index_key(&key)? {
                coins.push(coin);
            }
        }
        Ok(coins)
    }

    /// Page of coins carrying this name hash, newest first.
    pub fn coins_by_name_rev(
        &self,
        name_hash: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CoinRecord>> {
        let prefix = format!("cn:{}:", name_hash);
        let mut keys = Vec::new();
        let mut seen = 0usize;
        self.scan_range_rev(&prefix, &prefix_end(&prefix), |key, _| {
            if seen >= offset {
                keys.push(key.to_string());
            }
            seen += 1;
            keys.len() < limit
        })?;
        let mut coins = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(coin) = self.coin_from_index_key(&key)? {
                coins.push(coin);
            }
        }
        Ok(coins)
    }

    pub fn count_coins_by_name(&self, name_hash: &str) -> Result<u64> {
        self.count_prefix(&format!("cn:{}:", name_hash))
    }

    pub fn coins_by_address(&self, address: &str) -> Result<Vec<CoinRecord>> {
        let prefix = format!("ca:{}:", address);
        let mut keys = Vec::new();
        self.scan_range(&prefix, &prefix_end(&prefix), |key, _| {
            keys.push(key.to_string());
            true
        })?;
        let mut coins = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(coin) = self.coin_from_index_key(&key)? {
                coins.push(coin);
            }
        }
        Ok(coins)
    }

    /// Coins created at a height. Rollback works through this.
    pub fn coins_by_height(&self, height: u32) -> Result<Vec<CoinRecord>> {
        let prefix = format!("ch:{}:", h10(height));
        let mut keys = Vec::new();
        self.scan_range(&prefix, &prefix_end(&prefix), |key, _| {
            keys.push(key.to_string());
            true
        })?;
        let mut coins = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(coin) = self.coin_from_index_key(&key)? {
                coins.push(coin);
            }
        }
        Ok(coins)
    }

    /// Coins marked spent by the given transaction.
    pub fn coins_spent_by(&self, txid: &str) -> Result<Vec<CoinRecord>> {
        let prefix = format!("cs:{}:", txid);
        let mut coin_keys = Vec::new();
        self.scan_range(&prefix, &prefix_end(&prefix), |_, value| {
            if let Ok(key) = std::str::from_utf8(value) {
                coin_keys.push(key.to_string());
            }
            true
        })?;
        let mut coins = Vec::with_capacity(coin_keys.len());
        for key in coin_keys {
            if let Some(rec) = self.get_json::<CoinRecord>(&key)? {
                coins.push(rec);
            }
        }
        Ok(coins)
    }

    pub fn delete_spent_index(batch: &mut WriteBatch, spent_txid: &str, spent_index: u32) {
        batch.delete(format!("cs:{}:{}", spent_txid, i5(spent_index)).as_bytes());
    }

    pub fn delete_coin(batch: &mut WriteBatch, rec: &CoinRecord) {
        batch.delete(format!("c:{}:{}", rec.txid, i5(rec.index)).as_bytes());
        batch.delete(format!("ca:{}:{}:{}", rec.address, rec.txid, i5(rec.index)).as_bytes());
        batch.delete(format!("ch:{}:{}:{}", h10(rec.height), rec.txid, i5(rec.index)).as_bytes());
        if let Some(nh) = &rec.name_hash {
            batch.delete(
                format!("cn:{}:{}:{}:{}", nh, t10(rec.time), rec.txid, i5(rec.index)).as_bytes(),
            );
            if rec.covenant_type == Covenant::Bid as u8 {
                batch.delete(
                    format!(
                        "cb:{}:{}:{}:{}",
                        v20(rec.value),
                        t10(rec.time),
                        rec.txid,
                        i5(rec.index)
                    )
                    .as_bytes(),
                );
            }
        }
        if let (Some(stxid), Some(sidx)) = (&rec.spent_txid, rec.spent_index) {
            batch.delete(format!("cs:{}:{}", stxid, i5(sidx)).as_bytes());
        }
    }

    /// Walk BID coins from the highest lockup value down. The callback gets
    /// `(value, time, name_hash)` and returns false to stop the scan.
    pub fn scan_bids_desc(
        &self,
        mut f: impl FnMut(u64, u64, &str) -> bool,
    ) -> Result<()> {
        self.scan_range_rev("cb:", &prefix_end("cb:"), |key, value| {
            let mut parts = key.splitn(5, ':');
            let _tag = parts.next();
            let (Some(v), Some(t)) = (parts.next(), parts.next()) else {
                return true;
            };
            let (Ok(v), Ok(t)) = (v.parse::<u64>(), t.parse::<u64>()) else {
                return true;
            };
            let nh = std::str::from_utf8(value).unwrap_or("");
            f(v, t, nh)
        })
    }

    // ---- names ----

    pub fn put_name(
        batch: &mut WriteBatch,
        rec: &NameRecord,
        old: Option<&NameRecord>,
    ) -> Result<()> {
        if let Some(old) = old {
            if old.open != rec.open {
                batch.delete(format!("no:{}:{}", h10(old.open), old.name_hash).as_bytes());
            }
            if old.value != rec.value {
                batch.delete(format!("nv:{}:{}", v20(old.value), old.name_hash).as_bytes());
            }
        }
        Self::put_json(batch, &format!("n:{}", rec.name_hash), rec)?;
        batch.put(
            format!("no:{}:{}", h10(rec.open), rec.name_hash).as_bytes(),
            b"",
        );
        batch.put(
            format!("nv:{}:{}", v20(rec.value), rec.name_hash).as_bytes(),
            b"",
        );
        Ok(())
    }

    pub fn get_name(&self, name_hash: &str) -> Result<Option<NameRecord>> {
        self.get_json(&format!("n:{}", name_hash))
    }

    fn names_from_index_keys(&self, keys: Vec<String>) -> Result<Vec<NameRecord>> {
        let mut names = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(nh) = key.rsplit(':').next() {
                if let Some(rec) = self.get_name(nh)? {
                    names.push(rec);
                }
            }
        }
        Ok(names)
    }

    /// Names with `open ∈ (min, max]`, newest open first.
    pub fn names_by_open_window(
        &self,
        min: u32,
        max: u32,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<NameRecord>> {
        let start = format!("no:{}:", h10(min.saturating_add(1)));
        let end = prefix_end(&format!("no:{}:", h10(max)));
        let mut keys = Vec::new();
        let mut seen = 0usize;
        self.scan_range_rev(&start, &end, |key, _| {
            if seen >= offset {
                keys.push(key.to_string());
            }
            seen += 1;
            keys.len() < limit
        })?;
        self.names_from_index_keys(keys)
    }

    pub fn count_names_by_open_window(&self, min: u32, max: u32) -> Result<u64> {
        let start = format!("no:{}:", h10(min.saturating_add(1)));
        let end = prefix_end(&format!("no:{}:", h10(max)));
        let mut count = 0u64;
        self.scan_range(&start, &end, |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// Names opened above a height. Rollback deletes these.
    pub fn names_opened_above(&self, height: u32) -> Result<Vec<NameRecord>> {
        let start = format!("no:{}:", h10(height.saturating_add(1)));
        let end = prefix_end("no:");
        let mut keys = Vec::new();
        self.scan_range(&start, &end, |key, _| {
            keys.push(key.to_string());
            true
        })?;
        self.names_from_index_keys(keys)
    }

    /// Names by `value` descending.
    pub fn top_names_by_value(&self, offset: usize, limit: usize) -> Result<Vec<NameRecord>> {
        let mut keys = Vec::new();
        let mut seen = 0usize;
        self.scan_range_rev("nv:", &prefix_end("nv:"), |key, _| {
            if seen >= offset {
                keys.push(key.to_string());
            }
            seen += 1;
            keys.len() < limit
        })?;
        self.names_from_index_keys(keys)
    }

    pub fn count_names(&self) -> Result<u64> {
        self.count_prefix("n:")
    }

    pub fn delete_name(batch: &mut WriteBatch, rec: &NameRecord) {
        batch.delete(format!("n:{}", rec.name_hash).as_bytes());
        batch.delete(format!("no:{}:{}", h10(rec.open), rec.name_hash).as_bytes());
        batch.delete(format!("nv:{}:{}", v20(rec.value), rec.name_hash).as_bytes());
    }

    // ---- summaries ----

    pub fn put_summary(batch: &mut WriteBatch, rec: &SummaryRecord) -> Result<()> {
        Self::put_json(batch, &format!("s:{}", t10(rec.time)), rec)
    }

    pub fn get_summary(&self, day_time: u64) -> Result<Option<SummaryRecord>> {
        self.get_json(&format!("s:{}", t10(day_time)))
    }

    pub fn latest_summary(&self) -> Result<Option<SummaryRecord>> {
        let mut out = None;
        self.scan_range_rev("s:", &prefix_end("s:"), |_, value| {
            out = serde_json::from_slice(value).ok();
            false
        })?;
        Ok(out)
    }

    /// Summaries with `time ∈ [start, end]`, oldest first.
    pub fn summaries_in_range(&self, start: u64, end: u64) -> Result<Vec<SummaryRecord>> {
        let start_key = format!("s:{}", t10(start));
        let end_key = prefix_end(&format!("s:{}", t10(end)));
        let mut out = Vec::new();
        self.scan_range(&start_key, &end_key, |_, value| {
            if let Ok(rec) = serde_json::from_slice(value) {
                out.push(rec);
            }
            true
        })?;
        Ok(out)
    }

    pub fn delete_summary(batch: &mut WriteBatch, day_time: u64) {
        batch.delete(format!("s:{}", t10(day_time)).as_bytes());
    }
}
