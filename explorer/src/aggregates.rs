use anyhow::Result;
use log::{error, info};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db::ExplorerDB;
use crate::query::NameSummary;
use hnscan_core::NetworkParams;

const REFRESH_INTERVAL: Duration = Duration::from_secs(20 * 60);
const SETTLE_DELAY: Duration = Duration::from_secs(10);
const TOP_NAMES: usize = 50;
const TOP_BIDS: usize = 10;
const WEEK: u64 = 7 * 86_400;
const MONTH: u64 = 30 * 86_400;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub opening: u64,
    pub bidding: u64,
    pub reveal: u64,
    pub closed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopBid {
    pub name: String,
    pub name_hash: String,
    pub highest: u64,
}

/// One refresh's worth of derived views. Replaced wholesale; readers hold an
/// `Arc` and never see a half-built refresh.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Chain height the lifecycle counts were computed against.
    pub height: u32,
    pub refreshed_at: u64,
    pub top_value: Vec<NameSummary>,
    pub status_counts: StatusCounts,
    pub week_bids: Vec<TopBid>,
    pub month_bids: Vec<TopBid>,
}

pub struct AggregateCache {
    db: Arc<ExplorerDB>,
    params: NetworkParams,
    snap: RwLock<Arc<Snapshot>>,
}

impl AggregateCache {
    pub fn new(db: Arc<ExplorerDB>, params: NetworkParams) -> Self {
        Self {
            db,
            params,
            snap: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// The current snapshot. A refresh racing this read swaps the `Arc`
    /// underneath; the caller keeps the prior one.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snap.read().clone()
    }

    /// Refresh task: one pass after a short settling delay, then every
    /// twenty minutes. Failures keep the previous snapshot serving.
    pub async fn run(self: Arc<Self>) {
        tokio::time::sleep(SETTLE_DELAY).await;
        loop {
            match self.refresh() {
                Ok(()) => info!("Aggregate views refreshed"),
                Err(e) => error!("aggregate refresh failed: {:#}", e),
            }
            tokio::time::sleep(REFRESH_INTERVAL).await;
        }
    }

    pub fn refresh(&self) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.refresh_at(now)
    }

    /// Refresh against an explicit clock. The bid windows are relative to
    /// `now`, so tests pin it.
    pub fn refresh_at(&self, now: u64) -> Result<()> {
        let snap = self.build(now)?;
        *self.snap.write() = Arc::new(snap);
        Ok(())
    }

    fn build(&self, now: u64) -> Result<Snapshot> {
        let head = self.db.head()?.unwrap_or(0);

        let top_value = self
            .db
            .top_names_by_value(0, TOP_NAMES)?
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

        let op = self.params.open_period();
        let bp = self.params.bidding_period;
        let rp = self.params.reveal_period;
        let status_counts = StatusCounts {
            opening: self
                .db
                .count_names_by_open_window(head.saturating_sub(op), head)?,
            bidding: self.db.count_names_by_open_window(
                head.saturating_sub(op + bp),
                head.saturating_sub(op),
            )?,
            reveal: self.db.count_names_by_open_window(
                head.saturating_sub(op + bp + rp),
                head.saturating_sub(op + bp),
            )?,
            closed: self
                .db
                .count_names_by_open_window(0, head.saturating_sub(op + bp + rp))?,
        };

        let (week_bids, month_bids) = self.top_bids(now)?;

        Ok(Snapshot {
            height: head,
            refreshed_at: now,
            top_value,
            status_counts,
            week_bids,
            month_bids,
        })
    }

    /// Walk BID coins by value descending. The first time a name appears in
    /// the walk is its window maximum, so each list is complete the moment
    /// it holds `TOP_BIDS` distinct names and the scan can stop there.
    fn top_bids(&self, now: u64) -> Result<(Vec<TopBid>, Vec<TopBid>)> {
        let week_cutoff = now.saturating_sub(WEEK);
        let month_cutoff = now.saturating_sub(MONTH);
        let mut week: Vec<TopBid> = Vec::new();
        let mut month: Vec<TopBid> = Vec::new();
        let mut week_seen: HashSet<String> = HashSet::new();
        let mut month_seen: HashSet<String> = HashSet::new();

        self.db.scan_bids_desc(|value, time, name_hash| {
            let in_month =
                time >= month_cutoff && month.len() < TOP_BIDS && !month_seen.contains(name_hash);
            let in_week =
                time >= week_cutoff && week.len() < TOP_BIDS && !week_seen.contains(name_hash);
            if in_month || in_week {
                let name = self
                    .db
                    .get_name(name_hash)
                    .ok()
                    .flatten()
                    .map(|rec| rec.name)
                    .unwrap_or_default();
                let bid = TopBid {
                    name,
                    name_hash: name_hash.to_string(),
                    highest: value,
                };
                if in_month {
                    month_seen.insert(name_hash.to_string());
                    month.push(bid.clone());
                }
                if in_week {
                    week_seen.insert(name_hash.to_string());
                    week.push(bid);
                }
            }
            week.len() < TOP_BIDS || month.len() < TOP_BIDS
        })?;
        Ok((week, month))
    }
}
