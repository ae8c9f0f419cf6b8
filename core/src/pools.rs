use serde::{Deserialize, Serialize};
use std::path::Path;

/// A known mining pool: display name, homepage, and the payout addresses it
/// mines to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    #[serde(default)]
    pub url: String,
    pub addresses: Vec<String>,
}

/// Ordered pool table used for coinbase attribution. First address match
/// wins; a miss attributes the block to `"unknown"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolTable {
    pub pools: Vec<Pool>,
}

pub const UNKNOWN_MINER: &str = "unknown";

impl PoolTable {
    pub fn new(pools: Vec<Pool>) -> Self {
        Self { pools }
    }

    /// Load a table from a JSON file of the shape `{"pools":[...]}`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Pool label for a coinbase payout address.
    pub fn attribute(&self, address: &str) -> &str {
        self.lookup(address)
            .map(|p| p.name.as_str())
            .unwrap_or(UNKNOWN_MINER)
    }

    pub fn lookup(&self, address: &str) -> Option<&Pool> {
        self.pools
            .iter()
            .find(|p| p.addresses.iter().any(|a| a == address))
    }

    pub fn url_of(&self, miner: &str) -> Option<&str> {
        self.pools
            .iter()
            .find(|p| p.name == miner)
            .map(|p| p.url.as_str())
    }
}
