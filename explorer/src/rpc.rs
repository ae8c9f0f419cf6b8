use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use hnscan_core::types::{ChainEntry, NameState, NodeInfo, PeerInfo, RpcBlock, RpcTx};

/// Read-side contract against the upstream full node. The node stays the
/// authority on consensus state; the indexer and query engine only ever go
/// through this seam, which keeps both testable against a mock chain.
pub trait ChainBackend: Send + Sync + 'static {
    fn tip(&self) -> impl Future<Output = Result<(u32, String)>> + Send;
    fn entry(&self, height: u32) -> impl Future<Output = Result<Option<ChainEntry>>> + Send;
    fn entry_by_hash(&self, hash: &str) -> impl Future<Output = Result<Option<ChainEntry>>> + Send;
    fn block(&self, height: u32) -> impl Future<Output = Result<Option<RpcBlock>>> + Send;
    fn tx(&self, txid: &str) -> impl Future<Output = Result<Option<RpcTx>>> + Send;
    /// Live auction/ownership state, by name.
    fn name_state(&self, name: &str) -> impl Future<Output = Result<Option<NameState>>> + Send;
    /// Resolve a name hash to the name, when the chain has seen it.
    fn name_by_hash(&self, name_hash: &str)
    -> impl Future<Output = Result<Option<String>>> + Send;
    fn node_info(&self) -> impl Future<Output = Result<NodeInfo>> + Send;
    /// (bytes received, bytes sent) across the node's peer connections.
    fn net_totals(&self) -> impl Future<Output = Result<(u64, u64)>> + Send;
    fn mempool_txids(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
    fn peers(&self) -> impl Future<Output = Result<Vec<PeerInfo>>> + Send;

    /// Median time over the 11 entries ending at `entry`.
    fn median_time(&self, entry: &ChainEntry) -> impl Future<Output = Result<u64>> + Send {
        async move {
            let mut times = vec![entry.time];
            let mut prev = entry.prev_block.clone();
            while times.len() < 11 && !prev.bytes().all(|b| b == b'0') {
                match self.entry_by_hash(&prev).await? {
                    Some(e) => {
                        times.push(e.time);
                        prev = e.prev_block;
                    }
                    None => break,
                }
            }
            times.sort_unstable();
            Ok(times[times.len() / 2])
        }
    }

    /// Hash of the canonical block after `entry`, if one exists.
    fn next_hash(&self, entry: &ChainEntry) -> impl Future<Output = Result<Option<String>>> + Send {
        async move { Ok(self.entry(entry.height + 1).await?.map(|e| e.hash)) }
    }
}

/// Thin reqwest adapter to the node's REST and JSON-RPC surfaces.
pub struct NodeClient {
    base: String,
    api_key: String,
    client: reqwest::Client,
}

impl NodeClient {
    pub fn new(node_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("building http client");
        NodeClient {
            base: node_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        }
    }

    async fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base, path);
        let mut req = self.client.get(&url);
        if !self.api_key.is_empty() {
            req = req.basic_auth("x", Some(&self.api_key));
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("fetching {}", url))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(anyhow!("node returned {} for {}", resp.status(), url));
        }
        let value = resp
            .json::<serde_json::Value>()
            .await
            .with_context(|| format!("parsing response of {}", url))?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn rpc(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let mut req = self
            .client
            .post(&self.base)
            .json(&json!({"method": method, "params": params, "id": 1}));
        if !self.api_key.is_empty() {
            req = req.basic_auth("x", Some(&self.api_key));
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("calling rpc {}", method))?;
        let body = resp
            .json::<serde_json::Value>()
            .await
            .with_context(|| format!("parsing rpc response of {}", method))?;
        if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
            return Err(anyhow!("rpc {} failed: {}", method, err));
        }
        Ok(body.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

impl ChainBackend for NodeClient {
    async fn tip(&self) -> Result<(u32, String)> {
        let info = self.node_info().await?;
        Ok((info.chain.height, info.chain.tip))
    }

    async fn entry(&self, height: u32) -> Result<Option<ChainEntry>> {
        self.get_typed(&format!("/header/{}", height)).await
    }

    async fn entry_by_hash(&self, hash: &str) -> Result<Option<ChainEntry>> {
        self.get_typed(&format!("/header/{}", hash)).await
    }

    async fn block(&self, height: u32) -> Result<Option<RpcBlock>> {
        self.get_typed(&format!("/block/{}", height)).await
    }

    async fn tx(&self, txid: &str) -> Result<Option<RpcTx>> {
        self.get_typed(&format!("/tx/{}", txid)).await
    }

    async fn name_state(&self, name: &str) -> Result<Option<NameState>> {
        let result = self.rpc("getnameinfo", json!([name])).await?;
        let info = result.get("info").cloned().unwrap_or(serde_json::Value::Null);
        if info.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(info)?))
    }

    async fn name_by_hash(&self, name_hash: &str) -> Result<Option<String>> {
        let result = self.rpc("getnamebyhash", json!([name_hash])).await?;
        Ok(result.as_str().map(|s| s.to_string()))
    }

    async fn node_info(&self) -> Result<NodeInfo> {
        self.get_typed("/")
            .await?
            .ok_or_else(|| anyhow!("node info endpoint returned nothing"))
    }

    async fn net_totals(&self) -> Result<(u64, u64)> {
        let totals = self.rpc("getnettotals", json!([])).await?;
        let recv = totals
            .get("totalbytesrecv")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let sent = totals
            .get("totalbytessent")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok((recv, sent))
    }

    async fn mempool_txids(&self) -> Result<Vec<String>> {
        Ok(self.get_typed("/mempool").await?.unwrap_or_default())
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>> {
        let result = self.rpc("getpeerinfo", json!([])).await?;
        Ok(serde_json::from_value(result).unwrap_or_default())
    }
}
