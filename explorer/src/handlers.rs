use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::aggregates::AggregateCache;
use crate::error::ApiError;
use crate::geo::{GeoPoint, GeoResolver};
use crate::query::{ChartType, NameStatus, Page, Query};
use crate::rpc::ChainBackend;
use hnscan_core::{name, verify_address_syntax};
use hnscan_config::Config;

const MAX_LIMIT: usize = 50;

pub struct AppContext<C: ChainBackend> {
    pub query: Query<C>,
    pub cache: Arc<AggregateCache>,
    pub geo: Option<GeoResolver>,
    pub config: Config,
    pub hrp: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn paging(limit: Option<usize>, offset: Option<usize>, default_limit: usize) -> Result<(usize, usize), ApiError> {
    let limit = limit.unwrap_or(default_limit);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok((limit, offset.unwrap_or(0)))
}

fn is_hex_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Host and port of the upstream node, for the status payload.
fn node_addr(url: &str) -> (String, u16) {
    let stripped = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url);
    let authority = stripped.split('/').next().unwrap_or(stripped);
    match authority.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse().unwrap_or(80),
        ),
        None => (authority.to_string(), 80),
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn summary<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
) -> Result<HttpResponse, ApiError> {
    let counts = ctx
        .query
        .get_summary_counts()
        .await
        .map_err(ApiError::transient)?;
    Ok(HttpResponse::Ok().json(counts))
}

pub async fn status<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
) -> Result<HttpResponse, ApiError> {
    let (host, port) = node_addr(&ctx.config.node_url);
    let status = ctx
        .query
        .get_status(&host, port, !ctx.config.node_api_key.is_empty())
        .await
        .map_err(ApiError::transient)?;
    Ok(HttpResponse::Ok().json(status))
}

pub async fn mempool<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    params: web::Query<PageParams>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = paging(params.limit, params.offset, 25)?;
    let (total, items) = ctx
        .query
        .get_mempool_page(offset, limit)
        .await
        .map_err(ApiError::transient)?;
    Ok(HttpResponse::Ok().json(json!({
        "total": total,
        "limit": limit,
        "offset": offset,
        "items": items,
    })))
}

pub async fn blocks<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    params: web::Query<PageParams>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = paging(params.limit, params.offset, 25)?;
    let tip = ctx.query.head()?.unwrap_or(0);
    if offset > tip as usize {
        return Err(ApiError::bad_request("offset is beyond the chain tip"));
    }
    let page = ctx
        .query
        .get_blocks(offset, limit)
        .await
        .map_err(ApiError::transient)?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn block_by_height<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let height: u32 = path
        .parse()
        .map_err(|_| ApiError::bad_request("height must be a non-negative integer"))?;
    let block = ctx
        .query
        .get_block(height, true)
        .await
        .map_err(ApiError::transient)?
        .ok_or(ApiError::NotFound("block"))?;
    Ok(HttpResponse::Ok().json(block))
}

#[derive(Debug, Deserialize)]
pub struct TxsParams {
    pub height: Option<u32>,
    pub address: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn txs<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    params: web::Query<TxsParams>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = paging(params.limit, params.offset, 25)?;
    // height wins when both filters are present
    let page = if let Some(height) = params.height {
        ctx.query
            .get_transactions_by_height(height, offset, limit)
            .await
            .map_err(ApiError::transient)?
    } else if let Some(address) = &params.address {
        if !verify_address_syntax(address, ctx.hrp) {
            return Err(ApiError::bad_request("invalid address"));
        }
        ctx.query
            .get_transactions_by_address(address, offset, limit)
            .await
            .map_err(ApiError::transient)?
    } else {
        // no filter: latest transactions, walking back from the tip
        let result = ctx
            .query
            .get_transactions(limit)
            .await
            .map_err(ApiError::transient)?;
        let total = ctx.query.total_txs()?;
        return Ok(HttpResponse::Ok().json(json!({
            "total": total,
            "limit": limit,
            "offset": 0,
            "result": result,
        })));
    };
    Ok(HttpResponse::Ok().json(page))
}

pub async fn tx_by_hash<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let hash = path.to_ascii_lowercase();
    if !is_hex_hash(&hash) {
        return Err(ApiError::bad_request("invalid transaction hash"));
    }
    let tx = ctx
        .query
        .get_transaction(&hash)
        .await
        .map_err(ApiError::transient)?
        .ok_or(ApiError::NotFound("transaction"))?;
    Ok(HttpResponse::Ok().json(tx))
}

#[derive(Debug, Deserialize)]
pub struct NamesParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn names<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    params: web::Query<NamesParams>,
) -> Result<HttpResponse, ApiError> {
    let (limit, offset) = paging(params.limit, params.offset, 25)?;
    // type overrides status
    if let Some(kind) = params.kind.as_deref() {
        let page = match kind {
            "value" => ctx.query.get_names_by_value(offset, limit)?,
            "weekBid" | "monthBid" => {
                let snap = ctx.cache.snapshot();
                let list = if kind == "weekBid" {
                    &snap.week_bids
                } else {
                    &snap.month_bids
                };
                let result: Vec<_> = list.iter().skip(offset).take(limit).cloned().collect();
                return Ok(HttpResponse::Ok().json(json!({
                    "total": list.len(),
                    "limit": limit,
                    "offset": offset,
                    "result": result,
                })));
            }
            _ => return Err(ApiError::bad_request("unknown type")),
        };
        return Ok(HttpResponse::Ok().json(page));
    }
    let Some(status) = params.status.as_deref().and_then(NameStatus::parse) else {
        return Err(ApiError::bad_request("unknown or missing status"));
    };
    let page = ctx
        .query
        .get_names_by_status(status, offset, limit)
        .await
        .map_err(ApiError::transient)?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn name_by_name<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.to_ascii_lowercase();
    if !name::verify_string(&raw) {
        return Err(ApiError::bad_request("invalid name"));
    }
    let view = ctx
        .query
        .get_name(&raw)
        .await
        .map_err(ApiError::transient)?
        .ok_or(ApiError::NotFound("name"))?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn name_history<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    path: web::Path<String>,
    params: web::Query<PageParams>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.to_ascii_lowercase();
    if !name::verify_string(&raw) {
        return Err(ApiError::bad_request("invalid name"));
    }
    let (limit, offset) = paging(params.limit, params.offset, 25)?;
    let page = ctx
        .query
        .get_name_history(&name::hash_name(&raw), offset, limit)?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn address<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let addr = path.into_inner();
    if !verify_address_syntax(&addr, ctx.hrp) {
        return Err(ApiError::bad_request("invalid address"));
    }
    let balance = ctx.query.get_address(&addr)?;
    Ok(HttpResponse::Ok().json(balance))
}

pub async fn address_mempool<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let addr = path.into_inner();
    if !verify_address_syntax(&addr, ctx.hrp) {
        return Err(ApiError::bad_request("invalid address"));
    }
    let txs = ctx
        .query
        .get_address_mempool(&addr)
        .await
        .map_err(ApiError::transient)?;
    Ok(HttpResponse::Ok().json(txs))
}

#[derive(Debug, Deserialize)]
pub struct PeersParams {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

pub async fn peers<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    params: web::Query<PeersParams>,
) -> Result<HttpResponse, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let (limit, _) = paging(params.limit, None, 10)?;
    let offset = (page - 1) * limit;
    let (total, result) = ctx
        .query
        .get_peers(offset, limit)
        .await
        .map_err(ApiError::transient)?;
    Ok(HttpResponse::Ok().json(json!({
        "total": total,
        "result": result,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub async fn search<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, ApiError> {
    let Some(q) = params.q.as_deref().filter(|q| !q.trim().is_empty()) else {
        return Err(ApiError::bad_request("q is required"));
    };
    Ok(HttpResponse::Ok().json(ctx.query.search(q)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

pub async fn chart<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    path: web::Path<String>,
    params: web::Query<RangeParams>,
) -> Result<HttpResponse, ApiError> {
    let Some(chart) = ChartType::parse(&path) else {
        return Err(ApiError::bad_request("unknown chart type"));
    };
    let start = params.start_time.unwrap_or(0);
    let end = params.end_time.unwrap_or(u64::MAX);
    Ok(HttpResponse::Ok().json(ctx.query.get_series(chart, start, end)?))
}

pub async fn pool_distribution<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
    params: web::Query<RangeParams>,
) -> Result<HttpResponse, ApiError> {
    let start = params.start_time.unwrap_or(0);
    let end = params.end_time.unwrap_or(u64::MAX);
    Ok(HttpResponse::Ok().json(ctx.query.get_pool_distribution(start, end)?))
}

pub async fn mapdata<C: ChainBackend>(
    ctx: web::Data<AppContext<C>>,
) -> Result<HttpResponse, ApiError> {
    let Some(geo) = &ctx.geo else {
        return Ok(HttpResponse::Ok().json(Vec::<GeoPoint>::new()));
    };
    let peers = ctx
        .query
        .get_peers_all()
        .await
        .map_err(ApiError::transient)?;
    let mut points = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for peer in &peers {
        if let Some(point) = geo.locate(&peer.addr) {
            if seen.insert(point.host.clone()) {
                points.push(point);
            }
        }
    }
    Ok(HttpResponse::Ok().json(points))
}

/// Mount every route. Generic over the chain backend so integration tests
/// can drive the full HTTP surface against a mock chain.
pub fn configure<C: ChainBackend>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/summary", web::get().to(summary::<C>))
        .route("/status", web::get().to(status::<C>))
        .route("/mempool", web::get().to(mempool::<C>))
        .route("/blocks", web::get().to(blocks::<C>))
        .route("/blocks/{height}", web::get().to(block_by_height::<C>))
        .route("/txs", web::get().to(txs::<C>))
        .route("/txs/{hash}", web::get().to(tx_by_hash::<C>))
        .route("/names", web::get().to(names::<C>))
        .route("/names/{name}", web::get().to(name_by_name::<C>))
        .route("/names/{name}/history", web::get().to(name_history::<C>))
        .route("/addresses/{hash}", web::get().to(address::<C>))
        .route("/address/{hash}/mempool", web::get().to(address_mempool::<C>))
        .route("/peers", web::get().to(peers::<C>))
        .route("/search", web::get().to(search::<C>))
        .route("/charts/{type}", web::get().to(chart::<C>))
        .route("/pool/distribution", web::get().to(pool_distribution::<C>))
        .route("/mapdata", web::get().to(mapdata::<C>));
}
