mod aggregates;
mod auth;
mod db;
mod error;
mod geo;
mod handlers;
mod indexer;
mod query;
mod records;
mod rpc;
#[cfg(test)]
mod testutil;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use aggregates::AggregateCache;
use db::ExplorerDB;
use geo::GeoResolver;
use handlers::AppContext;
use hnscan_config::Config;
use hnscan_core::{Network, NetworkParams, PoolTable};
use indexer::Indexer;
use query::Query;
use rpc::NodeClient;

const CHAIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("hnscan explorer starting...");

    let config = Config::load();
    let network = Network::from_str_opt(&config.network).unwrap_or_else(|| {
        warn!("Unknown network '{}', falling back to main", config.network);
        Network::Main
    });
    let params = NetworkParams::for_network(network);

    let pools = if config.pools_file.is_empty() {
        PoolTable::default()
    } else {
        match PoolTable::load(&config.pools_file) {
            Ok(table) => {
                info!("Loaded {} mining pools from {}", table.pools.len(), config.pools_file);
                table
            }
            Err(e) => {
                warn!("Failed to load pool table {}: {:#}", config.pools_file, e);
                PoolTable::default()
            }
        }
    };

    let db_path = config.db_path_resolved();
    let db = Arc::new(ExplorerDB::new(&db_path).expect("Failed to open the index store"));
    info!("Index store ready at {:?}", db_path);

    let client = Arc::new(NodeClient::new(&config.node_url, &config.node_api_key));
    info!("Indexing against node at {}", config.node_url);

    // Background indexing against the node
    let indexer = Arc::new(Indexer::new(db.clone(), pools.clone()));
    tokio::spawn(indexer.clone().run(client.clone(), CHAIN_POLL_INTERVAL));

    // Periodically refreshed aggregate views
    let cache = Arc::new(AggregateCache::new(db.clone(), params));
    tokio::spawn(cache.clone().run());

    let geo = if config.geoip_db.is_empty() {
        None
    } else {
        match GeoResolver::open(&config.geoip_db) {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                warn!("Peer map disabled: {:#}", e);
                None
            }
        }
    };

    if config.ssl {
        // TLS termination is left to a fronting proxy
        warn!("ssl is enabled in the config but not handled in-process");
    }

    let ctx = web::Data::new(AppContext {
        query: Query::new(db, client, params, pools),
        cache,
        geo,
        config: config.clone(),
        hrp: network.address_hrp(),
    });
    let config_data = web::Data::new(config.clone());

    let bind_addr = (config.http_host.clone(), config.http_port);
    info!("Server listening on http://{}:{}", bind_addr.0, bind_addr.1);

    let cors_enabled = config.cors;
    HttpServer::new(move || {
        let cors = if cors_enabled {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        } else {
            Cors::default()
        };

        App::new()
            .app_data(ctx.clone())
            .app_data(config_data.clone())
            .wrap(middleware::from_fn(auth::basic_auth))
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(handlers::configure::<NodeClient>)
    })
    .bind(bind_addr)?
    .run()
    .await
}
