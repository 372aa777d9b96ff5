// src/main.rs
mod api;
mod auth;
mod config;
mod db;
mod error;
#[cfg(test)]
mod memory;
mod models;
mod store;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::db::ScyllaStore;
use crate::store::Store;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    // One session for the whole process, handed to every handler.
    let session = match db::connect(&config.scylla_uri).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    let scylla = ScyllaStore::new(session, &config.db_name);
    if let Err(e) = scylla.init_schema().await {
        error!("Failed to create schema: {}", e);
        return;
    }
    let store: Arc<dyn Store> = Arc::new(scylla);
    let tokens = Arc::new(TokenIssuer::new(&config.jwt_secret));

    let api = api::routes(store, tokens);

    info!("Server running on http://{}", config.bind_addr);
    warp::serve(api).run(config.bind_addr).await;
}
