//! # apiproxy
//!
//! A load-balancing HTTP reverse proxy for a sharded financial Web API.
//! Entities (creditors, debtors, or account pairs) live on a fleet of
//! backend servers, partitioned by a 32-bit sharding key derived from the
//! entity ids in each request path. The proxy classifies every request,
//! resolves the owning backend through a binary route trie, and relays the
//! exchange; paginated enumerations are stitched across shards and
//! random-id reservations are retried on collisions.
//!
//! ## Architecture
//!
//! - **sharding**: id parsing and the MD5-based sharding key
//! - **routing**: route grammar, the servers trie, and the immutable
//!   per-reload servers configuration
//! - **service**: the active-configuration registry and the file watcher
//!   that republishes it on change
//! - **app**: the dispatcher and the enumerate/reserve handlers
//!
//! The servers configuration file can be edited at any time; a valid new
//! version is swapped in atomically without interrupting in-flight
//! requests.

use actix_web::{middleware, web, App, HttpServer};
use awc::Client;

use crate::config::Settings;
use crate::service::watcher::{self, ConfigWatcher};

mod app;
mod config;
mod mode;
mod routing;
mod service;
mod sharding;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("invalid proxy settings: {}", err);
            std::process::exit(1);
        }
    };
    log::info!("Starting apiproxy in {} mode...", settings.mode.name());

    log::info!(
        "Loading servers configuration from {}...",
        settings.config_file.display()
    );
    if !watcher::load_once(&settings.config_file) {
        log::warn!("No valid servers configuration; answering 502 until one appears.");
    }

    log::info!("Starting configuration watcher...");
    let _watcher = match ConfigWatcher::start(settings.config_file.clone()) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            log::error!(
                "can not watch {}: {}",
                settings.config_file.display(),
                err
            );
            None
        }
    };

    let bind_address = ("0.0.0.0", settings.port);
    log::info!("Starting HTTP server on {}:{}...", bind_address.0, bind_address.1);

    let timeout = settings.timeout;
    let proxy_timeout = settings.proxy_timeout;
    let app_settings = web::Data::new(settings);
    HttpServer::new(move || {
        // Each worker gets its own upstream client with a keep-alive pool.
        let client = Client::builder()
            .timeout(proxy_timeout)
            .disable_redirects()
            .finish();
        App::new()
            .app_data(web::Data::new(client))
            .app_data(app_settings.clone())
            .wrap(middleware::Logger::default())
            .default_service(web::to(app::dispatch::dispatch))
    })
    .bind(bind_address)?
    .client_request_timeout(timeout)
    .keep_alive(timeout)
    .run()
    .await
}
