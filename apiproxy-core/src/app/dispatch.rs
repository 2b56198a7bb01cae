//! # Request Dispatcher
//!
//! The single entry point for every client request. The dispatcher captures
//! the active servers configuration, classifies the request path, and either
//! relays the request to the owning upstream server, hands it to the
//! enumerate or reserve handler, or rejects it with `502 Bad Gateway`.
//!
//! ## Classification
//!
//! 1. The mode's reserve path is handled locally.
//! 2. Paths matching the sharded pattern carry entity ids; the ids are
//!    hashed into a sharding key and the key selects the upstream.
//! 3. Paths matching the global pattern can be answered by any server; a
//!    random id spreads them uniformly over the fleet.
//! 4. Everything else is unknown and yields `502`, as does every request
//!    while no valid servers configuration is loaded.

use actix_web::{web, HttpRequest, HttpResponse};
use awc::error::{PayloadError, SendRequestError};
use bytes::Bytes;
use futures_util::Stream;
use rand::Rng;

use crate::app::{enumerate, reserve};
use crate::config::Settings;
use crate::mode::Mode;
use crate::routing::servers::ServersConfig;
use crate::service::registry;
use crate::sharding::{parse_i64, shard_key};

pub(crate) const FORWARD_ERROR_TEXT: &str =
    "The request can not be forwarded to an Web API server.\n";

/// Handles one client request end to end.
pub async fn dispatch(
    req: HttpRequest,
    payload: web::Payload,
    client: web::Data<awc::Client>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let Some(config) = registry::current() else {
        return bad_gateway();
    };
    let mode = &settings.mode;

    if mode.reserve_path() == Some(req.path()) {
        return reserve::handle(&req, &client, mode, &config).await;
    }

    let Some(forward_url) = find_server_url(req.path(), mode, &config) else {
        return bad_gateway();
    };

    let self_handled = mode.enumerate_re().is_some_and(|re| re.is_match(req.path()));
    if self_handled {
        return enumerate::handle(&req, payload, &client, mode, config, forward_url).await;
    }

    relay(&req, payload, &client, &forward_url).await
}

/// Resolves the upstream server responsible for a request path.
///
/// Sharded paths contribute their parsed ids to the sharding key; a path
/// whose id segment fails the 64-bit grammar degrades to unknown. Global
/// paths are assigned a random non-negative id below one billion, which
/// load balances them across the whole trie.
pub(crate) fn find_server_url(path: &str, mode: &Mode, config: &ServersConfig) -> Option<String> {
    if let Some(caps) = mode.sharded_re().captures(path) {
        let first = parse_i64(caps.get(1)?.as_str())?;
        let second = match caps.get(2) {
            Some(m) => Some(parse_i64(m.as_str())?),
            None => None,
        };
        let key = shard_key(first, second);
        return Some(config.match_sharding_key(key).to_string());
    }
    if mode.global_re().is_some_and(|re| re.is_match(path)) {
        let id = rand::thread_rng().gen_range(0..1_000_000_000i64);
        let key = shard_key(id, None);
        return Some(config.match_sharding_key(key).to_string());
    }
    None
}

/// Joins an upstream base URL with a request target.
pub(crate) fn upstream_url(base: &str, path_and_query: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path_and_query)
}

pub(crate) fn request_target(req: &HttpRequest) -> String {
    req.uri()
        .path_and_query()
        .map(|target| target.as_str())
        .unwrap_or_else(|| req.path())
        .to_string()
}

async fn relay(
    req: &HttpRequest,
    payload: web::Payload,
    client: &awc::Client,
    forward_url: &str,
) -> HttpResponse {
    let url = upstream_url(forward_url, &request_target(req));
    let upstream_req = client.request_from(url.as_str(), req.head()).no_decompress();
    match upstream_req.send_stream(payload).await {
        Ok(res) => stream_response(res),
        Err(err) => upstream_error(err),
    }
}

/// Streams an upstream response back to the client unchanged.
pub(crate) fn stream_response<S>(res: awc::ClientResponse<S>) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, PayloadError>> + Unpin + 'static,
{
    let mut builder = HttpResponse::build(res.status());
    for (name, value) in res.headers().iter().filter(|(name, _)| *name != "connection") {
        builder.insert_header((name.clone(), value.clone()));
    }
    builder.streaming(res)
}

pub(crate) fn bad_gateway() -> HttpResponse {
    HttpResponse::BadGateway()
        .content_type("text/plain")
        .body(FORWARD_ERROR_TEXT)
}

pub(crate) fn upstream_error(err: SendRequestError) -> HttpResponse {
    log::warn!("upstream request failed: {}", err);
    HttpResponse::BadGateway()
        .content_type("text/plain")
        .body(err.to_string())
}
