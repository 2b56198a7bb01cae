//! # Enumerate Rewriter
//!
//! Backends paginate entity listings per shard: each page of an
//! `ObjectReferencesPage` points at the next page on the same server, and
//! the chain simply ends when the shard is exhausted. This module stitches
//! those per-shard chains into one fleet-wide chain by rewriting the final
//! page of every shard to point at the first owned id of the next server in
//! the configured total order.
//!
//! Chains are only meaningful while the routing plane stays the same, so
//! every rewritten link carries a `v=<version>` parameter. When a page is
//! requested with a version that no longer matches the active
//! configuration, the page is emptied and its `next` link is pointed at a
//! path that matches no route, forcing the client to restart the traversal.
//!
//! Responses that are not well-formed pages (wrong status, wrong content
//! type, unexpected JSON shape, or bodies above the buffering cap) are
//! relayed to the client unchanged.

use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use awc::error::PayloadError;
use bytes::BytesMut;
use futures_util::{stream, StreamExt};
use serde_json::Value;

use crate::app::dispatch::{request_target, stream_response, upstream_error, upstream_url};
use crate::mode::Mode;
use crate::routing::servers::ServersConfig;
use crate::service::registry;
use crate::sharding::i2u;

/// Pages above this size are relayed without rewriting.
const BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Forwards an enumerate request and rewrites the response page.
///
/// The upstream response is fully buffered before the rewrite; the
/// `snapshot` is the configuration that routed the request, captured at
/// dispatch time, while the consistency check also looks at whatever
/// configuration is active once the response has arrived.
pub async fn handle(
    req: &HttpRequest,
    payload: web::Payload,
    client: &awc::Client,
    mode: &Mode,
    snapshot: Arc<ServersConfig>,
    forward_url: String,
) -> HttpResponse {
    let url = upstream_url(&forward_url, &request_target(req));
    let upstream_req = client.request_from(url.as_str(), req.head()).no_decompress();
    let mut res = match upstream_req.send_stream(payload).await {
        Ok(res) => res,
        Err(err) => return upstream_error(err),
    };

    if res.status() != StatusCode::OK || !is_json(res.headers()) {
        return stream_response(res);
    }

    let mut buffered = BytesMut::new();
    while let Some(chunk) = res.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                log::warn!("reading an enumerate response failed: {}", err);
                return HttpResponse::BadGateway()
                    .content_type("text/plain")
                    .body(err.to_string());
            }
        };
        if buffered.len() + chunk.len() > BODY_LIMIT {
            log::warn!("enumerate response too large to rewrite, relaying it unchanged");
            buffered.extend_from_slice(&chunk);
            let mut builder = relay_builder(res.status(), res.headers());
            let head = stream::iter([Ok::<_, PayloadError>(buffered.freeze())]);
            return builder.streaming(head.chain(res));
        }
        buffered.extend_from_slice(&chunk);
    }
    let body = buffered.freeze();

    let query_v = first_v_param(req.query_string());
    let live = registry::current();
    let rewritten = rewrite_page(
        &body,
        query_v.as_deref(),
        snapshot.version(),
        &forward_url,
        live.as_deref(),
        mode,
    );
    match rewritten {
        Some(page) => relay_builder(res.status(), res.headers()).body(page),
        None => relay_builder(res.status(), res.headers()).body(body),
    }
}

/// Rewrites one buffered page, or returns `None` to relay it unchanged.
///
/// Only objects with `type == "ObjectReferencesPage"`, a string `uri`, and
/// an absent-or-string `next` qualify. The effective version `v` is the
/// request's `v` parameter, or the snapshot version on the first page of a
/// traversal. While `v`, the snapshot, and the active configuration all
/// agree, in-shard `next` links get the version appended and the final page
/// of a shard is pointed at the successor server's first owned id. Any
/// disagreement means the traversal straddled a reconfiguration: the page
/// is emptied and `next` is pointed at the invalid path.
pub(crate) fn rewrite_page(
    body: &[u8],
    query_v: Option<&str>,
    snapshot_version: &str,
    forward_url: &str,
    live: Option<&ServersConfig>,
    mode: &Mode,
) -> Option<String> {
    let mut page: Value = serde_json::from_slice(body).ok()?;
    let object = page.as_object_mut()?;
    if object.get("type").and_then(Value::as_str) != Some("ObjectReferencesPage") {
        return None;
    }
    let uri = object.get("uri")?.as_str()?.to_string();
    let next = match object.get("next") {
        None => None,
        Some(Value::String(next)) => Some(next.clone()),
        Some(_) => return None,
    };

    let v = query_v.unwrap_or(snapshot_version);
    object.insert("uri".to_string(), Value::String(format!("{uri}?v={v}")));

    let unchanged =
        v == snapshot_version && live.is_some_and(|live| live.version() == snapshot_version);
    if unchanged {
        let live = live?;
        match next {
            Some(next) if !next.is_empty() => {
                object.insert("next".to_string(), Value::String(format!("{next}?v={v}")));
            }
            _ => {
                // The shard is exhausted; continue on the next server, or
                // end the chain if this was the last one.
                if let Some(successor) = live.successor_of(forward_url) {
                    let min_id = live.min_id(successor)?;
                    let path = mode.enumerate_path(i2u(min_id), v)?;
                    object.insert("next".to_string(), Value::String(path));
                }
            }
        }
    } else {
        object.insert("items".to_string(), Value::Array(Vec::new()));
        object.insert(
            "next".to_string(),
            Value::String(mode.invalid_path()?.to_string()),
        );
    }

    serde_json::to_string(&page).ok()
}

/// The first `v` parameter of a query string, if any.
pub(crate) fn first_v_param(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("v=").map(str::to_string))
}

fn is_json(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or("").trim())
        .is_some_and(|essence| essence.eq_ignore_ascii_case("application/json"))
}

fn relay_builder(status: StatusCode, headers: &header::HeaderMap) -> HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    for (name, value) in headers
        .iter()
        .filter(|(name, _)| *name != "connection" && *name != "content-length")
    {
        builder.insert_header((name.clone(), value.clone()));
    }
    builder
}
