//! # Reserve-Random Handler
//!
//! Creating a new creditor or debtor starts with reserving an unused id.
//! Clients do not get to pick one: they POST to the proxy's reserve
//! endpoint and the proxy draws random ids from its configured interval,
//! asking the owning backend to reserve each one. A `409 Conflict` means
//! the id is already taken and another draw is made; any other backend
//! answer is relayed to the client as-is.

use actix_web::http::{header, Method, StatusCode};
use actix_web::{HttpRequest, HttpResponse};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::app::dispatch::{find_server_url, upstream_url};
use crate::mode::{IdInterval, Mode};
use crate::routing::servers::ServersConfig;
use crate::sharding::i2u;

const MAX_ATTEMPTS: u32 = 100;

/// Relayed reservation responses larger than this are treated as a
/// transport failure.
const RELAY_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// What to do with one backend answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// The drawn id is already taken; draw another one.
    Retry,
    /// Relay this answer to the client verbatim.
    Accept,
}

/// Decides the fate of one reservation attempt from the backend status.
///
/// Only `409 Conflict` means a collision; every other status, success or
/// failure, belongs to the client.
fn classify_attempt(status: StatusCode) -> Attempt {
    if status == StatusCode::CONFLICT {
        Attempt::Retry
    } else {
        Attempt::Accept
    }
}

fn exhaustion_response(reservation_type: &str) -> HttpResponse {
    HttpResponse::InternalServerError()
        .content_type("text/plain")
        .body(format!("All {} attempts have failed.\n", reservation_type))
}

/// Handles one reservation request.
///
/// Draws up to [`MAX_ATTEMPTS`] random ids, POSTing the reservation body to
/// the backend owning each drawn id and forwarding the original client
/// headers. Collisions are retried, transport errors abort the loop, and
/// the first non-conflict answer is relayed verbatim. When every attempt
/// has failed the client receives a `500`.
pub async fn handle(
    req: &HttpRequest,
    client: &awc::Client,
    mode: &Mode,
    config: &ServersConfig,
) -> HttpResponse {
    let Some(interval) = mode.id_interval() else {
        return HttpResponse::NotFound().finish();
    };
    let Some(reservation_type) = mode.reservation_type() else {
        return HttpResponse::NotFound().finish();
    };
    let body = serde_json::json!({ "type": reservation_type }).to_string();

    for _ in 0..MAX_ATTEMPTS {
        let id = draw_id(&interval);
        let path = match mode.reserve_target(i2u(id)) {
            Some(path) => path,
            None => break,
        };
        let forward_url = match find_server_url(&path, mode, config) {
            Some(url) => url,
            None => break,
        };
        let url = upstream_url(&forward_url, &path);

        let mut upstream_req = client
            .request_from(url.as_str(), req.head())
            .method(Method::POST)
            .no_decompress();
        // The reservation body replaces whatever the client sent.
        upstream_req.headers_mut().remove(header::CONTENT_LENGTH);
        upstream_req = upstream_req.insert_header((header::CONTENT_TYPE, "application/json"));

        let mut res = match upstream_req.send_body(body.clone()).await {
            Ok(res) => res,
            Err(err) => {
                log::warn!("reservation attempt failed: {}", err);
                break;
            }
        };
        if classify_attempt(res.status()) == Attempt::Retry {
            continue;
        }
        match res.body().limit(RELAY_BODY_LIMIT).await {
            Ok(relayed) => {
                let mut builder = HttpResponse::build(res.status());
                for (name, value) in res
                    .headers()
                    .iter()
                    .filter(|(name, _)| *name != "connection")
                {
                    builder.insert_header((name.clone(), value.clone()));
                }
                return builder.body(relayed);
            }
            Err(err) => {
                log::warn!("reading a reservation response failed: {}", err);
                break;
            }
        }
    }

    exhaustion_response(reservation_type)
}

/// Draws a uniform random id from the interval, using OS randomness.
///
/// Eight random bytes are read as a big-endian unsigned integer, reduced
/// modulo the interval span, and offset by the interval minimum; the
/// wrapping arithmetic keeps the reduction correct over the full 64-bit
/// range.
fn draw_id(interval: &IdInterval) -> i64 {
    let mut raw = [0u8; 8];
    OsRng.fill_bytes(&mut raw);
    let r = u64::from_be_bytes(raw);
    let span = interval.max.wrapping_sub(interval.min) as u64;
    let offset = if span == u64::MAX { r } else { r % (span + 1) };
    interval.min.wrapping_add(offset as i64)
}
