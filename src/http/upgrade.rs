//! Shared `Upgrade:` header negotiation used by both `/game/connect/:key`
//! and `/game/master`.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONNECTION, UPGRADE};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};

use crate::error::Error;
use crate::transport::frame::accept_key;
use crate::transport::Role;

/// The result of inspecting a request's `Connection`/`Upgrade` headers.
pub enum UpgradeRequest {
    WebSocket { client_key: String, subprotocol: Option<&'static str> },
    Raw,
}

impl UpgradeRequest {
    pub fn role(&self) -> Role {
        match self {
            UpgradeRequest::WebSocket { .. } => Role::WebSocket,
            UpgradeRequest::Raw => Role::Raw,
        }
    }
}

/// Returns `Ok(None)` when the request carries no `Upgrade` header at all
/// (an ordinary GET), `Ok(Some(_))` on a well-formed upgrade request, and
/// `Err` when an `Upgrade` header is present but malformed.
pub fn parse_upgrade(headers: &HeaderMap) -> Result<Option<UpgradeRequest>, Error> {
    let connection_has_upgrade = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(header_contains_token);
    let Some(upgrade) = headers.get(UPGRADE).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    if !connection_has_upgrade {
        return Ok(None);
    }

    if upgrade.eq_ignore_ascii_case("websocket") {
        let version_ok = headers.get("sec-websocket-version").and_then(|v| v.to_str().ok()) == Some("13");
        let client_key = headers.get("sec-websocket-key").and_then(|v| v.to_str().ok());
        match (version_ok, client_key) {
            (true, Some(client_key)) => {
                let subprotocol = headers.get("sec-websocket-protocol").map(|_| "chat");
                Ok(Some(UpgradeRequest::WebSocket {
                    client_key: client_key.to_string(),
                    subprotocol,
                }))
            }
            _ => Err(Error::BadUpgrade("missing or invalid websocket handshake headers")),
        }
    } else if upgrade.eq_ignore_ascii_case("raw") {
        Ok(Some(UpgradeRequest::Raw))
    } else {
        Err(Error::BadUpgrade("unrecognized Upgrade header value"))
    }
}

fn header_contains_token(value: &str) -> bool {
    value.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Builds the 101 response for an accepted upgrade. The HTTP keep-alive
/// state is implicitly dropped since the connection is about to be handed
/// off to raw byte forwarding.
pub fn switching_protocols(upgrade: &UpgradeRequest) -> Response<Body> {
    let builder = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS).header(CONNECTION, "Upgrade");

    match upgrade {
        UpgradeRequest::WebSocket { client_key, subprotocol } => {
            let mut builder = builder
                .header(UPGRADE, "websocket")
                .header("Sec-WebSocket-Accept", accept_key(client_key));
            if let Some(subprotocol) = subprotocol {
                builder = builder.header("Sec-WebSocket-Protocol", HeaderValue::from_static(subprotocol));
            }
            builder.body(Body::empty()).expect("static upgrade response is valid")
        }
        UpgradeRequest::Raw => builder
            .header(UPGRADE, "raw")
            .header(CACHE_CONTROL, "no-store")
            .body(Body::empty())
            .expect("static upgrade response is valid"),
    }
}
