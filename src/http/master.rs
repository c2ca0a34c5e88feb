use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use hyper_util::rt::TokioIo;

use super::upgrade;
use super::AppState;
use crate::error::Error;
use crate::transport::{self, Kind, SpliceHandler, Transport};

/// `/game/master`: a game server parks a fresh connection here to await a
/// client. Unlike `connect`, this never fires the client-attach signal and
/// the transport's `peer` stays unset until some later `grab`.
pub async fn master(State(state): State<AppState>, mut req: Request) -> Result<Response, Error> {
    let key = header_str(req.headers(), "Game-Key").ok_or(Error::BadMasterCredentials)?.to_string();
    let secret = header_str(req.headers(), "Game-Secret").ok_or(Error::BadMasterCredentials)?.to_string();

    let session = state.registry.find(&key).ok_or(Error::UnknownKey)?;
    if session.secret != secret {
        return Err(Error::BadMasterCredentials);
    }

    let upgrade_request = upgrade::parse_upgrade(req.headers())?.ok_or(Error::BadUpgrade("master connections must carry an Upgrade header"))?;
    let role = upgrade_request.role();
    let response = upgrade::switching_protocols(&upgrade_request);
    let on_upgrade = hyper::upgrade::on(&mut req);
    let idle = state.config.session_idle();
    let ping_registry = state.ping_registry.clone();

    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                tracing::debug!(error = %err, "master upgrade failed");
                return;
            }
        };

        let (master, master_read) = Transport::new(TokioIo::new(upgraded), role, Kind::Master);
        if role == crate::transport::Role::WebSocket {
            ping_registry.track(&master);
        }
        session.park(role, master.clone(), idle);
        transport::spawn(master, master_read, Arc::new(SpliceHandler));
    });

    Ok(response)
}

fn header_str<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}
