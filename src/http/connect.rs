use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper_util::rt::TokioIo;

use super::upgrade::{self, UpgradeRequest};
use super::AppState;
use crate::error::Error;
use crate::splice;
use crate::transport::{self, Kind, SpliceHandler, Transport};

/// `/game/connect/:key` serves two purposes depending on whether the
/// request carries upgrade headers: a plain GET returns the session's
/// descriptor (so LAN-local clients can skip the proxy), an upgrade GET
/// grabs the parked master and splices this connection to it.
pub async fn connect(State(state): State<AppState>, Path(key): Path<String>, ConnectInfo(remote): ConnectInfo<SocketAddr>, mut req: Request) -> Result<Response, Error> {
    let remote_ip = remote.ip().to_string();
    let upgrade_request = upgrade::parse_upgrade(req.headers())?;

    let session = state.registry.find(&key).ok_or(Error::UnknownKey)?;

    let Some(upgrade_request) = upgrade_request else {
        return Ok(Json(session.descriptor(&remote_ip)).into_response());
    };

    let role = upgrade_request.role();
    let master = session.grab(role).ok_or(Error::Unclaimed)?;
    let response = upgrade::switching_protocols(&upgrade_request);
    let on_upgrade = hyper::upgrade::on(&mut req);
    let ping_registry = state.ping_registry.clone();

    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                tracing::debug!(error = %err, "client upgrade failed");
                master.close();
                return;
            }
        };

        let (client, client_read) = Transport::new(TokioIo::new(upgraded), role, Kind::Client);
        if matches!(upgrade_request, UpgradeRequest::WebSocket { .. }) {
            ping_registry.track(&client);
        }

        if let Err(err) = splice::bind(&client, &master).await {
            tracing::debug!(error = %err, "splice bind failed, closing both sides");
            client.close();
            master.close();
            return;
        }

        transport::spawn(client, client_read, Arc::new(SpliceHandler));
    });

    Ok(response)
}
