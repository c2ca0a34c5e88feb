use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::Json;

use super::AppState;
use crate::session::SessionDescriptor;

pub async fn list(State(state): State<AppState>, Path(game_name): Path<String>, ConnectInfo(remote): ConnectInfo<SocketAddr>) -> Json<Vec<SessionDescriptor>> {
    let remote_ip = remote.ip().to_string();
    let sessions = state
        .registry
        .list_public(&game_name)
        .into_iter()
        .map(|session| session.descriptor(&remote_ip))
        .collect();
    Json(sessions)
}
