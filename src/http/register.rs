use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::Error;
use crate::session::Registration;

/// Mirrors the registration payload byte-for-byte: any missing or
/// ill-typed field fails JSON decoding and becomes a 400 via
/// `Error::MalformedBody`, which already satisfies "missing field -> 400"
/// without a separate presence check.
#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    game_name: String,
    game_version: i64,
    secret_hash: String,
    public: bool,
    address: Vec<String>,
    port: u16,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    key: String,
    secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, Error> {
    let request: RegisterRequest = serde_json::from_slice(&body).map_err(Error::MalformedBody)?;
    if request.secret_hash.is_empty() {
        return Err(Error::InvalidField("secret_hash"));
    }

    let registration = Registration {
        name: request.name,
        game_name: request.game_name,
        game_version: request.game_version,
        public: request.public,
        advertised_addresses: request.address,
        port: request.port,
    };

    let (key, secret) = state.registry.register(registration, remote.ip().to_string())?;
    Ok(Json(RegisterResponse { key, secret }))
}
