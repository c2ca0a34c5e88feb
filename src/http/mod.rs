//! HTTP front: route wiring and `AppState`. Routes are thin — each handler's
//! job is to translate HTTP into a call on the registry or the upgrade
//! negotiator and back.

mod connect;
mod list;
mod master;
mod register;
mod static_files;
mod upgrade;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::ping::PingRegistry;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<Config>,
    pub ping_registry: Arc<PingRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(static_files::index))
        .route("/game/register", post(register::register).layer(DefaultBodyLimit::max(64 * 1024)))
        .route("/game/list/:game_name", get(list::list))
        .route("/game/connect/:key", get(connect::connect))
        .route("/game/master", get(master::master))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
