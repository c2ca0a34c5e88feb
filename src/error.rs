use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error taxonomy for the HTTP front. Frame-level and peer-I/O errors never
/// reach this type — those are handled inside the transport loop by closing
/// the connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed request body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("missing or invalid field `{0}`")]
    InvalidField(&'static str),

    #[error("unknown session key")]
    UnknownKey,

    #[error("session has no parked master connection")]
    Unclaimed,

    #[error("bad upgrade request: {0}")]
    BadUpgrade(&'static str),

    #[error("missing or incorrect master credentials")]
    BadMasterCredentials,

    #[error("key collision generating a new session, retry registration")]
    KeyCollision,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::MalformedBody(_) | Error::InvalidField(_) | Error::BadUpgrade(_) | Error::BadMasterCredentials => {
                StatusCode::BAD_REQUEST
            }
            Error::UnknownKey => StatusCode::NOT_FOUND,
            Error::Unclaimed => StatusCode::SERVICE_UNAVAILABLE,
            Error::KeyCollision => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
