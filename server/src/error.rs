use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reel_core::{Envelope, ErrorKind, MutationError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing X-User-Id header")]
    Unauthenticated,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mutation(#[from] MutationError),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn plain(message: String) -> Envelope<serde_json::Value> {
    Envelope { success: false, message: Some(message), data: None, error: None, kind: None }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, plain(self.to_string())),
            ApiError::Store(err) => (status_for(err.kind), err.envelope()),
            ApiError::Mutation(MutationError::InFlight { .. }) => (StatusCode::CONFLICT, plain(self.to_string())),
            ApiError::Mutation(MutationError::Load(err)) => (status_for(err.kind), err.envelope()),
            ApiError::Mutation(MutationError::NotTracked { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, plain(self.to_string()))
            }
            // the reverted view goes back so the client can redraw from it
            ApiError::Mutation(MutationError::Reverted { source, view }) => {
                let mut body = source.envelope();
                body.data = serde_json::to_value(view).ok();
                (status_for(source.kind), body)
            }
        };
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}
