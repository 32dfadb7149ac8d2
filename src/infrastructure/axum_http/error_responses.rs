use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::usecases::subscription_manager::MeteringError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for MeteringError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            // Denials carry the full decision payload so the client can show
            // used/limit/remaining next to the upgrade prompt.
            MeteringError::BuildNotAllowed(decision) | MeteringError::BonusNotAllowed(decision) => {
                (status, Json(decision)).into_response()
            }
            MeteringError::Internal(err) => {
                // Don't leak internal error detail to client
                error!(error = ?err, "metering: internal error");
                (
                    status,
                    Json(ErrorResponse {
                        code: status.as_u16(),
                        message: "Internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
            other => (
                status,
                Json(ErrorResponse {
                    code: status.as_u16(),
                    message: other.to_string(),
                }),
            )
                .into_response(),
        }
    }
}
