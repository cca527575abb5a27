pub mod calendar;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use calmerge_core::CalMergeError;

use crate::state::AppState;

/// All routes served by calmerge.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(calendar::router())
        .with_state(state)
}

/// Aggregation failures surface as a bare 500; details only go to the log.
pub struct AppError(CalMergeError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "failed to build calendar");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

impl From<CalMergeError> for AppError {
    fn from(err: CalMergeError) -> Self {
        Self(err)
    }
}
