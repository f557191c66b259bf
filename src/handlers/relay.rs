use crate::{
    scheduler::RelayScheduler,
    types::{BatchSnapshot, DeadLetter, RelayError, SubmitRequest, SubmitResponse},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;

impl IntoResponse for SubmitResponse {
    fn into_response(self) -> Response {
        let status = if self.accepted {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        (status, Json(self)).into_response()
    }
}

pub async fn submit_handler(
    State(scheduler): State<Arc<RelayScheduler>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> SubmitResponse {
    match payload {
        Ok(Json(request)) => scheduler.submit(request.message, request.signature).await,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "unreadable submit body");
            SubmitResponse::rejected(&RelayError::Input)
        }
    }
}

pub async fn get_batch_handler(
    State(scheduler): State<Arc<RelayScheduler>>,
) -> Json<BatchSnapshot> {
    Json(scheduler.read_batch().await)
}

pub async fn dead_letters_handler(
    State(scheduler): State<Arc<RelayScheduler>>,
) -> Json<Vec<DeadLetter>> {
    Json(scheduler.dead_letters().await)
}
