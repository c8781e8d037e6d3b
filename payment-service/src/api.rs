use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use shared::PaymentRequest;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

use crate::error::PaymentError;
use crate::handlers::{PaymentHandler, ReconcileOutcome};
use crate::models::{PaymentIntentDetail, SubmittedPayment};
use crate::store::PaymentStore;

#[derive(Clone)]
pub struct AppState<S> {
    pub handler: PaymentHandler<S>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub message: String,
}

pub fn create_router<S: PaymentStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/payments", post(create_payment::<S>))
        .route("/payments/callback", post(payment_callback::<S>))
        .route("/payments/:id", get(get_payment::<S>))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_payment<S: PaymentStore>(
    State(state): State<AppState<S>>,
    request: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmittedPayment>), PaymentError> {
    let Json(request) = request.map_err(|e| PaymentError::Validation(e.body_text()))?;

    let submitted = state.handler.submit(request).await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

/// Gateway webhook. Anything other than 2xx makes the gateway redeliver, so
/// duplicates answer 200 as well.
pub async fn payment_callback<S: PaymentStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<CallbackResponse>, PaymentError> {
    let message = match state.handler.reconcile(&body).await? {
        ReconcileOutcome::Applied { intent_id, status } => {
            debug!(%intent_id, %status, "Callback applied");
            "Callback processed successfully"
        }
        ReconcileOutcome::DuplicateAccepted => "Callback already processed",
    };

    Ok(Json(CallbackResponse {
        message: message.to_string(),
    }))
}

pub async fn get_payment<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentIntentDetail>, PaymentError> {
    state.handler.payment(id).await.map(Json)
}

pub async fn health_check() -> &'static str {
    "OK"
}
