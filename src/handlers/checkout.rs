//! Buyer-facing checkout endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::checkout::{CartLineItem, PaymentStatus};
use crate::error::{Error, Result};
use crate::handlers::AppState;

/// `POST /api/checkout` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Buyer placing the order
    pub buyer_id: String,
    /// Cart lines in display order
    pub items: Vec<CartLineItem>,
}

/// `POST /api/checkout` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    /// Hosted payment page to redirect to
    pub url: String,
}

/// Start a checkout and return the provider redirect.
///
/// 404 for an unknown buyer, 422 for an unusable cart or body.
#[instrument(skip_all)]
pub async fn create_checkout_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>> {
    let Json(request) = body.map_err(|rejection| Error::validation(rejection.body_text()))?;
    let redirect = state
        .initiator
        .start_checkout(&request.buyer_id, &request.items)
        .await?;
    Ok(Json(CheckoutResponse { url: redirect.url }))
}

/// Payment status for client-side polling.
#[instrument(skip(state))]
pub async fn payment_status_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentStatus>> {
    Ok(Json(state.status.payment_status(&session_id).await?))
}
