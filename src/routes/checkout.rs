use axum::extract::State;
use axum::Json;
use tracing::info;

use crate::error::AppResult;
use crate::types::CheckoutResponse;
use crate::AppState;

/// Start a purchase
///
/// Creates a Stripe Checkout Session for the lifetime-access product.
#[utoipa::path(
    post,
    path = "/api/checkout",
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 500, description = "Stripe not configured or unavailable", body = crate::error::ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn create_checkout(State(app_state): State<AppState>) -> AppResult<Json<CheckoutResponse>> {
    let url = app_state
        .stripe
        .create_checkout_session(&app_state.config.public_base_url)
        .await?;
    info!("checkout session created");
    Ok(Json(CheckoutResponse { url }))
}
