use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{AppError, AppResult};
use crate::model::{normalize_email, CompletedCheckout};
use crate::store::CheckoutOutcome;
use crate::stripe::SIGNATURE_HEADER;
use crate::token::generate_access_token;
use crate::types::{
    stripe_event_type, CheckoutSessionObject, PaymentIntentObject, StripeEvent, WebhookAck,
};
use crate::AppState;

/// Receive Stripe events
///
/// The raw body is needed for signature verification, so it is taken as bytes and parsed
/// only after the signature checks out.
#[utoipa::path(
    post,
    path = "/api/webhook",
    request_body(content = String, description = "Raw Stripe event JSON", content_type = "application/json"),
    params(
        ("stripe-signature" = String, Header, description = "Stripe webhook signature")
    ),
    responses(
        (status = 200, description = "Event received", body = WebhookAck),
        (status = 400, description = "Bad signature or malformed event", body = crate::error::ErrorBody),
        (status = 500, description = "Event could not be applied, provider should retry", body = crate::error::ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!("webhook rejected: missing signature header");
        return AppError::Validation("Missing stripe-signature header".into()).into_response();
    };

    if let Err(e) = app_state.stripe.verify_webhook_signature(&body, signature) {
        warn!(reason = %e, "webhook signature verification failed");
        return AppError::from(e).into_response();
    }

    let event: StripeEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "failed to parse webhook event");
            return AppError::Validation("Invalid event payload".into()).into_response();
        }
    };

    let span = info_span!("webhook_event", event_id = %event.id, event_type = %event.event_type);
    match process_event(&app_state, &event).instrument(span.clone()).await {
        Ok(()) => Json(WebhookAck { received: true }).into_response(),
        Err(e) => {
            // Server errors are reported by `into_response`.
            let _entered = span.enter();
            if !e.status_code().is_server_error() {
                warn!(error = %e, "webhook event rejected");
            }
            e.into_response()
        }
    }
}

async fn process_event(app_state: &AppState, event: &StripeEvent) -> AppResult<()> {
    info!("processing webhook event");

    match event.event_type.as_str() {
        stripe_event_type::CHECKOUT_SESSION_COMPLETED => {
            let session: CheckoutSessionObject = serde_json::from_value(event.data.object.clone())
                .map_err(|e| AppError::Validation(format!("Invalid checkout session: {e}")))?;
            handle_checkout_completed(app_state, &session).await
        }
        stripe_event_type::PAYMENT_INTENT_SUCCEEDED => {
            if let Ok(intent) =
                serde_json::from_value::<PaymentIntentObject>(event.data.object.clone())
            {
                info!(payment_intent = %intent.id, "payment intent succeeded");
            }
            Ok(())
        }
        stripe_event_type::PAYMENT_INTENT_PAYMENT_FAILED => {
            if let Ok(intent) =
                serde_json::from_value::<PaymentIntentObject>(event.data.object.clone())
            {
                let reason = intent
                    .last_payment_error
                    .and_then(|e| e.message)
                    .unwrap_or_default();
                warn!(payment_intent = %intent.id, reason = %reason, "payment failed");
            }
            Ok(())
        }
        other => {
            debug!(event_type = %other, "unhandled event type");
            Ok(())
        }
    }
}

/// Turns a completed checkout into an entitlement and mails the access link.
///
/// Redelivered sessions are a no-op. The store mutation is atomic; email delivery after the
/// commit is best-effort and never fails the acknowledgment.
pub async fn handle_checkout_completed(
    app_state: &AppState,
    session: &CheckoutSessionObject,
) -> AppResult<()> {
    let email = session
        .buyer_email()
        .map(normalize_email)
        .ok_or_else(|| AppError::Validation("Checkout session has no customer email".into()))?;

    let checkout = CompletedCheckout {
        email,
        stripe_session_id: session.id.clone(),
        stripe_customer_id: session.customer.clone(),
    };

    let access_token = generate_access_token();
    let outcome = app_state.store.record_checkout(&checkout, &access_token)?;

    let purchase = match outcome {
        CheckoutOutcome::Duplicate(existing) => {
            info!(
                stripe_session_id = %checkout.stripe_session_id,
                purchase_id = %existing.id,
                "checkout session already processed, skipping"
            );
            return Ok(());
        }
        CheckoutOutcome::Created(purchase) => {
            info!(purchase_id = %purchase.id, "purchase created");
            purchase
        }
        CheckoutOutcome::Renewed(purchase) => {
            info!(purchase_id = %purchase.id, "purchase renewed, access token rotated");
            purchase
        }
    };

    if let Err(e) = app_state
        .notifier
        .send_access_link(&purchase.email, &purchase.access_token)
        .await
    {
        warn!(purchase_id = %purchase.id, error = %e, "access email not delivered");
        sentry::capture_error(&e);
    }

    Ok(())
}
