use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    application::error::ErrorReport,
    infra::line::{self, InboundEvent, SIGNATURE_HEADER, WebhookError},
};

use super::HttpState;

/// `POST /callback`: authenticate the body, then run its events in order.
pub(super) async fn handle_callback(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let payload = match line::verify_and_parse(&state.channel_secret, &body, signature) {
        Ok(payload) => payload,
        Err(err) => return rejected(err),
    };

    debug!(
        destination = payload.destination.as_deref().unwrap_or_default(),
        events = payload.events.len(),
        "Webhook received"
    );
    for event in &payload.events {
        match event.inbound() {
            Some(InboundEvent::Text(message)) => state.dispatcher.handle(&message).await,
            Some(InboundEvent::Greeting(message)) => state.dispatcher.greet(&message).await,
            None => debug!(kind = %event.kind, "Webhook event ignored"),
        }
    }

    StatusCode::OK.into_response()
}

fn rejected(err: WebhookError) -> Response {
    if matches!(err, WebhookError::Signature) {
        warn!("Webhook rejected: bad signature");
    }
    let mut response = (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    ErrorReport::from_error("infra::http::callback", StatusCode::BAD_REQUEST, &err)
        .attach(&mut response);
    response
}
