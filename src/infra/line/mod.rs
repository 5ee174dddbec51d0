//! LINE Messaging API adapter: outbound client and inbound webhook parsing.

mod client;
mod webhook;

pub use client::{DEFAULT_API_BASE_URL, LineMessenger};
pub use webhook::{
    EventMessage, EventSource, InboundEvent, SIGNATURE_HEADER, WebhookError, WebhookEvent,
    WebhookPayload, verify_and_parse, sign, verify_signature,
};
