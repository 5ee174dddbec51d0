//! Webhook request authentication and payload decoding.
//!
//! LINE signs every callback body with the channel secret and sends the
//! base64 HMAC-SHA256 digest in `x-line-signature`.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::application::dispatcher::InboundMessage;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature missing or invalid")]
    Signature,
    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventSource {
    User {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    Room {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId", default)]
        user_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl EventSource {
    /// Conversation id that scopes keywords and usage.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            EventSource::User { user_id } => Some(user_id),
            EventSource::Group { group_id, .. } => Some(group_id),
            EventSource::Room { room_id, .. } => Some(room_id),
            EventSource::Unknown => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            EventSource::User { user_id } => Some(user_id),
            EventSource::Group { user_id, .. } | EventSource::Room { user_id, .. } => {
                user_id.as_deref()
            }
            EventSource::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// What the bot does with one webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text(InboundMessage),
    Greeting(InboundMessage),
}

impl WebhookEvent {
    /// Classify the event. Anything other than a text message or a
    /// join/follow with a known source yields `None`.
    pub fn inbound(&self) -> Option<InboundEvent> {
        let source = self.source.as_ref()?;
        let base = InboundMessage {
            source: source.source_id()?.to_string(),
            user_id: source.user_id().map(str::to_string),
            reply_token: self.reply_token.clone(),
            text: String::new(),
        };

        match self.kind.as_str() {
            "message" => {
                let message = self.message.as_ref().filter(|m| m.kind == "text")?;
                let text = message.text.clone()?;
                Some(InboundEvent::Text(InboundMessage { text, ..base }))
            }
            "join" | "follow" => Some(InboundEvent::Greeting(base)),
            _ => None,
        }
    }
}

/// Base64 HMAC-SHA256 of `body` keyed with the channel secret.
pub fn sign(channel_secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    digest(channel_secret, body).map(|bytes| STANDARD.encode(bytes))
}

fn digest(channel_secret: &str, body: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(channel_secret.as_bytes())
        .map_err(|_| WebhookError::Signature)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn verify_signature(
    channel_secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    let provided = signature
        .and_then(|value| STANDARD.decode(value.trim()).ok())
        .ok_or(WebhookError::Signature)?;
    let expected = digest(channel_secret, body)?;

    if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        Ok(())
    } else {
        Err(WebhookError::Signature)
    }
}

/// Authenticate and decode a callback body.
pub fn verify_and_parse(
    channel_secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<WebhookPayload, WebhookError> {
    verify_signature(channel_secret, body, signature)?;
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "channel-secret";

    #[test]
    fn signature_round_trips_and_rejects_tampering() {
        let body = br#"{"events":[]}"#;
        let signature = sign(SECRET, body).expect("hmac accepts any key");
        assert!(verify_signature(SECRET, body, Some(&signature)).is_ok());
        assert!(matches!(
            verify_signature(SECRET, br#"{"events":[1]}"#, Some(&signature)),
            Err(WebhookError::Signature)
        ));
        assert!(matches!(
            verify_signature("other", body, Some(&signature)),
            Err(WebhookError::Signature)
        ));
    }

    #[test]
    fn missing_or_undecodable_signature_is_rejected() {
        assert!(matches!(
            verify_signature(SECRET, b"{}", None),
            Err(WebhookError::Signature)
        ));
        assert!(matches!(
            verify_signature(SECRET, b"{}", Some("not base64!!")),
            Err(WebhookError::Signature)
        ));
    }

    #[test]
    fn source_resolution_prefers_group_then_room_then_user() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"events":[
                {"type":"message","replyToken":"r1",
                 "source":{"type":"group","groupId":"G1","userId":"U1"},
                 "message":{"type":"text","id":"1","text":"niki"}},
                {"type":"message","replyToken":"r2",
                 "source":{"type":"room","roomId":"R1","userId":"U2"},
                 "message":{"type":"text","id":"2","text":"help"}},
                {"type":"message","replyToken":"r3",
                 "source":{"type":"user","userId":"U3"},
                 "message":{"type":"text","id":"3","text":"list"}}
            ]}"#,
        )
        .expect("payload parses");

        let sources: Vec<_> = payload
            .events
            .iter()
            .filter_map(WebhookEvent::inbound)
            .map(|event| match event {
                InboundEvent::Text(message) => (message.source, message.user_id),
                InboundEvent::Greeting(_) => panic!("unexpected greeting"),
            })
            .collect();
        assert_eq!(
            sources,
            vec![
                ("G1".to_string(), Some("U1".to_string())),
                ("R1".to_string(), Some("U2".to_string())),
                ("U3".to_string(), Some("U3".to_string())),
            ]
        );
    }

    #[test]
    fn non_text_and_unknown_events_are_ignored() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"events":[
                {"type":"message","replyToken":"r1",
                 "source":{"type":"user","userId":"U1"},
                 "message":{"type":"sticker","id":"1","packageId":"1","stickerId":"2"}},
                {"type":"leave","source":{"type":"group","groupId":"G1"}},
                {"type":"unfollow","source":{"type":"user","userId":"U1"}},
                {"type":"message","source":{"type":"channel","channelId":"C"},
                 "message":{"type":"text","id":"2","text":"hi"}}
            ]}"#,
        )
        .expect("payload parses");
        assert!(payload.events.iter().all(|event| event.inbound().is_none()));
    }

    #[test]
    fn join_and_follow_become_greetings() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"events":[
                {"type":"join","replyToken":"r1","source":{"type":"group","groupId":"G1"}},
                {"type":"follow","replyToken":"r2","source":{"type":"user","userId":"U1"}}
            ]}"#,
        )
        .expect("payload parses");
        let greetings = payload
            .events
            .iter()
            .filter_map(WebhookEvent::inbound)
            .filter(|event| matches!(event, InboundEvent::Greeting(_)))
            .count();
        assert_eq!(greetings, 2);
    }

    #[test]
    fn verified_payload_keeps_destination() {
        let body = br#"{"destination":"Ubot","events":[]}"#;
        let signature = sign(SECRET, body).expect("hmac accepts any key");
        let payload = verify_and_parse(SECRET, body, Some(&signature)).expect("payload parses");
        assert_eq!(payload.destination.as_deref(), Some("Ubot"));
        assert!(payload.events.is_empty());
    }
}
