//! Outbound messaging port: replies, pushes and profile lookups.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::UserProfile;

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("profile not found")]
    NotFound,
    #[error("messaging platform rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("messaging transport error: {0}")]
    Transport(String),
}

impl MessengerError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Answer an inbound event through its single-use reply token.
    async fn reply(&self, reply_token: &str, messages: &[String]) -> Result<(), MessengerError>;

    /// Send messages to a user, group or room without a reply token.
    async fn push(&self, to: &str, messages: &[String]) -> Result<(), MessengerError>;

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, MessengerError>;
}
