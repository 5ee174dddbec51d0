use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    application::messenger::{Messenger, MessengerError},
    domain::entities::UserProfile,
    infra::error::InfraError,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.line.me/";

/// A single message of a reply or push request. LINE accepts at most five.
#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    user_id: String,
    display_name: String,
    #[serde(default)]
    status_message: Option<String>,
}

const MAX_MESSAGES_PER_REQUEST: usize = 5;

#[derive(Clone, Debug)]
pub struct LineMessenger {
    client: Client,
    base: Url,
    token: String,
}

impl LineMessenger {
    pub fn new(base: Url, token: impl Into<String>) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| InfraError::messaging(err.to_string()))?;
        Ok(Self {
            client,
            base,
            token: token.into(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("tallybot/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, path: &str) -> Result<Url, MessengerError> {
        self.base.join(path).map_err(MessengerError::transport)
    }

    fn text_messages(messages: &[String]) -> Vec<TextMessage<'_>> {
        messages
            .iter()
            .take(MAX_MESSAGES_PER_REQUEST)
            .map(|text| TextMessage {
                kind: "text",
                text: text.as_str(),
            })
            .collect()
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), MessengerError> {
        let response = self
            .client
            .post(self.url(path)?)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(MessengerError::transport)?;

        Self::check(response).await.map(|_| ())
    }

    async fn check(response: Response) -> Result<Response, MessengerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(MessengerError::NotFound);
        }
        let message = response.text().await.unwrap_or_default();
        Err(MessengerError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Messenger for LineMessenger {
    async fn reply(&self, reply_token: &str, messages: &[String]) -> Result<(), MessengerError> {
        debug!(count = messages.len(), "Sending reply");
        let body = ReplyRequest {
            reply_token,
            messages: Self::text_messages(messages),
        };
        self.post("v2/bot/message/reply", &body).await
    }

    async fn push(&self, to: &str, messages: &[String]) -> Result<(), MessengerError> {
        debug!(to, count = messages.len(), "Sending push");
        let body = PushRequest {
            to,
            messages: Self::text_messages(messages),
        };
        self.post("v2/bot/message/push", &body).await
    }

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, MessengerError> {
        let url = self.url(&format!("v2/bot/profile/{user_id}"))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(MessengerError::transport)?;

        let profile: ProfileResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(MessengerError::transport)?;

        Ok(UserProfile {
            user_id: profile.user_id,
            display_name: profile.display_name,
            status_message: profile.status_message,
        })
    }
}
