use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{replies, repos::RepoError},
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failure of a single chat command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command")]
    Validation,
    #[error("keyword `{keyword}` not found")]
    NotFound { keyword: String },
    #[error("only the creator of `{keyword}` may remove it")]
    Authorization { keyword: String },
    #[error("keyword `{keyword}` already exists")]
    Duplicate { keyword: String },
    #[error(transparent)]
    Infrastructure(#[from] RepoError),
}

impl CommandError {
    /// Chat text for errors the sender should see. Validation and
    /// infrastructure failures stay silent.
    pub fn user_reply(&self) -> Option<String> {
        match self {
            CommandError::NotFound { keyword } => Some(replies::not_exists(keyword)),
            CommandError::Authorization { .. } => Some(replies::ONLY_CREATOR.to_string()),
            CommandError::Duplicate { keyword } => Some(replies::already_exists(keyword)),
            CommandError::Validation | CommandError::Infrastructure(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Infra(InfraError::Database { .. }) => "Service temporarily unavailable",
            AppError::Infra(InfraError::Messaging { .. }) => "Messaging platform unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}
