use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Could not parse date/time input: {0}")]
    #[diagnostic(code(agendabot::invalid_datetime))]
    InvalidDateTime(String),

    #[error("Event start time is not in the future")]
    #[diagnostic(code(agendabot::date_in_past))]
    DateInPast,

    #[error("Event not found, or you are not its owner")]
    #[diagnostic(code(agendabot::not_found_or_not_owner))]
    NotFoundOrNotOwner,

    #[error("Persistence error: {0}")]
    #[diagnostic(code(agendabot::persistence))]
    Persistence(String),

    #[error("Notification delivery error: {0}")]
    #[diagnostic(code(agendabot::delivery))]
    Delivery(String),

    #[error("Draft session error: {0}")]
    #[diagnostic(code(agendabot::session))]
    Session(String),

    #[error("Component error: {0}")]
    #[diagnostic(code(agendabot::component))]
    Component(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(agendabot::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(agendabot::config))]
    Config(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(agendabot::serialization))]
    Serialization(String),

    #[error(transparent)]
    #[diagnostic(code(agendabot::io))]
    Io(#[from] std::io::Error),
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type BotResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create persistence errors
pub fn persistence_error(message: &str) -> Error {
    Error::Persistence(message.to_string())
}

/// Helper to create delivery errors
pub fn delivery_error(message: &str) -> Error {
    Error::Delivery(message.to_string())
}

/// Helper to create draft session errors
pub fn session_error(message: &str) -> Error {
    Error::Session(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}
