//! Error types for the bridge

use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Internal error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Bad request: {message}"))]
    BadRequest {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Unauthenticated: {message}"))]
    Unauthenticated {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Database error: {message}"))]
    Database {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Relay pool error: {message}"))]
    RelayPool {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Webhook delivery failed: {message}"))]
    WebhookDelivery {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("Subscription manager is not running"))]
    NotRunning { backtrace: Backtrace },
}

impl Error {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Create an unauthenticated error
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a relay pool error
    pub fn relay_pool(message: impl Into<String>) -> Self {
        Self::RelayPool {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a webhook delivery error
    pub fn webhook_delivery(message: impl Into<String>) -> Self {
        Self::WebhookDelivery {
            message: message.into(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a not-running error
    pub fn not_running() -> Self {
        Self::NotRunning {
            backtrace: Backtrace::capture(),
        }
    }
}

// Conversion to anyhow is done by anyhow's blanket implementation
// since Error implements std::error::Error through snafu

pub type Result<T> = std::result::Result<T, Error>;
