//! Failures surfaced by channels and by the host.

use cardhost_types::Method;
use thiserror::Error;

/// A remote call that did not produce a usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The provider is gone. The host evicts it.
    #[error("provider disconnected during {method}: {message}")]
    Disconnected { method: Method, message: String },
    /// The provider answered with something the host cannot use.
    #[error("{method} failed{}: {message}", card_suffix(id.as_deref()))]
    Protocol {
        method: Method,
        id: Option<String>,
        message: String,
    },
}

impl ChannelError {
    pub fn disconnected(method: Method, message: impl Into<String>) -> Self {
        Self::Disconnected {
            method,
            message: message.into(),
        }
    }

    pub fn protocol(method: Method, id: Option<&str>, message: impl Into<String>) -> Self {
        Self::Protocol {
            method,
            id: id.map(str::to_string),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::Disconnected { method, .. } | Self::Protocol { method, .. } => *method,
        }
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

fn card_suffix(id: Option<&str>) -> String {
    id.map(|id| format!(" (ID: {id})")).unwrap_or_default()
}

/// Opening a channel to a provider failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to connect to {endpoint}: {message}")]
pub struct ConnectError {
    pub endpoint: String,
    pub message: String,
}

impl ConnectError {
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// What listeners see through `on_communication_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// A fetched card had two components with the same id and was dropped.
    #[error("card {card_id} has duplicate component ids")]
    Validation { card_id: String },
    /// The request was refused locally; nothing was sent.
    #[error("{method} for card {card_id} not sent: {message}")]
    Precondition {
        method: Method,
        card_id: String,
        message: String,
    },
}

impl HostError {
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Channel(err) if err.is_disconnected())
    }

    /// The request kind that failed.
    #[must_use]
    pub fn method(&self) -> Option<Method> {
        match self {
            Self::Channel(err) => Some(err.method()),
            Self::Precondition { method, .. } => Some(*method),
            Self::Validation { .. } => None,
        }
    }
}
