//! Names of the remote operations a provider answers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One method of the provider RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Every card the provider supports, rendered for a display context.
    ListAll,
    /// A card was placed on screen; requires a display context.
    CardAdded,
    /// A periodic refresh of an active card.
    CardUpdate,
    /// A single component of an active card.
    ComponentUpdate,
    /// A card left the screen.
    CardRemoved,
    /// The user interacted with a component.
    Interaction,
    /// The display context of an active card changed.
    ContextUpdate,
    /// The host is disconnecting.
    Closing,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListAll => "list-all",
            Self::CardAdded => "card-added",
            Self::CardUpdate => "card-update",
            Self::ComponentUpdate => "component-update",
            Self::CardRemoved => "card-removed",
            Self::Interaction => "interaction",
            Self::ContextUpdate => "context-update",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single card is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchReason {
    /// The card was just added to the screen. A display context is mandatory.
    Added,
    /// The card's full-refresh period elapsed.
    UpdateDue,
}

impl FetchReason {
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::Added => Method::CardAdded,
            Self::UpdateDue => Method::CardUpdate,
        }
    }

    #[must_use]
    pub fn requires_context(self) -> bool {
        matches!(self, Self::Added)
    }
}

/// Kind of user interaction reported to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionKind {
    Click,
    Custom(String),
}

impl InteractionKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Click => "click",
            Self::Custom(kind) => kind,
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
