//! The connection to one provider.
//!
//! A [`Channel`] owns the transport; the host only sees typed requests and
//! typed replies. Every call is asynchronous and may fail with a
//! [`ChannelError`]. Implementations must be shareable across tasks: the host
//! keeps one `Arc<dyn Channel>` per connected provider and issues calls from
//! its worker tasks.

use std::future::Future;
use std::pin::Pin;

use cardhost_types::{Card, Component, DisplayContext, FetchReason, InteractionKind, Method};

use crate::error::ChannelError;

/// Boxed future returned by channel calls.
pub type ChannelFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChannelError>> + Send + 'a>>;

/// One-way notifications sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    CardRemoved {
        card_id: String,
    },
    Interaction {
        card_id: String,
        component_id: String,
        kind: InteractionKind,
    },
    ContextUpdate {
        card_id: String,
        context: DisplayContext,
    },
}

impl Message {
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::CardRemoved { .. } => Method::CardRemoved,
            Self::Interaction { .. } => Method::Interaction,
            Self::ContextUpdate { .. } => Method::ContextUpdate,
        }
    }

    #[must_use]
    pub fn card_id(&self) -> &str {
        match self {
            Self::CardRemoved { card_id }
            | Self::Interaction { card_id, .. }
            | Self::ContextUpdate { card_id, .. } => card_id,
        }
    }
}

pub trait Channel: Send + Sync {
    /// `list-all`: every card the provider supports.
    fn fetch_many<'a>(&'a self, context: &'a DisplayContext) -> ChannelFut<'a, Vec<Card>>;

    /// `card-added` or `card-update`, depending on `reason`.
    fn fetch_one<'a>(
        &'a self,
        reason: FetchReason,
        card_id: &'a str,
        context: Option<&'a DisplayContext>,
    ) -> ChannelFut<'a, Card>;

    /// `component-update`: one component of an active card.
    fn fetch_component<'a>(
        &'a self,
        card_id: &'a str,
        component_id: &'a str,
    ) -> ChannelFut<'a, Component>;

    fn send(&self, message: Message) -> ChannelFut<'_, ()>;

    /// Sends `closing` if the provider is still reachable, then releases the
    /// transport. Further calls fail with [`ChannelError::Disconnected`].
    fn close(&self) -> ChannelFut<'_, ()>;
}
