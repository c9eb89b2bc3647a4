//! Listener registration and event delivery.
//!
//! Host operations never call listeners directly. They queue a [`HostEvent`]
//! and a single dispatcher task delivers events to every registered listener
//! in the order they were queued.

use std::sync::{Arc, Mutex};

use cardhost_types::{Card, Component, ProviderId};
use tokio::sync::mpsc;

use crate::error::HostError;
use crate::lock;

/// A card that arrived from a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCard {
    pub provider: ProviderId,
    pub card: Card,
}

/// A component pushed for an active card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedComponent {
    pub provider: ProviderId,
    pub card_id: String,
    pub component: Component,
}

/// Receives host events. Every method defaults to doing nothing.
///
/// Calls come from the dispatcher task, one at a time. A listener must not
/// block for long: it delays every later event.
pub trait CardListener: Send + Sync {
    fn on_card_received(&self, _card: &ReceivedCard) {}

    fn on_component_received(&self, _component: &ReceivedComponent) {}

    /// `endpoint` is `None` when the whole package changed.
    fn on_provider_added(&self, _package: &str, _endpoint: Option<&str>) {}

    fn on_provider_removed(&self, _package: &str, _endpoint: Option<&str>) {}

    fn on_communication_error(&self, _provider: &ProviderId, _error: &HostError) {}
}

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    CardReceived(ReceivedCard),
    ComponentReceived(ReceivedComponent),
    ProviderAdded {
        package: String,
        endpoint: Option<String>,
    },
    ProviderRemoved {
        package: String,
        endpoint: Option<String>,
    },
    CommunicationError {
        provider: ProviderId,
        error: HostError,
    },
}

impl HostEvent {
    fn deliver(&self, listener: &dyn CardListener) {
        match self {
            Self::CardReceived(card) => listener.on_card_received(card),
            Self::ComponentReceived(component) => listener.on_component_received(component),
            Self::ProviderAdded { package, endpoint } => {
                listener.on_provider_added(package, endpoint.as_deref());
            }
            Self::ProviderRemoved { package, endpoint } => {
                listener.on_provider_removed(package, endpoint.as_deref());
            }
            Self::CommunicationError { provider, error } => {
                listener.on_communication_error(provider, error);
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<dyn CardListener>)>,
}

impl Listeners {
    pub(crate) fn register(&mut self, listener: Arc<dyn CardListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    /// `false` if `id` was not registered.
    pub(crate) fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn CardListener>> {
        self.entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Deliver queued events until every sender is gone.
///
/// Listeners are snapshotted per event, so a listener may unregister itself
/// (or others) from inside a callback.
pub(crate) async fn dispatch(
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    listeners: Arc<Mutex<Listeners>>,
) {
    while let Some(event) = events.recv().await {
        let targets = lock(&listeners).snapshot();
        for listener in targets {
            event.deliver(listener.as_ref());
        }
    }
    tracing::debug!("Host event dispatcher stopped");
}
