//! HostController - the public face of the engine.
//!
//! The controller owns the [`BrokerRegistry`] and the listener set. Public
//! operations are synchronous: they take the registry lock for the lookup,
//! spawn the remote call on the runtime, and return. Completions take the
//! lock again to update the cache and queue a [`HostEvent`] for the
//! dispatcher.
//!
//! ```text
//! caller ──lookup──> registry ──spawn──> Channel call ──completion──> registry
//!                                                           │
//! RefreshTimer ──RefreshDue──> pump ──> fetch_one           └──> HostEvent ──> listeners
//! ```
//!
//! A `Disconnected` failure from any call evicts the provider: its timers are
//! destroyed, its channel closed, and listeners see the provider removed
//! before they see the error.
//!
//! Every completion carries the channel its call went out on. Results and
//! failures from a channel that has since been replaced (a reconnect, or a
//! package removed and installed again) never touch the new connection.

use std::sync::{Arc, Mutex, Weak};

use cardhost_config::HostConfig;
use cardhost_types::{Card, Component, DisplayContext, FetchReason, InteractionKind, ProviderId};
use tokio::sync::{Semaphore, SemaphorePermit, mpsc};

use crate::channel::{Channel, Message};
use crate::directory::{DirectoryEvent, ProviderDirectory};
use crate::error::HostError;
use crate::listener::{
    self, CardListener, HostEvent, ListenerId, Listeners, ReceivedCard, ReceivedComponent,
};
use crate::lock;
use crate::notice::ComponentNotice;
use crate::registry::{BrokerRegistry, Evicted};
use crate::timer::RefreshDue;

pub struct HostController {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Mutex<BrokerRegistry>,
    listeners: Arc<Mutex<Listeners>>,
    events: mpsc::UnboundedSender<HostEvent>,
    workers: Semaphore,
}

impl HostController {
    /// Connect every acceptable provider and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &HostConfig, directory: Arc<dyn ProviderDirectory>) -> Self {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        let mut registry = BrokerRegistry::new(
            directory,
            config.providers.clone(),
            config.refresh.periods(),
            due_tx,
        );
        let connected = registry.connect_all();
        tracing::info!("Card host started with {connected} provider(s)");

        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let inner = Arc::new(Inner {
            registry: Mutex::new(registry),
            listeners: Arc::clone(&listeners),
            events,
            workers: Semaphore::new(config.workers.max_in_flight()),
        });

        tokio::spawn(listener::dispatch(event_rx, listeners));
        tokio::spawn(refresh_pump(due_rx, Arc::downgrade(&inner)));

        Self { inner }
    }

    pub fn register_listener(&self, listener: Arc<dyn CardListener>) -> ListenerId {
        lock(&self.inner.listeners).register(listener)
    }

    /// `false` if `id` was not registered.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        lock(&self.inner.listeners).unregister(id)
    }

    /// Ask every connected provider for all of its cards.
    pub fn fetch_all(&self, context: &DisplayContext) {
        self.inner.fetch_all(context);
    }

    /// Fetch one card. `Added` requires a display context.
    pub fn fetch_one(
        &self,
        context: Option<&DisplayContext>,
        provider: &ProviderId,
        card_id: &str,
        reason: FetchReason,
    ) {
        self.inner.fetch_one(context, provider, card_id, reason);
    }

    /// The card left the screen. Local state is dropped now; the provider is
    /// told in the background.
    pub fn notify_removed(&self, provider: &ProviderId, card_id: &str) {
        self.inner.notify_removed(provider, card_id);
    }

    pub fn notify_interaction(
        &self,
        provider: &ProviderId,
        card_id: &str,
        component_id: &str,
        kind: InteractionKind,
    ) {
        let message = Message::Interaction {
            card_id: card_id.to_string(),
            component_id: component_id.to_string(),
            kind,
        };
        self.inner.send_and_reset(provider, message);
    }

    pub fn send_context_update(
        &self,
        context: &DisplayContext,
        provider: &ProviderId,
        card_id: &str,
    ) {
        let message = Message::ContextUpdate {
            card_id: card_id.to_string(),
            context: context.clone(),
        };
        self.inner.send_and_reset(provider, message);
    }

    /// Fetch a fast-updating component if its readiness window has elapsed.
    pub fn request_component(&self, endpoint: &str, card_id: &str, component_id: &str) {
        self.inner.request_component(endpoint, card_id, component_id);
    }

    /// A provider touched `path` under `endpoint`.
    pub fn handle_change_notice(&self, endpoint: &str, path: &str) {
        match ComponentNotice::parse(path) {
            Some(notice) => {
                self.inner
                    .request_component(endpoint, notice.card_id, notice.component_id);
            }
            None => {
                tracing::warn!("Ignoring malformed change notice '{path}' from {endpoint}");
            }
        }
    }

    /// Connect providers installed since the last discovery.
    pub fn refresh_providers(&self) -> Vec<ProviderId> {
        self.inner.refresh_providers()
    }

    pub fn handle_directory_event(&self, event: DirectoryEvent) {
        match event {
            DirectoryEvent::PackageAdded { package } => self.on_provider_added(&package, None),
            DirectoryEvent::PackageRemoved { package } => self.on_provider_removed(&package, None),
            DirectoryEvent::PackageChanged {
                package,
                components,
            } => self.on_package_changed(&package, &components),
        }
    }

    pub fn on_provider_added(&self, package: &str, endpoint: Option<&str>) {
        self.inner.refresh_providers();
        self.inner.emit(HostEvent::ProviderAdded {
            package: package.to_string(),
            endpoint: endpoint.map(str::to_string),
        });
    }

    pub fn on_provider_removed(&self, package: &str, endpoint: Option<&str>) {
        let evicted = lock(&self.inner.registry).evict_matching(package, endpoint);
        if evicted.is_empty() {
            tracing::debug!("No connected provider matches removed package '{package}'");
            return;
        }
        for provider in evicted {
            tracing::info!(
                "Disconnected card provider {} ({} active card(s))",
                provider.id,
                provider.active_cards.len()
            );
            close_channel(provider.id, provider.channel);
        }
        self.inner.emit(HostEvent::ProviderRemoved {
            package: package.to_string(),
            endpoint: endpoint.map(str::to_string),
        });
    }

    fn on_package_changed(&self, package: &str, components: &[String]) {
        let directory = Arc::clone(lock(&self.inner.registry).directory());
        for name in components {
            if name == package {
                if directory.is_package_enabled(package) {
                    self.on_provider_added(package, None);
                } else {
                    self.on_provider_removed(package, None);
                }
                continue;
            }

            let Some(info) = directory
                .package_providers(package)
                .into_iter()
                .find(|info| info.name == *name)
            else {
                tracing::debug!("Component '{name}' of '{package}' is not a card provider");
                continue;
            };
            let enabled = directory
                .component_state(package, name)
                .resolve(info.enabled);
            if enabled {
                self.on_provider_added(package, Some(&info.endpoint));
            } else {
                self.on_provider_removed(package, Some(&info.endpoint));
            }
        }
    }

    /// Drop every connection and connect again from scratch. Listeners stay
    /// registered.
    pub fn reconnect_all(&self) {
        let evicted = lock(&self.inner.registry).evict_all();
        for provider in evicted {
            retire(provider);
        }
        let connected = lock(&self.inner.registry).connect_all();
        tracing::info!("Reconnected {connected} card provider(s)");
    }

    /// Remove every listener, tell every provider its cards are gone, and
    /// close every channel.
    pub fn shutdown(&self) {
        lock(&self.inner.listeners).clear();
        let evicted = lock(&self.inner.registry).evict_all();
        tracing::info!("Shutting down card host ({} provider(s))", evicted.len());
        for provider in evicted {
            retire(provider);
        }
    }

    #[must_use]
    pub fn is_connected(&self, provider: &ProviderId) -> bool {
        lock(&self.inner.registry).get(provider).is_some()
    }

    /// Connected providers, sorted.
    #[must_use]
    pub fn connected(&self) -> Vec<ProviderId> {
        lock(&self.inner.registry).ids()
    }

    #[must_use]
    pub fn is_card_active(&self, provider: &ProviderId, card_id: &str) -> bool {
        lock(&self.inner.registry)
            .get(provider)
            .is_some_and(|connected| connected.cache().contains(card_id))
    }

    /// Active cards of `provider`, sorted. Empty if it is not connected.
    #[must_use]
    pub fn active_cards(&self, provider: &ProviderId) -> Vec<String> {
        lock(&self.inner.registry)
            .get(provider)
            .map(|connected| connected.cache().card_ids())
            .unwrap_or_default()
    }

    /// Last cached value of an active card.
    #[must_use]
    pub fn active_card(&self, provider: &ProviderId, card_id: &str) -> Option<Card> {
        lock(&self.inner.registry)
            .get(provider)
            .and_then(|connected| connected.cache().card(card_id).cloned())
    }

    #[must_use]
    pub fn is_component_ready(
        &self,
        provider: &ProviderId,
        card_id: &str,
        component_id: &str,
    ) -> bool {
        lock(&self.inner.registry)
            .get(provider)
            .and_then(|connected| connected.cache().timer(card_id))
            .is_some_and(|timer| timer.is_component_ready(component_id))
    }
}

impl Inner {
    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        self.workers.acquire().await.ok()
    }

    fn channel(&self, provider: &ProviderId) -> Option<Arc<dyn Channel>> {
        lock(&self.registry)
            .get(provider)
            .map(|connected| Arc::clone(connected.channel()))
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Dropping host event: dispatcher stopped");
        }
    }

    fn fetch_all(self: &Arc<Self>, context: &DisplayContext) {
        let targets: Vec<(ProviderId, Arc<dyn Channel>)> = lock(&self.registry)
            .iter()
            .map(|(id, connected)| (id.clone(), Arc::clone(connected.channel())))
            .collect();

        for (provider, channel) in targets {
            let inner = Arc::clone(self);
            let context = context.clone();
            tokio::spawn(async move {
                let result = {
                    let _permit = inner.permit().await;
                    channel.fetch_many(&context).await
                };
                match result {
                    Ok(cards) => inner.on_cards(&provider, &channel, cards),
                    Err(e) => inner.report(&provider, Some(&channel), e.into()),
                }
            });
        }
    }

    fn on_cards(&self, provider: &ProviderId, channel: &Arc<dyn Channel>, cards: Vec<Card>) {
        let mut registry = lock(&self.registry);
        let Some(connected) = registry.get_live_mut(provider, channel) else {
            tracing::debug!(
                "Dropping {} card(s) from stale connection to {provider}",
                cards.len()
            );
            return;
        };
        for card in cards {
            connected.cache_mut().upsert(card.clone());
            self.emit(HostEvent::CardReceived(ReceivedCard {
                provider: provider.clone(),
                card,
            }));
        }
    }

    fn fetch_one(
        self: &Arc<Self>,
        context: Option<&DisplayContext>,
        provider: &ProviderId,
        card_id: &str,
        reason: FetchReason,
    ) {
        if reason.requires_context() && context.is_none() {
            self.report(
                provider,
                None,
                HostError::Precondition {
                    method: reason.method(),
                    card_id: card_id.to_string(),
                    message: "display context required".to_string(),
                },
            );
            return;
        }
        let Some(channel) = self.channel(provider) else {
            tracing::debug!(
                "Skipping {} for '{card_id}': {provider} not connected",
                reason.method()
            );
            return;
        };

        let inner = Arc::clone(self);
        let provider = provider.clone();
        let card_id = card_id.to_string();
        let context = context.cloned();
        tokio::spawn(async move {
            let result = {
                let _permit = inner.permit().await;
                channel.fetch_one(reason, &card_id, context.as_ref()).await
            };
            match result {
                Ok(card) => inner.on_card(&provider, &channel, &card_id, reason, card),
                Err(e) => inner.report(&provider, Some(&channel), e.into()),
            }
        });
    }

    fn on_card(
        self: &Arc<Self>,
        provider: &ProviderId,
        channel: &Arc<dyn Channel>,
        card_id: &str,
        reason: FetchReason,
        card: Card,
    ) {
        if !card.has_unique_component_ids() {
            tracing::warn!("Dropping card '{card_id}' from {provider}: duplicate component ids");
            let live = lock(&self.registry).is_live(provider, channel);
            if live && reason == FetchReason::Added {
                self.notify_removed(provider, card_id);
            }
            self.report(
                provider,
                Some(channel),
                HostError::Validation {
                    card_id: card_id.to_string(),
                },
            );
            return;
        }

        let mut registry = lock(&self.registry);
        let Some(connected) = registry.get_live_mut(provider, channel) else {
            tracing::debug!("Dropping card '{card_id}' from stale connection to {provider}");
            return;
        };
        connected.cache_mut().upsert(card.clone());
        self.emit(HostEvent::CardReceived(ReceivedCard {
            provider: provider.clone(),
            card,
        }));
    }

    fn notify_removed(self: &Arc<Self>, provider: &ProviderId, card_id: &str) {
        let channel = {
            let mut registry = lock(&self.registry);
            let Some(connected) = registry.get_mut(provider) else {
                return;
            };
            connected.cache_mut().remove(card_id);
            Arc::clone(connected.channel())
        };
        let message = Message::CardRemoved {
            card_id: card_id.to_string(),
        };
        self.send(provider, channel, message, false);
    }

    fn send_and_reset(self: &Arc<Self>, provider: &ProviderId, message: Message) {
        let Some(channel) = self.channel(provider) else {
            tracing::debug!("Skipping {}: {provider} not connected", message.method());
            return;
        };
        self.send(provider, channel, message, true);
    }

    /// Send `message` in the background. With `reset`, a successful send
    /// restarts the card's refresh cadence.
    fn send(
        self: &Arc<Self>,
        provider: &ProviderId,
        channel: Arc<dyn Channel>,
        message: Message,
        reset: bool,
    ) {
        let inner = Arc::clone(self);
        let provider = provider.clone();
        tokio::spawn(async move {
            let card_id = message.card_id().to_string();
            let result = {
                let _permit = inner.permit().await;
                channel.send(message).await
            };
            match result {
                Ok(()) if reset => inner.reset_timer(&provider, &channel, &card_id),
                Ok(()) => {}
                Err(e) => inner.report(&provider, Some(&channel), e.into()),
            }
        });
    }

    fn reset_timer(&self, provider: &ProviderId, channel: &Arc<dyn Channel>, card_id: &str) {
        let registry = lock(&self.registry);
        if let Some(timer) = registry
            .get_live(provider, channel)
            .and_then(|connected| connected.cache().timer(card_id))
        {
            timer.reset();
        }
    }

    fn request_component(self: &Arc<Self>, endpoint: &str, card_id: &str, component_id: &str) {
        let (provider, channel) = {
            let registry = lock(&self.registry);
            let Some(provider) = registry.find_by_endpoint(endpoint) else {
                tracing::debug!("No connected provider at {endpoint}");
                return;
            };
            let Some(connected) = registry.get(&provider) else {
                return;
            };
            let Some(timer) = connected.cache().timer(card_id) else {
                tracing::debug!(
                    "Ignoring update of '{component_id}': card '{card_id}' is not active"
                );
                return;
            };
            if !timer.is_component_ready(component_id) {
                tracing::trace!("Component '{component_id}' of '{card_id}' is not ready");
                return;
            }
            (provider, Arc::clone(connected.channel()))
        };

        let inner = Arc::clone(self);
        let card_id = card_id.to_string();
        let component_id = component_id.to_string();
        tokio::spawn(async move {
            let result = {
                let _permit = inner.permit().await;
                channel.fetch_component(&card_id, &component_id).await
            };
            match result {
                Ok(component) => inner.on_component(&provider, &channel, &card_id, component),
                Err(e) => inner.report(&provider, Some(&channel), e.into()),
            }
        });
    }

    fn on_component(
        &self,
        provider: &ProviderId,
        channel: &Arc<dyn Channel>,
        card_id: &str,
        component: Component,
    ) {
        let mut registry = lock(&self.registry);
        let Some(connected) = registry.get_live_mut(provider, channel) else {
            return;
        };
        match connected
            .cache_mut()
            .push_component(card_id, component.clone())
        {
            Ok(()) => self.emit(HostEvent::ComponentReceived(ReceivedComponent {
                provider: provider.clone(),
                card_id: card_id.to_string(),
                component,
            })),
            Err(e) => {
                tracing::debug!("Dropping component '{}' from {provider}: {e}", component.id());
            }
        }
    }

    fn refresh_providers(&self) -> Vec<ProviderId> {
        let added = lock(&self.registry).refresh();
        if !added.is_empty() {
            tracing::info!("Connected {} new card provider(s)", added.len());
        }
        added
    }

    /// Log and surface a failure. A disconnect on the provider's current
    /// `channel` evicts it first.
    fn report(
        &self,
        provider: &ProviderId,
        channel: Option<&Arc<dyn Channel>>,
        error: HostError,
    ) {
        if error.is_disconnected() {
            tracing::warn!("Card provider {provider} disconnected: {error}");
            if let Some(channel) = channel {
                self.evict_dead(provider, channel);
            }
        } else {
            tracing::warn!("Card provider {provider} failed: {error}");
        }
        self.emit(HostEvent::CommunicationError {
            provider: provider.clone(),
            error,
        });
    }

    fn evict_dead(&self, provider: &ProviderId, channel: &Arc<dyn Channel>) {
        let Some(evicted) = lock(&self.registry).evict_if(provider, channel) else {
            tracing::debug!("{provider} already evicted or reconnected");
            return;
        };
        tracing::info!(
            "Evicted card provider {} ({} active card(s))",
            evicted.id,
            evicted.active_cards.len()
        );
        let package = evicted.id.package().to_string();
        close_channel(evicted.id, evicted.channel);
        self.emit(HostEvent::ProviderRemoved {
            package,
            endpoint: None,
        });
    }
}

/// Close `channel` in the background, ignoring failures.
fn close_channel(provider: ProviderId, channel: Arc<dyn Channel>) {
    tokio::spawn(async move {
        if let Err(e) = channel.close().await {
            tracing::debug!("Closing {provider} failed: {e}");
        }
    });
}

/// Tell an evicted provider its cards are gone, then close it.
fn retire(evicted: Evicted) {
    let Evicted {
        id,
        channel,
        active_cards,
    } = evicted;
    tokio::spawn(async move {
        for card_id in active_cards {
            if let Err(e) = channel.send(Message::CardRemoved { card_id }).await {
                tracing::debug!("Notifying {id} of card removal failed: {e}");
                break;
            }
        }
        if let Err(e) = channel.close().await {
            tracing::debug!("Closing {id} failed: {e}");
        }
    });
}

/// Turn due timers into `card-update` fetches until the host is dropped.
async fn refresh_pump(mut due: mpsc::UnboundedReceiver<RefreshDue>, host: Weak<Inner>) {
    while let Some(RefreshDue { provider, card_id }) = due.recv().await {
        let Some(inner) = host.upgrade() else {
            break;
        };
        inner.fetch_one(None, &provider, &card_id, FetchReason::UpdateDue);
    }
}
