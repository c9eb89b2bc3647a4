//! In-process providers.
//!
//! [`LoopbackProvider`] answers channel calls from a card list held in memory
//! and records everything the host sends it. Each connection is a separate
//! [`LoopbackChannel`], so closing an old connection never affects a newer
//! one. [`LoopbackDirectory`] installs providers under a package name.
//! Together they stand in for real provider processes in tests and in the
//! demo binary.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cardhost_config::DEFAULT_CAPABILITY;
use cardhost_types::{Card, Component, DisplayContext, FetchReason, Method};

use crate::channel::{Channel, ChannelFut, Message};
use crate::directory::{ComponentState, ProviderDirectory, ProviderInfo};
use crate::error::{ChannelError, ConnectError};
use crate::lock;

/// A provider living in the host's own process.
pub struct LoopbackProvider {
    state: Mutex<ProviderState>,
}

#[derive(Default)]
struct ProviderState {
    cards: Vec<Card>,
    dead: bool,
    connections: usize,
    open_channels: usize,
    closings: usize,
    calls: Vec<Method>,
    sent: Vec<Message>,
    failures: VecDeque<(Method, ChannelError)>,
    delays: VecDeque<(Method, Duration)>,
}

impl LoopbackProvider {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_cards(Vec::new())
    }

    #[must_use]
    pub fn with_cards(cards: Vec<Card>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProviderState {
                cards,
                ..ProviderState::default()
            }),
        })
    }

    /// Replace the whole card list, in `list-all` order. Duplicate ids are
    /// kept as given.
    pub fn set_cards(&self, cards: Vec<Card>) {
        lock(&self.state).cards = cards;
    }

    /// Insert `card`, replacing every card with the same id.
    pub fn put_card(&self, card: Card) {
        let mut state = lock(&self.state);
        state.cards.retain(|existing| existing.id() != card.id());
        state.cards.push(card);
    }

    /// Replace one component of a stored card. `false` if there is no such
    /// card or component.
    pub fn put_component(&self, card_id: &str, component: Component) -> bool {
        let mut state = lock(&self.state);
        state
            .cards
            .iter_mut()
            .rev()
            .find(|card| card.id() == card_id)
            .is_some_and(|card| card.apply_component(component))
    }

    /// The next `method` call fails with `error`.
    pub fn fail_next(&self, method: Method, error: ChannelError) {
        lock(&self.state).failures.push_back((method, error));
    }

    /// The next `method` call answers only after `delay`. The answer is taken
    /// when the call is made.
    pub fn delay_next(&self, method: Method, delay: Duration) {
        lock(&self.state).delays.push_back((method, delay));
    }

    /// Simulate the provider process dying. Every call fails from now on and
    /// new connections are refused.
    pub fn disconnect(&self) {
        lock(&self.state).dead = true;
    }

    /// Undo [`disconnect`](Self::disconnect).
    pub fn revive(&self) {
        lock(&self.state).dead = false;
    }

    /// Open a new connection. Fails while the provider is disconnected.
    pub fn connect(
        self: &Arc<Self>,
        endpoint: &str,
    ) -> Result<Arc<LoopbackChannel>, ConnectError> {
        let mut state = lock(&self.state);
        if state.dead {
            return Err(ConnectError::new(endpoint, "provider is not running"));
        }
        state.connections += 1;
        state.open_channels += 1;
        Ok(Arc::new(LoopbackChannel {
            provider: Arc::clone(self),
            open: AtomicBool::new(true),
        }))
    }

    /// Methods called so far, in call order. Includes `closing`.
    #[must_use]
    pub fn calls(&self) -> Vec<Method> {
        lock(&self.state).calls.clone()
    }

    #[must_use]
    pub fn call_count(&self, method: Method) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| **call == method)
            .count()
    }

    /// Notifications received through [`Channel::send`].
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        lock(&self.state).sent.clone()
    }

    /// How many times the host sent `closing`.
    #[must_use]
    pub fn closings(&self) -> usize {
        lock(&self.state).closings
    }

    /// How many channels the host opened to this provider.
    #[must_use]
    pub fn connections(&self) -> usize {
        lock(&self.state).connections
    }

    /// Channels opened and not yet closed.
    #[must_use]
    pub fn open_channels(&self) -> usize {
        lock(&self.state).open_channels
    }

    /// Log the call, then either fail it or compute the answer.
    fn answer<T>(
        &self,
        method: Method,
        open: bool,
        respond: impl FnOnce(&ProviderState) -> Result<T, ChannelError>,
    ) -> (Option<Duration>, Result<T, ChannelError>) {
        let mut state = lock(&self.state);
        state.calls.push(method);

        let delay = take_matching(&mut state.delays, method);
        if state.dead {
            return (
                delay,
                Err(ChannelError::disconnected(method, "provider process died")),
            );
        }
        if !open {
            return (
                delay,
                Err(ChannelError::disconnected(method, "channel is closed")),
            );
        }
        if let Some(error) = take_matching(&mut state.failures, method) {
            return (delay, Err(error));
        }
        (delay, respond(&state))
    }
}

fn take_matching<T>(queue: &mut VecDeque<(Method, T)>, method: Method) -> Option<T> {
    let index = queue.iter().position(|(queued, _)| *queued == method)?;
    queue.remove(index).map(|(_, value)| value)
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn find_card<'a>(cards: &'a [Card], card_id: &str) -> Option<&'a Card> {
    cards.iter().rev().find(|card| card.id() == card_id)
}

/// One connection to a [`LoopbackProvider`].
pub struct LoopbackChannel {
    provider: Arc<LoopbackProvider>,
    open: AtomicBool,
}

impl LoopbackChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Channel for LoopbackChannel {
    fn fetch_many<'a>(&'a self, _context: &'a DisplayContext) -> ChannelFut<'a, Vec<Card>> {
        Box::pin(async move {
            let (delay, result) = self
                .provider
                .answer(Method::ListAll, self.is_open(), |state| Ok(state.cards.clone()));
            pause(delay).await;
            result
        })
    }

    fn fetch_one<'a>(
        &'a self,
        reason: FetchReason,
        card_id: &'a str,
        context: Option<&'a DisplayContext>,
    ) -> ChannelFut<'a, Card> {
        Box::pin(async move {
            let method = reason.method();
            let (delay, result) = self.provider.answer(method, self.is_open(), |state| {
                if reason.requires_context() && context.is_none() {
                    return Err(ChannelError::protocol(
                        method,
                        Some(card_id),
                        "display context required",
                    ));
                }
                find_card(&state.cards, card_id)
                    .cloned()
                    .ok_or_else(|| ChannelError::protocol(method, Some(card_id), "unknown card"))
            });
            pause(delay).await;
            result
        })
    }

    fn fetch_component<'a>(
        &'a self,
        card_id: &'a str,
        component_id: &'a str,
    ) -> ChannelFut<'a, Component> {
        Box::pin(async move {
            let method = Method::ComponentUpdate;
            let (delay, result) = self.provider.answer(method, self.is_open(), |state| {
                find_card(&state.cards, card_id)
                    .and_then(|card| card.component(component_id))
                    .cloned()
                    .ok_or_else(|| {
                        ChannelError::protocol(method, Some(card_id), "unknown component")
                    })
            });
            pause(delay).await;
            result
        })
    }

    fn send(&self, message: Message) -> ChannelFut<'_, ()> {
        Box::pin(async move {
            let (delay, result) = self
                .provider
                .answer(message.method(), self.is_open(), |_| Ok(()));
            pause(delay).await;
            result?;
            lock(&self.provider.state).sent.push(message);
            Ok(())
        })
    }

    fn close(&self) -> ChannelFut<'_, ()> {
        Box::pin(async move {
            if !self.open.swap(false, Ordering::SeqCst) {
                return Ok(());
            }
            let mut state = lock(&self.provider.state);
            state.open_channels -= 1;
            if !state.dead {
                state.calls.push(Method::Closing);
                state.closings += 1;
            }
            Ok(())
        })
    }
}

/// A directory of [`LoopbackProvider`]s.
#[derive(Default)]
pub struct LoopbackDirectory {
    state: Mutex<DirectoryState>,
}

#[derive(Default)]
struct DirectoryState {
    entries: Vec<DirectoryEntry>,
    disabled_packages: HashSet<String>,
    component_states: HashMap<(String, String), ComponentState>,
}

struct DirectoryEntry {
    info: ProviderInfo,
    capability: String,
    provider: Arc<LoopbackProvider>,
}

impl DirectoryState {
    fn component_state(&self, package: &str, name: &str) -> ComponentState {
        self.component_states
            .get(&(package.to_string(), name.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn is_enabled(&self, info: &ProviderInfo) -> bool {
        !self.disabled_packages.contains(&info.package)
            && self
                .component_state(&info.package, &info.name)
                .resolve(info.enabled)
    }
}

impl LoopbackDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `provider` advertising the default card capability.
    pub fn install(&self, info: ProviderInfo, provider: Arc<LoopbackProvider>) {
        self.install_with_capability(info, DEFAULT_CAPABILITY, provider);
    }

    pub fn install_with_capability(
        &self,
        info: ProviderInfo,
        capability: &str,
        provider: Arc<LoopbackProvider>,
    ) {
        let mut state = lock(&self.state);
        state.entries.retain(|entry| entry.info.endpoint != info.endpoint);
        state.entries.push(DirectoryEntry {
            info,
            capability: capability.to_string(),
            provider,
        });
    }

    /// Remove every endpoint of `package`.
    pub fn uninstall(&self, package: &str) {
        lock(&self.state)
            .entries
            .retain(|entry| entry.info.package != package);
    }

    pub fn set_package_enabled(&self, package: &str, enabled: bool) {
        let mut state = lock(&self.state);
        if enabled {
            state.disabled_packages.remove(package);
        } else {
            state.disabled_packages.insert(package.to_string());
        }
    }

    pub fn set_component_state(&self, package: &str, name: &str, component: ComponentState) {
        lock(&self.state)
            .component_states
            .insert((package.to_string(), name.to_string()), component);
    }

    /// The provider installed at `endpoint`.
    #[must_use]
    pub fn provider(&self, endpoint: &str) -> Option<Arc<LoopbackProvider>> {
        lock(&self.state)
            .entries
            .iter()
            .find(|entry| entry.info.endpoint == endpoint)
            .map(|entry| Arc::clone(&entry.provider))
    }
}

impl ProviderDirectory for LoopbackDirectory {
    fn providers(&self, capability: &str) -> Vec<ProviderInfo> {
        let state = lock(&self.state);
        state
            .entries
            .iter()
            .filter(|entry| entry.capability == capability && state.is_enabled(&entry.info))
            .map(|entry| entry.info.clone())
            .collect()
    }

    fn package_providers(&self, package: &str) -> Vec<ProviderInfo> {
        lock(&self.state)
            .entries
            .iter()
            .filter(|entry| entry.info.package == package)
            .map(|entry| entry.info.clone())
            .collect()
    }

    fn is_package_enabled(&self, package: &str) -> bool {
        !lock(&self.state).disabled_packages.contains(package)
    }

    fn component_state(&self, package: &str, name: &str) -> ComponentState {
        lock(&self.state).component_state(package, name)
    }

    fn open_channel(&self, provider: &ProviderInfo) -> Result<Arc<dyn Channel>, ConnectError> {
        let Some(loopback) = self.provider(&provider.endpoint) else {
            return Err(ConnectError::new(&provider.endpoint, "not installed"));
        };
        let channel = loopback.connect(&provider.endpoint)?;
        Ok(channel)
    }
}
