//! Connected providers.
//!
//! The registry maps each [`ProviderId`] to its open channel and its active
//! card cache. A provider is live exactly while it is in the map; eviction
//! removes it and hands the channel back so the caller can close it outside
//! the lock.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use cardhost_config::ProvidersConfig;
use cardhost_types::{ProviderId, RefreshPeriods};
use tokio::sync::mpsc;

use crate::cache::ActiveCardCache;
use crate::channel::Channel;
use crate::directory::{ProviderDirectory, check_provider};
use crate::timer::RefreshDue;

/// A live provider.
pub struct ConnectedProvider {
    channel: Arc<dyn Channel>,
    cache: ActiveCardCache,
}

impl ConnectedProvider {
    #[must_use]
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    #[must_use]
    pub fn cache(&self) -> &ActiveCardCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ActiveCardCache {
        &mut self.cache
    }
}

/// What is left of a provider after eviction.
pub struct Evicted {
    pub id: ProviderId,
    pub channel: Arc<dyn Channel>,
    /// Cards that were active when the provider was evicted, sorted.
    pub active_cards: Vec<String>,
}

pub struct BrokerRegistry {
    directory: Arc<dyn ProviderDirectory>,
    config: ProvidersConfig,
    periods: RefreshPeriods,
    due_tx: mpsc::UnboundedSender<RefreshDue>,
    providers: BTreeMap<ProviderId, ConnectedProvider>,
}

impl BrokerRegistry {
    pub fn new(
        directory: Arc<dyn ProviderDirectory>,
        config: ProvidersConfig,
        periods: RefreshPeriods,
        due_tx: mpsc::UnboundedSender<RefreshDue>,
    ) -> Self {
        Self {
            directory,
            config,
            periods,
            due_tx,
            providers: BTreeMap::new(),
        }
    }

    /// Connect every acceptable provider the directory lists. Returns how many
    /// new connections were made.
    pub fn connect_all(&mut self) -> usize {
        self.discover(&HashSet::new()).len()
    }

    /// Connect providers from packages with no live connection yet.
    pub fn refresh(&mut self) -> Vec<ProviderId> {
        let connected: HashSet<String> = self
            .providers
            .keys()
            .map(|id| id.package().to_string())
            .collect();
        self.discover(&connected)
    }

    fn discover(&mut self, skip_packages: &HashSet<String>) -> Vec<ProviderId> {
        let mut added = Vec::new();
        for info in self.directory.providers(&self.config.capability) {
            let id = info.id();
            if skip_packages.contains(&info.package) || self.providers.contains_key(&id) {
                continue;
            }
            if let Err(reason) = check_provider(&info, &self.config.required_permission) {
                tracing::warn!("Ignoring card provider {id}: {reason}");
                continue;
            }
            match self.directory.open_channel(&info) {
                Ok(channel) => {
                    tracing::info!("Connected card provider {id}");
                    let cache =
                        ActiveCardCache::new(id.clone(), self.periods, self.due_tx.clone());
                    self.providers
                        .insert(id.clone(), ConnectedProvider { channel, cache });
                    added.push(id);
                }
                Err(e) => {
                    tracing::warn!("Failed to connect card provider {id}: {e}");
                }
            }
        }
        added
    }

    /// Remove one provider. Its cards are dropped and their timers destroyed.
    /// `None` if it was not connected.
    pub fn evict(&mut self, id: &ProviderId) -> Option<Evicted> {
        let mut provider = self.providers.remove(id)?;
        let active_cards = provider.cache.card_ids();
        provider.cache.clear_all();
        Some(Evicted {
            id: id.clone(),
            channel: provider.channel,
            active_cards,
        })
    }

    /// Evict `id` only while `channel` is still its connection. A failure on
    /// a channel that was already replaced leaves the new one alone.
    pub fn evict_if(&mut self, id: &ProviderId, channel: &Arc<dyn Channel>) -> Option<Evicted> {
        if !self.is_live(id, channel) {
            return None;
        }
        self.evict(id)
    }

    /// Evict every provider of `package`, or only the one at `endpoint`.
    pub fn evict_matching(&mut self, package: &str, endpoint: Option<&str>) -> Vec<Evicted> {
        let ids: Vec<ProviderId> = self
            .providers
            .keys()
            .filter(|id| id.contains_package(package))
            .filter(|id| endpoint.is_none_or(|endpoint| id.contains_endpoint(endpoint)))
            .cloned()
            .collect();
        ids.iter().filter_map(|id| self.evict(id)).collect()
    }

    pub fn evict_all(&mut self) -> Vec<Evicted> {
        let ids: Vec<ProviderId> = self.providers.keys().cloned().collect();
        ids.iter().filter_map(|id| self.evict(id)).collect()
    }

    #[must_use]
    pub fn find_by_endpoint(&self, endpoint: &str) -> Option<ProviderId> {
        self.providers
            .keys()
            .find(|id| id.contains_endpoint(endpoint))
            .cloned()
    }

    #[must_use]
    pub fn get(&self, id: &ProviderId) -> Option<&ConnectedProvider> {
        self.providers.get(id)
    }

    pub fn get_mut(&mut self, id: &ProviderId) -> Option<&mut ConnectedProvider> {
        self.providers.get_mut(id)
    }

    /// The provider at `id`, as long as `channel` is still its connection.
    #[must_use]
    pub fn get_live(
        &self,
        id: &ProviderId,
        channel: &Arc<dyn Channel>,
    ) -> Option<&ConnectedProvider> {
        self.providers
            .get(id)
            .filter(|connected| Arc::ptr_eq(&connected.channel, channel))
    }

    #[must_use]
    pub fn is_live(&self, id: &ProviderId, channel: &Arc<dyn Channel>) -> bool {
        self.get_live(id, channel).is_some()
    }

    /// Mutable [`get_live`](Self::get_live).
    pub fn get_live_mut(
        &mut self,
        id: &ProviderId,
        channel: &Arc<dyn Channel>,
    ) -> Option<&mut ConnectedProvider> {
        self.providers
            .get_mut(id)
            .filter(|connected| Arc::ptr_eq(&connected.channel, channel))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProviderId, &ConnectedProvider)> {
        self.providers.iter()
    }

    /// Connected provider ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().cloned().collect()
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn ProviderDirectory> {
        &self.directory
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
