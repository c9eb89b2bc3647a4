//! The cards one provider currently has on screen.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use cardhost_types::{Card, Component, ProviderId, RefreshPeriods};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::timer::{RefreshDue, RefreshTimer};

/// A component was pushed for a card that is not active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("card {card_id} is not active")]
pub struct UnknownCard {
    pub card_id: String,
}

/// An active card and the timer that refreshes it.
pub struct CachedCard {
    card: Card,
    timer: RefreshTimer,
}

impl CachedCard {
    #[must_use]
    pub fn card(&self) -> &Card {
        &self.card
    }

    #[must_use]
    pub fn timer(&self) -> &RefreshTimer {
        &self.timer
    }
}

/// Active cards of one provider, keyed by card id.
///
/// Every entry's timer is armed; removing an entry destroys its timer.
pub struct ActiveCardCache {
    provider: ProviderId,
    periods: RefreshPeriods,
    due_tx: mpsc::UnboundedSender<RefreshDue>,
    cards: HashMap<String, CachedCard>,
}

impl ActiveCardCache {
    pub(crate) fn new(
        provider: ProviderId,
        periods: RefreshPeriods,
        due_tx: mpsc::UnboundedSender<RefreshDue>,
    ) -> Self {
        Self {
            provider,
            periods,
            due_tx,
            cards: HashMap::new(),
        }
    }

    /// Insert or replace `card`. Its timer is (re)armed for the new
    /// component set.
    pub fn upsert(&mut self, card: Card) -> &CachedCard {
        match self.cards.entry(card.id().to_string()) {
            Entry::Occupied(entry) => {
                let cached = entry.into_mut();
                cached.timer.arm(&card);
                cached.card = card;
                cached
            }
            Entry::Vacant(entry) => {
                let due = RefreshDue {
                    provider: self.provider.clone(),
                    card_id: card.id().to_string(),
                };
                let timer = RefreshTimer::new(due, self.periods, self.due_tx.clone());
                timer.arm(&card);
                entry.insert(CachedCard { card, timer })
            }
        }
    }

    /// Drop the card and destroy its timer. `false` if it was not active.
    pub fn remove(&mut self, card_id: &str) -> bool {
        match self.cards.remove(card_id) {
            Some(cached) => {
                cached.timer.destroy();
                true
            }
            None => false,
        }
    }

    /// Replace one component of an active card and open a new readiness
    /// window for it.
    pub fn push_component(
        &mut self,
        card_id: &str,
        component: Component,
    ) -> Result<(), UnknownCard> {
        let Some(cached) = self.cards.get_mut(card_id) else {
            return Err(UnknownCard {
                card_id: card_id.to_string(),
            });
        };
        let component_id = component.id().to_string();
        if !cached.card.apply_component(component) {
            tracing::debug!(
                "Component '{component_id}' is not part of card '{card_id}' from {}",
                self.provider
            );
        }
        cached.timer.on_component_pushed(&component_id);
        Ok(())
    }

    /// Destroy every timer and forget every card.
    pub fn clear_all(&mut self) {
        for (_, cached) in self.cards.drain() {
            cached.timer.destroy();
        }
    }

    #[must_use]
    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.get(card_id).map(CachedCard::card)
    }

    #[must_use]
    pub fn timer(&self, card_id: &str) -> Option<&RefreshTimer> {
        self.cards.get(card_id).map(CachedCard::timer)
    }

    /// Active card ids, sorted.
    #[must_use]
    pub fn card_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cards.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn contains(&self, card_id: &str) -> bool {
        self.cards.contains_key(card_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
