//! Cards and their components.
//!
//! The host never interprets card contents. A [`Card`] carries an opaque
//! [`Payload`] for the renderer plus the list of [`Component`]s the host needs
//! for refresh bookkeeping: each component's id and whether it is
//! fast-updating.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Opaque encoded bytes. Only the channel and the renderer understand them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<u8>);

impl Payload {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

/// A named, independently updatable piece of a card.
///
/// `fast_updating` is fixed at construction. Fast-updating components (e.g. a
/// progress indicator) get their own readiness window in the refresh timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    id: String,
    #[serde(default)]
    fast_updating: bool,
    #[serde(default)]
    payload: Payload,
}

impl Component {
    /// A component refreshed only with its card.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            id: id.into(),
            fast_updating: false,
            payload: payload.into(),
        }
    }

    /// A component that may be re-fetched on its own at the fast cadence.
    #[must_use]
    pub fn fast_updating(id: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            id: id.into(),
            fast_updating: true,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn is_fast_updating(&self) -> bool {
        self.fast_updating
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// One unit of UI state published by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    id: String,
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    payload: Payload,
}

impl Card {
    #[must_use]
    pub fn new(id: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            id: id.into(),
            components: Vec::new(),
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    #[must_use]
    pub fn with_components(mut self, components: impl IntoIterator<Item = Component>) -> Self {
        self.components.extend(components);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[must_use]
    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Ids of the components tagged fast-updating, in card order.
    pub fn fast_updating_ids(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .filter(|c| c.fast_updating)
            .map(Component::id)
    }

    /// `false` if two components share an id. Such a card must not be cached.
    #[must_use]
    pub fn has_unique_component_ids(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.components.len());
        self.components.iter().all(|c| seen.insert(c.id.as_str()))
    }

    /// Replace the component with the same id. Returns `false` if the card has
    /// no such component, in which case the card is left untouched.
    pub fn apply_component(&mut self, component: Component) -> bool {
        match self.components.iter_mut().find(|c| c.id == component.id) {
            Some(slot) => {
                *slot = component;
                true
            }
            None => false,
        }
    }
}
