//! Card host engine - provider registry, refresh timing and orchestration.
//!
//! The host keeps a live [`Channel`] to every acceptable card provider, caches
//! the cards currently on screen, refreshes them on a schedule, and fans
//! results out to registered [`CardListener`]s.
//!
//! # Layers
//!
//! ```text
//! HostController          public operations, background tasks
//!   └─ BrokerRegistry     ProviderId -> (Channel, ActiveCardCache)
//!        └─ ActiveCardCache   card id -> (Card, RefreshTimer)
//!             └─ RefreshTimer     full refresh cadence + fast component readiness
//! ```
//!
//! Provider discovery and transport are behind the [`ProviderDirectory`] and
//! [`Channel`] traits. [`loopback`] implements both in memory.

use std::sync::{Mutex, MutexGuard, PoisonError};

mod cache;
mod channel;
mod directory;
mod error;
mod host;
mod listener;
pub mod loopback;
mod notice;
mod registry;
mod schedule;
mod timer;

pub use cache::{ActiveCardCache, CachedCard, UnknownCard};
pub use channel::{Channel, ChannelFut, Message};
pub use directory::{
    ComponentState, DirectoryEvent, ProviderDirectory, ProviderInfo, Rejection, check_provider,
};
pub use error::{ChannelError, ConnectError, HostError};
pub use host::HostController;
pub use listener::{CardListener, HostEvent, ListenerId, ReceivedCard, ReceivedComponent};
pub use notice::ComponentNotice;
pub use registry::{BrokerRegistry, ConnectedProvider, Evicted};
pub use timer::{RefreshDue, RefreshTimer};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
