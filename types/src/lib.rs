//! Core domain types for the card host.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer: the engine, the config loader, and
//! channel implementations that move cards across a process boundary.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod card;
mod context;
mod provider;
mod refresh;
mod request;

pub use card::{Card, Component, Payload};
pub use context::{ContextError, DisplayContext, ImageContext, SUPPORTED_API_LEVEL, Size};
pub use provider::ProviderId;
pub use refresh::{
    DEFAULT_FAST_REFRESH_PERIOD_MS, DEFAULT_REFRESH_PERIOD_MS, MIN_FAST_REFRESH_PERIOD_MS,
    MIN_REFRESH_PERIOD_MS, RefreshPeriods,
};
pub use request::{FetchReason, InteractionKind, Method};
