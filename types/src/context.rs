//! Display context sent with card requests.
//!
//! The host tells providers how cards will be shown: refresh cadence, whether
//! the card is interactable, and the image budget for each slot.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The only display-context API level this host speaks.
pub const SUPPORTED_API_LEVEL: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("unsupported display context API level {0} (expected {SUPPORTED_API_LEVEL})")]
    UnsupportedApiLevel(u32),
}

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Maximum image sizes for each image-bearing slot of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContext {
    pub card_size: Size,
    pub button_size: Size,
    pub header_size: Size,
    /// Minimum number of buttons guaranteed to show in one row.
    pub min_guaranteed_buttons: u32,
}

/// How the host will display a provider's cards.
///
/// Fields are private; [`DisplayContext::new`] is the single construction path
/// and rejects unsupported API levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayContext {
    api_level: u32,
    refresh_period_ms: u32,
    fast_refresh_period_ms: u32,
    interactable: bool,
    image: ImageContext,
}

impl DisplayContext {
    pub fn new(
        api_level: u32,
        refresh_period_ms: u32,
        fast_refresh_period_ms: u32,
        interactable: bool,
        image: ImageContext,
    ) -> Result<Self, ContextError> {
        if api_level != SUPPORTED_API_LEVEL {
            return Err(ContextError::UnsupportedApiLevel(api_level));
        }
        Ok(Self {
            api_level,
            refresh_period_ms,
            fast_refresh_period_ms,
            interactable,
            image,
        })
    }

    #[must_use]
    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    /// Full refresh period the host will use, in milliseconds.
    #[must_use]
    pub fn refresh_period_ms(&self) -> u32 {
        self.refresh_period_ms
    }

    /// Readiness window for fast-updating components, in milliseconds.
    #[must_use]
    pub fn fast_refresh_period_ms(&self) -> u32 {
        self.fast_refresh_period_ms
    }

    #[must_use]
    pub fn is_interactable(&self) -> bool {
        self.interactable
    }

    #[must_use]
    pub fn image(&self) -> &ImageContext {
        &self.image
    }
}
