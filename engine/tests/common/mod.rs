//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cardhost_config::{DEFAULT_REQUIRED_PERMISSION, HostConfig};
use cardhost_engine::loopback::{LoopbackDirectory, LoopbackProvider};
use cardhost_engine::{
    CardListener, HostController, HostError, ProviderInfo, ReceivedCard, ReceivedComponent,
};
use cardhost_types::{Card, Component, DisplayContext, ImageContext, ProviderId, Size};

pub const MEDIA: &str = "com.example.media";
pub const MEDIA_ENDPOINT: &str = "com.example.media.cards";
pub const WEATHER: &str = "com.example.weather";
pub const WEATHER_ENDPOINT: &str = "com.example.weather.cards";

/// What a listener observed, flattened for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Card {
        provider: ProviderId,
        card_id: String,
    },
    Component {
        provider: ProviderId,
        card_id: String,
        component_id: String,
    },
    Added {
        package: String,
        endpoint: Option<String>,
    },
    Removed {
        package: String,
        endpoint: Option<String>,
    },
    Error {
        provider: ProviderId,
        error: HostError,
    },
}

#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    /// Everything observed since the last call.
    pub fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }

    fn push(&self, seen: Seen) {
        self.seen.lock().unwrap().push(seen);
    }
}

impl CardListener for Recorder {
    fn on_card_received(&self, card: &ReceivedCard) {
        self.push(Seen::Card {
            provider: card.provider.clone(),
            card_id: card.card.id().to_string(),
        });
    }

    fn on_component_received(&self, component: &ReceivedComponent) {
        self.push(Seen::Component {
            provider: component.provider.clone(),
            card_id: component.card_id.clone(),
            component_id: component.component.id().to_string(),
        });
    }

    fn on_provider_added(&self, package: &str, endpoint: Option<&str>) {
        self.push(Seen::Added {
            package: package.to_string(),
            endpoint: endpoint.map(str::to_string),
        });
    }

    fn on_provider_removed(&self, package: &str, endpoint: Option<&str>) {
        self.push(Seen::Removed {
            package: package.to_string(),
            endpoint: endpoint.map(str::to_string),
        });
    }

    fn on_communication_error(&self, provider: &ProviderId, error: &HostError) {
        self.push(Seen::Error {
            provider: provider.clone(),
            error: error.clone(),
        });
    }
}

pub struct Fixture {
    pub host: HostController,
    pub directory: Arc<LoopbackDirectory>,
    pub recorder: Arc<Recorder>,
}

/// Install `providers` as `(package, endpoint, provider)` and start a host
/// with one recording listener.
pub fn start(providers: &[(&str, &str, &Arc<LoopbackProvider>)]) -> Fixture {
    start_with(&HostConfig::default(), providers)
}

pub fn start_with(
    config: &HostConfig,
    providers: &[(&str, &str, &Arc<LoopbackProvider>)],
) -> Fixture {
    let directory = Arc::new(LoopbackDirectory::new());
    for (package, endpoint, provider) in providers {
        directory.install(provider_info(package, endpoint), Arc::clone(provider));
    }
    let host = HostController::start(config, Arc::clone(&directory) as _);
    let recorder = Arc::new(Recorder::default());
    host.register_listener(Arc::clone(&recorder) as _);
    Fixture {
        host,
        directory,
        recorder,
    }
}

pub fn provider_info(package: &str, endpoint: &str) -> ProviderInfo {
    ProviderInfo::new(package, endpoint, "CardProvider").with_permission(DEFAULT_REQUIRED_PERMISSION)
}

pub fn media_id() -> ProviderId {
    ProviderId::new(MEDIA, MEDIA_ENDPOINT)
}

pub fn weather_id() -> ProviderId {
    ProviderId::new(WEATHER, WEATHER_ENDPOINT)
}

/// Card "ID" with a title and a fast-updating progress bar "PB".
pub fn media_card(progress: &str) -> Card {
    Card::new("ID", "now playing")
        .with_component(Component::new("title", "Song"))
        .with_component(Component::fast_updating("PB", progress))
        .with_component(Component::new("play", "play"))
}

pub fn display_context() -> DisplayContext {
    DisplayContext::new(
        1,
        10_000,
        1_000,
        true,
        ImageContext {
            card_size: Size::new(400, 240),
            button_size: Size::new(48, 48),
            header_size: Size::new(64, 64),
            min_guaranteed_buttons: 3,
        },
    )
    .unwrap()
}

/// Let every ready task run. With a paused clock this advances time by 1ms
/// only after the runtime goes idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
