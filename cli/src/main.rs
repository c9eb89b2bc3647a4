//! Card host CLI - runs the engine against in-memory providers.
//!
//! ```text
//! main() -> HostConfig::load() -> HostController::start(loopback directory)
//!             |
//!             v
//!        fetch_all -> progress ticker (change notices) -> ctrl-c -> shutdown
//! ```
//!
//! Logs go to stderr. `RUST_LOG` overrides the default `info` filter.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cardhost_config::{DEFAULT_REQUIRED_PERMISSION, HostConfig};
use cardhost_engine::loopback::{LoopbackDirectory, LoopbackProvider};
use cardhost_engine::{
    CardListener, HostController, HostError, ProviderInfo, ReceivedCard, ReceivedComponent,
};
use cardhost_types::{
    Card, Component, DisplayContext, ImageContext, ProviderId, RefreshPeriods,
    SUPPORTED_API_LEVEL, Size,
};

const MEDIA: &str = "com.example.media";
const MEDIA_ENDPOINT: &str = "com.example.media.cards";
const WEATHER: &str = "com.example.weather";
const WEATHER_ENDPOINT: &str = "com.example.weather.cards";
const NOW_PLAYING: &str = "now-playing";
const PROGRESS: &str = "progress";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

/// Logs everything the host reports.
struct LogListener;

impl CardListener for LogListener {
    fn on_card_received(&self, card: &ReceivedCard) {
        tracing::info!(
            "Card '{}' from {} ({} component(s))",
            card.card.id(),
            card.provider,
            card.card.components().len()
        );
    }

    fn on_component_received(&self, component: &ReceivedComponent) {
        tracing::info!(
            "Component '{}' of '{}' from {}: {}",
            component.component.id(),
            component.card_id,
            component.provider,
            String::from_utf8_lossy(component.component.payload().as_bytes())
        );
    }

    fn on_provider_added(&self, package: &str, endpoint: Option<&str>) {
        tracing::info!("Provider added: {package} {endpoint:?}");
    }

    fn on_provider_removed(&self, package: &str, endpoint: Option<&str>) {
        tracing::info!("Provider removed: {package} {endpoint:?}");
    }

    fn on_communication_error(&self, provider: &ProviderId, error: &HostError) {
        tracing::warn!("{provider}: {error}");
    }
}

fn provider_info(package: &str, endpoint: &str) -> ProviderInfo {
    ProviderInfo::new(package, endpoint, "CardProvider").with_permission(DEFAULT_REQUIRED_PERMISSION)
}

fn now_playing(progress: u32) -> Card {
    Card::new(NOW_PLAYING, "Now playing")
        .with_component(Component::new("title", "Clair de Lune"))
        .with_component(Component::fast_updating(PROGRESS, progress.to_string()))
        .with_component(Component::new("pause", "pause"))
}

fn display_context(periods: RefreshPeriods) -> Result<DisplayContext> {
    let millis = |period: Duration| u32::try_from(period.as_millis()).unwrap_or(u32::MAX);
    let context = DisplayContext::new(
        SUPPORTED_API_LEVEL,
        millis(periods.full()),
        millis(periods.fast()),
        true,
        ImageContext {
            card_size: Size::new(400, 240),
            button_size: Size::new(48, 48),
            header_size: Size::new(64, 64),
            min_guaranteed_buttons: 3,
        },
    )?;
    Ok(context)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = match HostConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Using default config: {e}");
            HostConfig::default()
        }
    };
    let periods = config.refresh.periods();
    let context = display_context(periods)?;

    let media = LoopbackProvider::with_cards(vec![now_playing(0)]);
    let weather = LoopbackProvider::with_cards(vec![Card::new("forecast", "Sunny, 21C")]);
    let directory = Arc::new(LoopbackDirectory::new());
    directory.install(provider_info(MEDIA, MEDIA_ENDPOINT), Arc::clone(&media));
    directory.install(provider_info(WEATHER, WEATHER_ENDPOINT), weather);

    let host = HostController::start(&config, directory);
    host.register_listener(Arc::new(LogListener));
    host.fetch_all(&context);

    let mut ticker = interval(periods.fast());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut progress = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                progress = (progress + 1) % 100;
                let component = Component::fast_updating(PROGRESS, progress.to_string());
                if !media.put_component(NOW_PLAYING, component) {
                    tracing::warn!("Demo card '{NOW_PLAYING}' has no '{PROGRESS}' component");
                }
                host.handle_change_notice(MEDIA_ENDPOINT, &format!("{NOW_PLAYING}/{PROGRESS}"));
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for ctrl-c: {e}");
                }
                break;
            }
        }
    }

    host.shutdown();
    // Let the removal notices and closes go out before the runtime stops.
    sleep(Duration::from_millis(100)).await;

    Ok(())
}
