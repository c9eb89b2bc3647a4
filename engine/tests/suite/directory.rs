//! Package lifecycle: installs, removals and component state changes.

use std::sync::Arc;
use std::time::Duration;

use cardhost_engine::loopback::LoopbackProvider;
use cardhost_engine::{ComponentState, DirectoryEvent, ProviderInfo};
use cardhost_types::{FetchReason, Method};
use tokio::time::sleep;

use crate::common::{
    MEDIA, MEDIA_ENDPOINT, Seen, WEATHER, WEATHER_ENDPOINT, display_context, media_card, media_id,
    provider_info, settle, start, weather_id,
};

#[tokio::test(start_paused = true)]
async fn package_added_connects_new_provider() {
    let media = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &media)]);
    assert_eq!(fx.host.connected(), vec![media_id()]);

    let weather = LoopbackProvider::new();
    fx.directory
        .install(provider_info(WEATHER, WEATHER_ENDPOINT), Arc::clone(&weather));
    fx.host.handle_directory_event(DirectoryEvent::PackageAdded {
        package: WEATHER.to_string(),
    });
    settle().await;

    assert!(fx.host.is_connected(&weather_id()));
    assert_eq!(weather.connections(), 1);
    assert_eq!(media.connections(), 1);
    assert_eq!(
        fx.recorder.take(),
        vec![Seen::Added {
            package: WEATHER.to_string(),
            endpoint: None
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn package_removed_evicts_and_closes() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();
    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;
    fx.recorder.take();

    fx.directory.uninstall(MEDIA);
    fx.host.handle_directory_event(DirectoryEvent::PackageRemoved {
        package: MEDIA.to_string(),
    });
    settle().await;

    assert!(!fx.host.is_connected(&id));
    assert!(!fx.host.is_card_active(&id, "ID"));
    assert_eq!(provider.closings(), 1);
    assert_eq!(provider.open_channels(), 0);
    assert_eq!(
        fx.recorder.take(),
        vec![Seen::Removed {
            package: MEDIA.to_string(),
            endpoint: None
        }]
    );

    // Its refresh timer went with it.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.call_count(Method::CardUpdate), 0);
}

#[tokio::test(start_paused = true)]
async fn removing_unknown_package_is_silent() {
    let provider = LoopbackProvider::new();
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);

    fx.host.on_provider_removed("com.example.unknown", None);
    settle().await;

    assert!(fx.recorder.take().is_empty());
    assert!(fx.host.is_connected(&media_id()));
}

#[tokio::test(start_paused = true)]
async fn component_change_targets_its_endpoint() {
    let provider = LoopbackProvider::new();
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();

    fx.directory
        .set_component_state(MEDIA, "CardProvider", ComponentState::Disabled);
    fx.host.handle_directory_event(DirectoryEvent::PackageChanged {
        package: MEDIA.to_string(),
        components: vec!["CardProvider".to_string()],
    });
    settle().await;

    assert!(!fx.host.is_connected(&id));
    assert_eq!(
        fx.recorder.take(),
        vec![Seen::Removed {
            package: MEDIA.to_string(),
            endpoint: Some(MEDIA_ENDPOINT.to_string())
        }]
    );

    fx.directory
        .set_component_state(MEDIA, "CardProvider", ComponentState::Enabled);
    fx.host.handle_directory_event(DirectoryEvent::PackageChanged {
        package: MEDIA.to_string(),
        components: vec!["CardProvider".to_string()],
    });
    settle().await;

    assert!(fx.host.is_connected(&id));
    assert_eq!(provider.connections(), 2);
    assert_eq!(
        fx.recorder.take(),
        vec![Seen::Added {
            package: MEDIA.to_string(),
            endpoint: Some(MEDIA_ENDPOINT.to_string())
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn refresh_providers_reports_only_new_connections() {
    let media = LoopbackProvider::new();
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &media)]);

    assert!(fx.host.refresh_providers().is_empty());

    let weather = LoopbackProvider::new();
    fx.directory
        .install(provider_info(WEATHER, WEATHER_ENDPOINT), Arc::clone(&weather));
    assert_eq!(fx.host.refresh_providers(), vec![weather_id()]);
    assert!(fx.host.refresh_providers().is_empty());

    assert_eq!(media.connections(), 1);
    assert_eq!(weather.connections(), 1);
    assert_eq!(fx.host.connected(), vec![media_id(), weather_id()]);
}

#[tokio::test(start_paused = true)]
async fn rejected_providers_are_never_connected() {
    let fx = start(&[]);
    let wrong_permission = LoopbackProvider::new();
    let grants_uris = LoopbackProvider::new();
    fx.directory.install(
        ProviderInfo::new(MEDIA, MEDIA_ENDPOINT, "CardProvider").with_permission("other"),
        Arc::clone(&wrong_permission),
    );
    let mut info = provider_info(WEATHER, WEATHER_ENDPOINT);
    info.grant_uri_permissions = true;
    fx.directory.install(info, Arc::clone(&grants_uris));

    assert!(fx.host.refresh_providers().is_empty());
    fx.host.handle_directory_event(DirectoryEvent::PackageAdded {
        package: MEDIA.to_string(),
    });
    settle().await;

    assert!(fx.host.connected().is_empty());
    assert_eq!(wrong_permission.connections(), 0);
    assert_eq!(grants_uris.connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn disabled_package_is_skipped_until_enabled() {
    let provider = LoopbackProvider::new();
    let fx = start(&[]);
    fx.directory
        .install(provider_info(MEDIA, MEDIA_ENDPOINT), Arc::clone(&provider));
    fx.directory.set_package_enabled(MEDIA, false);

    assert!(fx.host.refresh_providers().is_empty());

    fx.directory.set_package_enabled(MEDIA, true);
    fx.host.handle_directory_event(DirectoryEvent::PackageChanged {
        package: MEDIA.to_string(),
        components: vec![MEDIA.to_string()],
    });
    settle().await;

    assert!(fx.host.is_connected(&media_id()));
    assert_eq!(provider.connections(), 1);
}
