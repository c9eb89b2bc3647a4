//! End-to-end behaviour of the host against scripted providers.

use std::sync::Arc;
use std::time::Duration;

use cardhost_engine::loopback::LoopbackProvider;
use cardhost_engine::{ChannelError, HostError, Message};
use cardhost_types::{Card, Component, FetchReason, InteractionKind, Method, Payload};
use tokio::time::sleep;

use crate::common::{
    Fixture, MEDIA, MEDIA_ENDPOINT, Seen, display_context, media_card, media_id, settle, start,
};

#[tokio::test(start_paused = true)]
async fn added_card_gates_fast_component_for_one_fast_period() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();

    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;

    assert!(fx.host.is_card_active(&id, "ID"));
    assert!(!fx.host.is_component_ready(&id, "ID", "PB"));
    assert_eq!(
        fx.recorder.take(),
        vec![Seen::Card {
            provider: id.clone(),
            card_id: "ID".to_string()
        }]
    );

    sleep(Duration::from_millis(997)).await;
    assert!(!fx.host.is_component_ready(&id, "ID", "PB"));
    sleep(Duration::from_millis(3)).await;
    assert!(fx.host.is_component_ready(&id, "ID", "PB"));
    assert!(!fx.host.is_component_ready(&id, "ID", "title"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_card_ids_in_list_are_last_write_wins() {
    let provider = LoopbackProvider::with_cards(vec![
        Card::new("ID", "first"),
        Card::new("ID", "second"),
    ]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();

    fx.host.fetch_all(&display_context());
    settle().await;

    let card_event = Seen::Card {
        provider: id.clone(),
        card_id: "ID".to_string(),
    };
    assert_eq!(fx.recorder.take(), vec![card_event.clone(), card_event]);
    assert_eq!(fx.host.active_cards(&id), vec!["ID".to_string()]);
    assert_eq!(
        fx.host.active_card(&id, "ID").unwrap().payload(),
        &Payload::from("second")
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_added_card_is_never_cached_and_is_removed() {
    let broken = Card::new("ID", "x")
        .with_component(Component::new("PB", "a"))
        .with_component(Component::new("PB", "b"));
    let provider = LoopbackProvider::with_cards(vec![broken]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();

    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;

    assert!(!fx.host.is_card_active(&id, "ID"));
    assert_eq!(
        provider.sent(),
        vec![Message::CardRemoved {
            card_id: "ID".to_string()
        }]
    );
    assert_eq!(
        fx.recorder.take(),
        vec![Seen::Error {
            provider: id.clone(),
            error: HostError::Validation {
                card_id: "ID".to_string()
            }
        }]
    );
    assert!(fx.host.is_connected(&id));
}

#[tokio::test(start_paused = true)]
async fn invalid_refreshed_card_is_dropped_without_removal() {
    let provider = LoopbackProvider::with_cards(vec![Card::new("ID", "x")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();
    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;

    provider.put_card(
        Card::new("ID", "y")
            .with_component(Component::new("PB", "a"))
            .with_component(Component::new("PB", "b")),
    );
    fx.host.fetch_one(None, &id, "ID", FetchReason::UpdateDue);
    settle().await;

    assert!(provider.sent().is_empty());
    assert_eq!(
        fx.host.active_card(&id, "ID").unwrap().payload(),
        &Payload::from("x")
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_list_evicts_provider() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();
    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;
    fx.recorder.take();

    provider.disconnect();
    fx.host.fetch_all(&display_context());
    settle().await;

    assert!(!fx.host.is_connected(&id));
    assert!(!fx.host.is_card_active(&id, "ID"));
    let seen = fx.recorder.take();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0],
        Seen::Removed {
            package: MEDIA.to_string(),
            endpoint: None
        }
    );
    assert!(matches!(
        &seen[1],
        Seen::Error { provider, error } if *provider == id && error.is_disconnected()
    ));

    sleep(Duration::from_secs(2)).await;
    fx.host.request_component(MEDIA_ENDPOINT, "ID", "PB");
    fx.host.handle_change_notice(MEDIA_ENDPOINT, "ID/PB");
    sleep(Duration::from_secs(30)).await;

    assert_eq!(provider.call_count(Method::ComponentUpdate), 0);
    assert_eq!(provider.call_count(Method::CardUpdate), 0);
    assert_eq!(provider.closings(), 0);
    assert!(fx.recorder.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn interaction_triggers_immediate_refresh_then_steady_cadence() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();
    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;

    sleep(Duration::from_millis(2_999)).await;
    fx.host
        .notify_interaction(&id, "ID", "play", InteractionKind::Click);
    settle().await;

    assert_eq!(
        provider.sent(),
        vec![Message::Interaction {
            card_id: "ID".to_string(),
            component_id: "play".to_string(),
            kind: InteractionKind::Click,
        }]
    );
    assert_eq!(provider.call_count(Method::CardUpdate), 1);

    // The cadence started at arm time would have fired at 10s.
    sleep(Duration::from_millis(9_000)).await;
    assert_eq!(provider.call_count(Method::CardUpdate), 1);
    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(provider.call_count(Method::CardUpdate), 2);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(provider.call_count(Method::CardUpdate), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_refresh_recreates_card_removed_meanwhile() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();
    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;

    provider.delay_next(Method::CardUpdate, Duration::from_secs(2));
    fx.host.fetch_one(None, &id, "ID", FetchReason::UpdateDue);
    settle().await;

    fx.host.notify_removed(&id, "ID");
    assert!(!fx.host.is_card_active(&id, "ID"));

    // Responses are not sequenced: the late answer brings the card back.
    sleep(Duration::from_secs(2)).await;
    assert!(fx.host.is_card_active(&id, "ID"));
}

#[tokio::test(start_paused = true)]
async fn added_without_context_fails_locally() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();

    fx.host.fetch_one(None, &id, "ID", FetchReason::Added);
    settle().await;

    assert!(provider.calls().is_empty());
    let seen = fx.recorder.take();
    assert!(matches!(
        seen.as_slice(),
        [Seen::Error {
            error: HostError::Precondition {
                method: Method::CardAdded,
                ..
            },
            ..
        }]
    ));
    assert!(fx.host.is_connected(&id));
}

#[tokio::test(start_paused = true)]
async fn protocol_error_is_reported_without_eviction() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();
    provider.fail_next(
        Method::ListAll,
        ChannelError::protocol(Method::ListAll, None, "malformed bundle"),
    );

    fx.host.fetch_all(&display_context());
    settle().await;

    assert_eq!(
        fx.recorder.take(),
        vec![Seen::Error {
            provider: id.clone(),
            error: ChannelError::protocol(Method::ListAll, None, "malformed bundle").into(),
        }]
    );
    assert!(fx.host.is_connected(&id));
}

#[tokio::test(start_paused = true)]
async fn concurrent_disconnects_evict_once() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, &provider)]);
    let id = media_id();
    fx.host
        .fetch_one(Some(&display_context()), &id, "ID", FetchReason::Added);
    settle().await;
    fx.recorder.take();

    provider.disconnect();
    fx.host.fetch_all(&display_context());
    fx.host.fetch_one(None, &id, "ID", FetchReason::UpdateDue);
    settle().await;

    let seen = fx.recorder.take();
    let removals = seen
        .iter()
        .filter(|seen| matches!(seen, Seen::Removed { .. }))
        .count();
    let errors = seen
        .iter()
        .filter(|seen| matches!(seen, Seen::Error { .. }))
        .count();
    assert_eq!(removals, 1);
    assert_eq!(errors, 2);
    assert!(matches!(seen[0], Seen::Removed { .. }));
}

/// Start with card "ID" active and the recorder drained.
async fn with_active_card(provider: &Arc<LoopbackProvider>) -> Fixture {
    let fx = start(&[(MEDIA, MEDIA_ENDPOINT, provider)]);
    fx.host
        .fetch_one(Some(&display_context()), &media_id(), "ID", FetchReason::Added);
    settle().await;
    fx.recorder.take();
    fx
}

fn assert_evicted_once(fx: &Fixture, provider: &LoopbackProvider) {
    let id = media_id();
    assert!(!fx.host.is_connected(&id));
    assert!(!fx.host.is_card_active(&id, "ID"));
    assert_eq!(provider.closings(), 1);
    let seen = fx.recorder.take();
    assert_eq!(seen.len(), 2, "{seen:?}");
    assert_eq!(
        seen[0],
        Seen::Removed {
            package: MEDIA.to_string(),
            endpoint: None
        }
    );
    assert!(matches!(
        &seen[1],
        Seen::Error { provider, error } if *provider == id && error.is_disconnected()
    ));
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_interaction_evicts_without_refresh() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = with_active_card(&provider).await;
    provider.fail_next(
        Method::Interaction,
        ChannelError::disconnected(Method::Interaction, "binder died"),
    );

    fx.host
        .notify_interaction(&media_id(), "ID", "play", InteractionKind::Click);
    settle().await;

    assert_evicted_once(&fx, &provider);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.call_count(Method::CardUpdate), 0);
    assert!(fx.recorder.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_context_update_evicts_without_refresh() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = with_active_card(&provider).await;
    provider.fail_next(
        Method::ContextUpdate,
        ChannelError::disconnected(Method::ContextUpdate, "binder died"),
    );

    fx.host
        .send_context_update(&display_context(), &media_id(), "ID");
    settle().await;

    assert_evicted_once(&fx, &provider);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.call_count(Method::CardUpdate), 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_removal_evicts_provider() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = with_active_card(&provider).await;
    provider.fail_next(
        Method::CardRemoved,
        ChannelError::disconnected(Method::CardRemoved, "binder died"),
    );

    fx.host.notify_removed(&media_id(), "ID");
    settle().await;

    assert_evicted_once(&fx, &provider);
    assert!(provider.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_component_fetch_evicts_without_delivery() {
    let provider = LoopbackProvider::with_cards(vec![media_card("0")]);
    let fx = with_active_card(&provider).await;
    sleep(Duration::from_secs(1)).await;
    assert!(fx.host.is_component_ready(&media_id(), "ID", "PB"));
    provider.fail_next(
        Method::ComponentUpdate,
        ChannelError::disconnected(Method::ComponentUpdate, "binder died"),
    );

    fx.host.request_component(MEDIA_ENDPOINT, "ID", "PB");
    settle().await;

    assert_evicted_once(&fx, &provider);
    fx.host.request_component(MEDIA_ENDPOINT, "ID", "PB");
    settle().await;
    assert_eq!(provider.call_count(Method::ComponentUpdate), 1);
    assert!(fx.recorder.take().is_empty());
}
