//! End-to-end behaviour of the engine against the in-memory hub.

use std::sync::Arc;
use std::time::Duration;

use ensure_core::attributes::keys;
use ensure_engine::mock::{Behaviour, InMemoryPlatform};
use ensure_engine::{
    AttributeSet, EngineConfig, EngineError, Ensure, EnsureService, EntityId, EntityOutcome,
    Escalation, PowerState, SharedConfig, Target, TokioExecutor,
};
use serde_json::json;

fn id(s: &str) -> EntityId {
    s.parse().unwrap()
}

fn config(max_retries: u32, background_retry_delay_s: u64, enable_notifications: bool) -> EngineConfig {
    EngineConfig {
        max_retries,
        background_retry_delay_s,
        enable_notifications,
        ..EngineConfig::default()
    }
}

fn service(hub: &Arc<InMemoryPlatform>, config: EngineConfig) -> EnsureService {
    EnsureService::new(hub.platform(), SharedConfig::new(config).unwrap())
}

#[tokio::test(start_paused = true)]
async fn never_converging_entity_gets_exactly_max_retries_attempts() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("light.stuck", "off", Behaviour::Unresponsive);
    let service = service(&hub, config(3, 300, false));

    let report = service
        .ensure_on(Target::EntityId(id("light.stuck")), AttributeSet::new())
        .await
        .unwrap()
        .wait()
        .await;

    // One fast-path command, then three attempts.
    assert_eq!(hub.commands_for("light.stuck").len(), 4);
    assert_eq!(
        report.outcome(&id("light.stuck")),
        Some(&EntityOutcome::Escalated {
            escalation: Escalation::Suppressed
        })
    );
    assert!(hub.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn background_tier_defers_notification() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("light.stuck", "off", Behaviour::Unresponsive);
    let service = service(&hub, config(2, 30, true));

    let report = service
        .ensure_on(Target::EntityId(id("light.stuck")), AttributeSet::new())
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(
        report.outcome(&id("light.stuck")),
        Some(&EntityOutcome::Escalated {
            escalation: Escalation::BackgroundScheduled {
                delay: Duration::from_secs(30)
            }
        })
    );
    assert!(hub.notifications().is_empty());

    let executor = hub.executor();
    assert_eq!(executor.delays(), vec![Duration::from_secs(30)]);
    let before = hub.commands().len();
    assert_eq!(executor.run_pending().await, 1);

    // The background loop makes its own bounded attempts and never reschedules.
    assert_eq!(hub.commands().len(), before + 2);
    assert_eq!(executor.pending(), 0);

    let notifications = hub.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].id.as_str(), "device_fail_light_stuck");
    assert!(notifications[0]
        .title
        .ends_with("(Background Retry Also Failed)"));
}

#[tokio::test(start_paused = true)]
async fn background_success_stays_quiet() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("fan.attic", "off", Behaviour::Unresponsive);
    let service = service(&hub, config(2, 10, true));

    service
        .ensure_on(Target::EntityId(id("fan.attic")), AttributeSet::new())
        .await
        .unwrap()
        .wait()
        .await;

    hub.set_behaviour("fan.attic", Behaviour::Responsive);
    hub.executor().run_pending().await;

    assert!(hub.state_of("fan.attic").unwrap().is(PowerState::On));
    assert!(hub.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn background_skips_when_already_converged() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("switch.heater", "on", Behaviour::Unresponsive);
    let service = service(&hub, config(2, 30, true));

    service
        .ensure_off(Target::EntityId(id("switch.heater")))
        .await
        .unwrap()
        .wait()
        .await;

    hub.set_state("switch.heater", "off");
    let before = hub.commands().len();
    hub.executor().run_pending().await;

    assert_eq!(hub.commands().len(), before);
    assert!(hub.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disabled_background_notifies_immediately() {
    let hub = InMemoryPlatform::shared();
    hub.add_group("group.porch", &["light.left", "light.right"]);
    hub.add_entity("light.left", "off", Behaviour::Unresponsive);
    hub.add_entity("light.right", "off", Behaviour::Responsive);
    let service = service(&hub, config(2, 300, true));

    let report = service
        .ensure_on(Target::EntityId(id("group.porch")), AttributeSet::new())
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(
        report.outcome(&id("light.left")),
        Some(&EntityOutcome::Escalated {
            escalation: Escalation::Notified
        })
    );
    assert!(report.outcome(&id("light.right")).unwrap().is_converged());
    assert_eq!(hub.executor().pending(), 0);

    let notifications = hub.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Ensure Device Control Failed (Group Member)");
    assert!(notifications[0].message.contains("from group group.porch"));
}

#[tokio::test(start_paused = true)]
async fn toggle_group_turns_everything_off_when_one_is_on() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("light.a", "off", Behaviour::Responsive);
    hub.add_entity("light.b", "on", Behaviour::Responsive);
    hub.add_entity("light.c", "off", Behaviour::Responsive);

    let service = service(&hub, EngineConfig::default());
    let dispatch = service
        .toggle_group(Target::EntityIds(vec![id("light.a"), id("light.b"), id("light.c")]))
        .await
        .unwrap();

    assert!(dispatch.entities.iter().all(|(_, state)| *state == PowerState::Off));

    let commands = hub.commands();
    assert_eq!(commands.len(), 3);
    assert!(commands.iter().all(|c| c.action == "turn_off"));

    assert!(dispatch.wait().await.all_converged());
    for entity in ["light.a", "light.b", "light.c"] {
        assert!(hub.state_of(entity).unwrap().is(PowerState::Off));
    }
}

#[tokio::test(start_paused = true)]
async fn toggle_group_turns_everything_on_when_all_are_off() {
    let hub = InMemoryPlatform::shared();
    hub.add_group("group.hall", &["light.a", "light.b"]);
    hub.add_entity("light.a", "off", Behaviour::Responsive);
    hub.add_entity("light.b", "unavailable", Behaviour::Responsive);

    let service = service(&hub, EngineConfig::default());
    let dispatch = service
        .toggle_group(Target::EntityId(id("group.hall")))
        .await
        .unwrap();

    let fast = &hub.commands()[0];
    assert_eq!((fast.domain.as_str(), fast.action.as_str()), ("homeassistant", "turn_on"));
    assert!(dispatch.wait().await.all_converged());
}

#[tokio::test(start_paused = true)]
async fn failed_group_fast_path_still_drives_members() {
    let hub = InMemoryPlatform::shared();
    hub.add_group("group.living", &["light.lamp", "light.ceiling"]);
    hub.add_entity("light.lamp", "off", Behaviour::Responsive);
    hub.add_entity("light.ceiling", "off", Behaviour::Responsive);
    hub.fail_group_commands("group.living");
    let service = service(&hub, EngineConfig::default());

    let report = service
        .ensure_on(
            Target::EntityId(id("group.living")),
            AttributeSet::new().with(keys::BRIGHTNESS_PCT, 30),
        )
        .await
        .unwrap()
        .wait()
        .await;

    let fast = &hub.commands()[0];
    assert_eq!(
        (fast.domain.as_str(), fast.entity_id.as_str()),
        ("homeassistant", "group.living")
    );
    assert!(report.all_converged());
    for entity in ["light.lamp", "light.ceiling"] {
        assert_eq!(hub.commands_for(entity).len(), 1, "{entity}");
        assert_eq!(
            report.outcome(&id(entity)),
            Some(&EntityOutcome::Converged { attempts: 1 })
        );
        assert!(hub.state_of(entity).unwrap().is(PowerState::On));
    }
    assert!(hub.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn absent_color_feedback_still_converges() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("light.cheap", "off", Behaviour::NoColorFeedback);
    let service = service(&hub, EngineConfig::default());

    let report = service
        .ensure_on(
            Target::EntityId(id("light.cheap")),
            AttributeSet::new()
                .with(keys::RGB_COLOR, json!([255, 0, 0]))
                .with(keys::BRIGHTNESS_PCT, 50),
        )
        .await
        .unwrap()
        .wait()
        .await;

    assert!(report.all_converged());
}

#[tokio::test(start_paused = true)]
async fn config_updates_apply_to_later_invocations_only() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("light.stuck", "off", Behaviour::Unresponsive);
    let shared = SharedConfig::new(config(2, 300, false)).unwrap();
    let service = EnsureService::new(hub.platform(), shared.clone());

    let dispatch = service
        .ensure_on(Target::EntityId(id("light.stuck")), AttributeSet::new())
        .await
        .unwrap();
    shared.replace(config(4, 300, false)).unwrap();
    dispatch.wait().await;
    assert_eq!(hub.commands().len(), 1 + 2);

    service
        .ensure_on(Target::EntityId(id("light.stuck")), AttributeSet::new())
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(hub.commands().len(), 3 + 1 + 4);
}

#[tokio::test(start_paused = true)]
async fn delay_override_sets_the_timeout_and_is_never_forwarded() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("light.slow", "off", Behaviour::Unresponsive);
    let service = service(&hub, config(2, 300, false));

    let start = tokio::time::Instant::now();
    service
        .ensure_on(
            Target::EntityId(id("light.slow")),
            AttributeSet::new().with(keys::DELAY, 3000),
        )
        .await
        .unwrap()
        .wait()
        .await;

    // 1s settle, then 3500ms and 4000ms attempts.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(8500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(8800), "{elapsed:?}");
    assert!(hub.commands().iter().all(|c| !c.attributes.contains(keys::DELAY)));
}

#[tokio::test(start_paused = true)]
async fn large_batches_all_converge() {
    let hub = InMemoryPlatform::shared();
    let ids: Vec<EntityId> = (0..10)
        .map(|i| {
            let name = format!("light.bulb_{i}");
            hub.add_entity(&name, "off", Behaviour::ConvergeAfter(3));
            id(&name)
        })
        .collect();
    let service = service(&hub, EngineConfig::default());

    let report = service
        .ensure_on(Target::EntityIds(ids.clone()), AttributeSet::new())
        .await
        .unwrap()
        .wait()
        .await;

    assert!(report.all_converged());
    let order: Vec<_> = report.entities.iter().map(|r| r.entity_id.clone()).collect();
    assert_eq!(order, ids);
    for entity in &ids {
        // Fast path plus two per-entity attempts.
        assert_eq!(hub.commands_for(entity.as_str()).len(), 3);
    }
}

#[tokio::test(start_paused = true)]
async fn tokio_executor_runs_background_retry_after_delay() {
    let hub = InMemoryPlatform::shared();
    hub.add_entity("light.stuck", "off", Behaviour::Unresponsive);
    let service = EnsureService::new(
        hub.platform_with(Arc::new(TokioExecutor)),
        SharedConfig::new(config(1, 20, true)).unwrap(),
    );

    service
        .ensure_on(Target::EntityId(id("light.stuck")), AttributeSet::new())
        .await
        .unwrap()
        .wait()
        .await;
    assert!(hub.notifications().is_empty());

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert!(hub.notifications().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(hub.notifications().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_targets_are_validation_errors() {
    let hub = InMemoryPlatform::shared();
    let service = service(&hub, EngineConfig::default());

    let err = service
        .toggle(Target::DeviceId("missing".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoEntities));
    assert_eq!(err.http_status_code(), 400);
    assert!(hub.commands().is_empty());
}
