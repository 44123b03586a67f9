// libs/doctor-queue-cell/tests/facade_test.rs
// Store selection and pass-through behaviour of the queue facade.

use std::sync::Arc;
use assert_matches::assert_matches;

use doctor_queue_cell::*;
use shared_config::AppConfig;

/// Nothing listens on port 1, so connects are refused immediately.
const UNREACHABLE_REDIS: &str = "redis://127.0.0.1:1/0";

fn unreachable_config() -> AppConfig {
    AppConfig {
        redis_url: Some(UNREACHABLE_REDIS.to_string()),
        use_redis: true,
        redis_timeout_ms: 300,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_force_local_skips_redis() {
    let config = AppConfig {
        use_redis: true,
        queue_force_local: true,
        redis_url: Some(UNREACHABLE_REDIS.to_string()),
        ..AppConfig::default()
    };

    let facade = QueueFacade::initialize(&config).await;

    assert_eq!(facade.backend(), StoreKind::Local);
    assert_eq!(facade.selection_reason(), &SelectionReason::ForcedLocal);
    assert!(facade.status().usable);
}

#[tokio::test]
async fn test_redis_disabled_selects_local() {
    let facade = QueueFacade::initialize(&AppConfig::default()).await;

    assert_eq!(facade.backend(), StoreKind::Local);
    assert_eq!(facade.selection_reason(), &SelectionReason::SharedStoreDisabled);
}

#[tokio::test]
async fn test_unreachable_redis_falls_back_to_local() {
    let selection = select_store(&unreachable_config()).await;

    assert_eq!(selection.store.kind(), StoreKind::Local);
    assert_matches!(selection.reason, SelectionReason::SharedStoreUnreachable(_));
}

#[tokio::test]
async fn test_malformed_redis_url_falls_back_to_local() {
    let config = AppConfig {
        redis_url: Some("definitely not a redis url".to_string()),
        ..unreachable_config()
    };

    let facade = QueueFacade::initialize(&config).await;

    assert_eq!(facade.backend(), StoreKind::Local);
    assert_eq!(facade.selection_reason().code(), "shared_store_unreachable");
}

#[tokio::test]
async fn test_fallback_store_is_fully_functional() {
    let facade = QueueFacade::initialize(&unreachable_config()).await;

    assert!(facade.enqueue(EnqueueRequest::walk_in(1, 5)).await);
    assert!(facade.enqueue(EnqueueRequest::walk_in(2, 5)).await);

    assert_eq!(facade.get_queue_length(5).await, 2);
    assert_eq!(facade.dequeue(5).await.map(|e| e.patient_id), Some(1));
}

#[tokio::test]
async fn test_strict_mode_keeps_unusable_redis() {
    let config = AppConfig {
        queue_strict_redis: true,
        ..unreachable_config()
    };

    let facade = QueueFacade::initialize(&config).await;

    assert_eq!(facade.backend(), StoreKind::Shared);
    assert_matches!(
        facade.selection_reason(),
        SelectionReason::StrictSharedStoreUnreachable(_)
    );
    assert!(!facade.status().usable);

    assert!(!facade.enqueue(EnqueueRequest::walk_in(1, 5)).await);
    assert!(facade.dequeue(5).await.is_none());
    assert!(facade.get_queue(5).await.is_empty());
    assert!(facade.get_position(1).await.is_none());
    assert!(!facade.remove_from_queue(1).await);
    assert!(!facade.reorder_queue(5, vec![QueueEntry::new(1, 5)]).await);
    assert_eq!(facade.get_queue_length(5).await, 0);
    assert!(!facade.clear_queue(5).await);
}

#[tokio::test]
async fn test_facade_passes_all_fields_through() {
    let facade = QueueFacade::local();

    let request = EnqueueRequest {
        patient_id: 11,
        doctor_id: 3,
        priority: 4,
        appointment_id: Some(900),
        queue_number: Some(12),
    };
    assert!(facade.enqueue(request).await);

    let position = facade.get_position(11).await.expect("patient 11 is queued");
    assert_eq!(position.position, 1);
    assert_eq!(position.total, 1);
    assert_eq!(position.doctor_id, 3);
    assert_eq!(position.entry.priority, 4);
    assert_eq!(position.entry.appointment_id, Some(900));
    assert_eq!(position.entry.queue_number, Some(12));
}

#[tokio::test]
async fn test_clear_queue_scenario_through_facade() {
    let facade = QueueFacade::local();
    for patient_id in [1, 2, 3] {
        facade.enqueue(EnqueueRequest::walk_in(patient_id, 5)).await;
    }

    assert!(facade.clear_queue(5).await);
    assert_eq!(facade.get_queue_length(5).await, 0);
    for patient_id in [1, 2, 3] {
        assert!(facade.get_position(patient_id).await.is_none());
    }
}

#[tokio::test]
async fn test_clear_all_resets_facade_state() {
    let facade = QueueFacade::local();
    facade.enqueue(EnqueueRequest::walk_in(1, 5)).await;
    facade.enqueue(EnqueueRequest::walk_in(2, 6)).await;

    facade.clear_all().await;

    assert!(facade.get_queue(5).await.is_empty());
    assert!(facade.get_queue(6).await.is_empty());
}

#[tokio::test]
async fn test_facade_is_shared_by_handle() {
    let facade = Arc::new(QueueFacade::local());
    let other = Arc::clone(&facade);

    facade.enqueue(EnqueueRequest::walk_in(1, 5)).await;

    assert_eq!(other.get_queue_length(5).await, 1);
    assert_eq!(other.backend(), facade.backend());
}
