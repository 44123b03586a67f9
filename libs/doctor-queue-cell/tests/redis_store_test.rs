// libs/doctor-queue-cell/tests/redis_store_test.rs
// Runs against a live Redis when REDIS_TEST_URL is set; skipped otherwise.
// Every test works in its own key namespace and cleans up after itself.

use std::time::Duration;
use redis::AsyncCommands;
use uuid::Uuid;

use doctor_queue_cell::*;

struct RedisTestStore {
    store: SharedStore,
    url: String,
    prefix: String,
}

impl RedisTestStore {
    async fn new() -> Option<Self> {
        let url = match std::env::var("REDIS_TEST_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("REDIS_TEST_URL not set, skipping Redis queue test");
                return None;
            }
        };
        let prefix = format!("test_{}", Uuid::new_v4().simple());

        let store = SharedStore::connect(&url, Some(prefix.clone()), Duration::from_secs(2))
            .await
            .expect("Redis at REDIS_TEST_URL should be reachable");

        Some(Self { store, url, prefix })
    }

    async fn raw_connection(&self) -> redis::aio::MultiplexedConnection {
        let client = redis::Client::open(self.url.as_str()).expect("valid Redis URL");
        client
            .get_multiplexed_async_connection()
            .await
            .expect("Redis connection")
    }

    async fn cleanup(self) {
        self.store.clear_all().await;
    }
}

fn patient_ids(queue: &[PositionedEntry]) -> Vec<PatientId> {
    queue.iter().map(|e| e.entry.patient_id).collect()
}

#[tokio::test]
async fn test_redis_store_is_usable_after_connect() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    assert!(ctx.store.is_usable());

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_fifo_and_positions() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    assert!(ctx.store.enqueue(QueueEntry::new(10, 100)).await);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(ctx.store.enqueue(QueueEntry::new(20, 100)).await);

    let queue = ctx.store.get_queue(100).await;
    assert_eq!(patient_ids(&queue), vec![10, 20]);
    assert_eq!(queue[1].position, 2);

    let position = ctx.store.get_position(20).await.expect("patient 20 is queued");
    assert_eq!(position.position, 2);
    assert_eq!(position.total, 2);
    assert_eq!(position.doctor_id, 100);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_priority_ordering() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    ctx.store.enqueue(QueueEntry::new(1, 10)).await;
    ctx.store.enqueue(QueueEntry::new(2, 10).with_priority(5)).await;
    ctx.store.enqueue(QueueEntry::new(3, 10)).await;

    assert_eq!(ctx.store.get_position(2).await.unwrap().position, 1);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_equal_priority_keeps_arrival_order() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    ctx.store.enqueue(QueueEntry::new(2, 5).with_priority(5)).await;
    ctx.store.enqueue(QueueEntry::new(10, 5).with_priority(5)).await;
    ctx.store.enqueue(QueueEntry::new(1, 5).with_priority(5)).await;

    assert_eq!(patient_ids(&ctx.store.get_queue(5).await), vec![2, 10, 1]);
    assert_eq!(ctx.store.dequeue(5).await.map(|e| e.patient_id), Some(2));

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_identical_join_times_keep_arrival_order() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    let joined_at = chrono::Utc::now();
    for patient_id in [30, 4, 200] {
        let mut entry = QueueEntry::new(patient_id, 6);
        entry.joined_at = joined_at;
        ctx.store.enqueue(entry).await;
    }

    assert_eq!(patient_ids(&ctx.store.get_queue(6).await), vec![30, 4, 200]);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_dequeue_clears_reverse_index() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    ctx.store.enqueue(QueueEntry::new(1, 5)).await;
    tokio::time::sleep(Duration::from_millis(2)).await;
    ctx.store.enqueue(QueueEntry::new(2, 5)).await;

    let next = ctx.store.dequeue(5).await.expect("queue has entries");
    assert_eq!(next.patient_id, 1);
    assert!(ctx.store.get_position(1).await.is_none());

    let mut conn = ctx.raw_connection().await;
    let indexed: Option<i64> = conn.get(ctx.store.position_key(1)).await.unwrap();
    assert!(indexed.is_none());

    assert!(ctx.store.dequeue(5).await.is_some());
    assert!(ctx.store.dequeue(5).await.is_none());
    assert_eq!(ctx.store.get_queue_length(5).await, 0);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_remove_and_reenqueue() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    ctx.store.enqueue(QueueEntry::new(1, 10)).await;
    ctx.store.enqueue(QueueEntry::new(1, 20)).await;
    assert_eq!(ctx.store.get_queue_length(10).await, 0);
    assert_eq!(ctx.store.get_position(1).await.unwrap().doctor_id, 20);

    assert!(ctx.store.remove_from_queue(1).await);
    assert!(!ctx.store.remove_from_queue(1).await);
    assert!(ctx.store.get_queue(20).await.is_empty());

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_reorder_replaces_ordering() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    for patient_id in [1, 2, 3] {
        ctx.store.enqueue(QueueEntry::new(patient_id, 5)).await;
    }

    let new_order = vec![QueueEntry::new(3, 5), QueueEntry::new(1, 5)];
    assert!(ctx.store.reorder_queue(5, new_order).await);

    assert_eq!(patient_ids(&ctx.store.get_queue(5).await), vec![3, 1]);
    assert!(ctx.store.get_position(2).await.is_none());
    assert_eq!(ctx.store.get_position(1).await.unwrap().position, 2);

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_skips_undecodable_members() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    ctx.store.enqueue(QueueEntry::new(1, 5)).await;
    let mut conn = ctx.raw_connection().await;
    let _: () = conn.zadd(ctx.store.queue_key(5), "{not json", 0.0).await.unwrap();

    let queue = ctx.store.get_queue(5).await;
    assert_eq!(patient_ids(&queue), vec![1]);
    assert_eq!(queue[0].position, 1);

    // The garbage member has the lowest score; dequeue skips past it and
    // leaves it in place.
    assert_eq!(ctx.store.dequeue(5).await.map(|e| e.patient_id), Some(1));
    let remaining: usize = conn.zcard(ctx.store.queue_key(5)).await.unwrap();
    assert_eq!(remaining, 1);
    assert_eq!(ctx.store.get_queue_length(5).await, 0);
    assert!(ctx.store.dequeue(5).await.is_none());

    ctx.cleanup().await;
}

#[tokio::test]
async fn test_redis_clear_queue_and_clear_all() {
    let Some(ctx) = RedisTestStore::new().await else { return };

    for patient_id in [1, 2, 3] {
        ctx.store.enqueue(QueueEntry::new(patient_id, 5)).await;
    }
    ctx.store.enqueue(QueueEntry::new(4, 6)).await;

    assert!(ctx.store.clear_queue(5).await);
    assert!(!ctx.store.clear_queue(5).await);
    for patient_id in [1, 2, 3] {
        assert!(ctx.store.get_position(patient_id).await.is_none());
    }

    ctx.store.clear_all().await;
    assert!(ctx.store.get_position(4).await.is_none());

    let mut conn = ctx.raw_connection().await;
    let leftover: Vec<String> = conn.keys(format!("{}:*", ctx.prefix)).await.unwrap();
    assert!(leftover.is_empty());

    ctx.cleanup().await;
}
