use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::services::store::{normalize_reorder, QueueStore};
use crate::{DoctorId, PatientId, PositionedEntry, QueueEntry, QueueError, QueuePosition};

const POOL_MAX_SIZE: usize = 16;

/// Sorted-set member layout. `seq` is a zero-padded arrival counter written
/// first, so members sharing a score sort by arrival in Redis' byte order.
/// Decoding ignores it.
#[derive(Serialize)]
struct MemberOut<'a> {
    seq: String,
    #[serde(flatten)]
    entry: &'a QueueEntry,
}

fn encode_member(seq: u64, entry: &QueueEntry) -> Result<String, serde_json::Error> {
    serde_json::to_string(&MemberOut {
        seq: format!("{:020}", seq),
        entry,
    })
}

fn decode_member(member: &str) -> Result<QueueEntry, serde_json::Error> {
    serde_json::from_str(member)
}

/// Redis-backed queue store.
///
/// Each doctor's queue is a sorted set of JSON-encoded entries scored by
/// [`QueueEntry::score`]; `position:patient:{id}` keys map a patient to the
/// doctor whose queue holds them. The stored member string doubles as the
/// removal key, so removals scan the set and compare decoded patient ids.
/// Every command round trip is bounded by the timeout given at construction.
pub struct SharedStore {
    pool: Pool,
    key_prefix: Option<String>,
    timeout: Duration,
    usable: AtomicBool,
}

impl SharedStore {
    /// Builds the connection pool. No network traffic happens here; call
    /// [`SharedStore::probe`] to check reachability.
    pub fn new(
        redis_url: &str,
        key_prefix: Option<String>,
        timeout: Duration,
    ) -> Result<Self, QueueError> {
        let mut cfg = Config::from_url(redis_url);
        let mut pool_cfg = PoolConfig::new(POOL_MAX_SIZE);
        pool_cfg.timeouts = Timeouts {
            wait: Some(timeout),
            create: Some(timeout),
            recycle: Some(timeout),
        };
        cfg.pool = Some(pool_cfg);

        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;

        Ok(Self {
            pool,
            key_prefix,
            timeout,
            usable: AtomicBool::new(false),
        })
    }

    /// Builds the pool and pings the server within the configured timeout.
    pub async fn connect(
        redis_url: &str,
        key_prefix: Option<String>,
        timeout: Duration,
    ) -> Result<Self, QueueError> {
        let store = Self::new(redis_url, key_prefix, timeout)?;
        store.probe().await?;
        Ok(store)
    }

    /// Single connectivity check. Updates [`QueueStore::is_usable`].
    pub async fn probe(&self) -> Result<(), QueueError> {
        let result = self
            .bounded(async {
                let mut conn = self.connection().await?;
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            })
            .await;

        self.usable.store(result.is_ok(), Ordering::SeqCst);
        if result.is_ok() {
            info!("Redis queue store reachable");
        }
        result
    }

    pub fn queue_key(&self, doctor_id: DoctorId) -> String {
        self.key(&format!("queue:doctor:{}", doctor_id))
    }

    pub fn position_key(&self, patient_id: PatientId) -> String {
        self.key(&format!("position:patient:{}", patient_id))
    }

    fn key(&self, suffix: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, suffix),
            None => suffix.to_string(),
        }
    }

    fn sequence_key(&self) -> String {
        self.key("queue:sequence")
    }

    async fn connection(&self) -> Result<Connection, QueueError> {
        Ok(self.pool.get().await?)
    }

    /// Runs `operation` under the store timeout. A stalled server surfaces as
    /// [`QueueError::Timeout`].
    async fn bounded<T, F>(&self, operation: F) -> Result<T, QueueError>
    where
        F: Future<Output = Result<T, QueueError>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Reserves `count` arrival numbers and returns the first one.
    async fn reserve_sequence(&self, conn: &mut Connection, count: usize) -> Result<u64, QueueError> {
        let last: u64 = conn.incr(self.sequence_key(), count as u64).await?;
        Ok(last + 1 - count as u64)
    }

    /// Logs a failed operation and marks the store unusable when the failure
    /// was connectivity rather than payload.
    fn settle<T>(&self, operation: &str, result: Result<T, QueueError>, fallback: T) -> T {
        match result {
            Ok(value) => {
                self.usable.store(true, Ordering::SeqCst);
                value
            }
            Err(e) => {
                if e.is_connectivity() {
                    self.usable.store(false, Ordering::SeqCst);
                }
                error!("Redis queue {} failed: {}", operation, e);
                fallback
            }
        }
    }

    // Fallible operations. The QueueStore impl below wraps these.

    pub async fn try_enqueue(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;

        let position_key = self.position_key(entry.patient_id);
        let current: Option<DoctorId> = conn.get(&position_key).await?;
        if let Some(doctor_id) = current {
            if self.remove_member(&mut conn, doctor_id, entry.patient_id).await? {
                debug!("Patient {} re-enqueued, previous entry dropped", entry.patient_id);
            }
        }

        let seq = self.reserve_sequence(&mut conn, 1).await?;
        let member = encode_member(seq, entry)?;
        let _: () = redis::pipe()
            .atomic()
            .zadd(self.queue_key(entry.doctor_id), member, entry.score())
            .ignore()
            .set(&position_key, entry.doctor_id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!("Patient {} enqueued for doctor {}", entry.patient_id, entry.doctor_id);
        Ok(())
    }

    /// Removes the first decodable entry. Undecodable members stay in the
    /// set and are skipped, like every other read.
    pub async fn try_dequeue(&self, doctor_id: DoctorId) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.connection().await?;
        let queue_key = self.queue_key(doctor_id);

        loop {
            let entries = self.read_queue(&mut conn, doctor_id).await?;
            let Some((member, entry)) = entries.into_iter().next() else {
                return Ok(None);
            };

            // Another process may claim the same member first; ZREM decides.
            let removed: i64 = conn.zrem(&queue_key, &member).await?;
            if removed == 0 {
                debug!("Entry for patient {} already taken, retrying", entry.patient_id);
                continue;
            }

            self.unindex_if_at(&mut conn, entry.patient_id, doctor_id).await?;
            debug!("Patient {} dequeued from doctor {}", entry.patient_id, doctor_id);
            return Ok(Some(entry));
        }
    }

    pub async fn try_get_queue(&self, doctor_id: DoctorId) -> Result<Vec<PositionedEntry>, QueueError> {
        let mut conn = self.connection().await?;
        let entries = self.read_queue(&mut conn, doctor_id).await?;
        Ok(PositionedEntry::number_sorted(
            entries.into_iter().map(|(_, entry)| entry).collect(),
        ))
    }

    pub async fn try_get_position(
        &self,
        patient_id: PatientId,
    ) -> Result<Option<QueuePosition>, QueueError> {
        let mut conn = self.connection().await?;

        let doctor_id: Option<DoctorId> = conn.get(self.position_key(patient_id)).await?;
        let Some(doctor_id) = doctor_id else {
            return Ok(None);
        };

        let entries = self.read_queue(&mut conn, doctor_id).await?;
        let total = entries.len();
        Ok(entries
            .into_iter()
            .enumerate()
            .find(|(_, (_, entry))| entry.patient_id == patient_id)
            .map(|(idx, (_, entry))| QueuePosition {
                position: idx + 1,
                total,
                doctor_id,
                entry,
            }))
    }

    pub async fn try_remove(&self, patient_id: PatientId) -> Result<bool, QueueError> {
        let mut conn = self.connection().await?;
        let position_key = self.position_key(patient_id);

        let doctor_id: Option<DoctorId> = conn.get(&position_key).await?;
        let Some(doctor_id) = doctor_id else {
            return Ok(false);
        };

        let removed = self.remove_member(&mut conn, doctor_id, patient_id).await?;
        let _: i64 = conn.del(&position_key).await?;

        if removed {
            debug!("Patient {} removed from doctor {}", patient_id, doctor_id);
        } else {
            warn!("Patient {} indexed to doctor {} but missing from queue", patient_id, doctor_id);
        }
        Ok(removed)
    }

    pub async fn try_reorder(
        &self,
        doctor_id: DoctorId,
        entries: Vec<QueueEntry>,
    ) -> Result<(), QueueError> {
        let entries = normalize_reorder(doctor_id, entries);
        let mut conn = self.connection().await?;
        let queue_key = self.queue_key(doctor_id);

        let listed: HashSet<PatientId> = entries.iter().map(|e| e.patient_id).collect();
        for (_, previous) in self.read_queue(&mut conn, doctor_id).await? {
            if !listed.contains(&previous.patient_id) {
                self.unindex_if_at(&mut conn, previous.patient_id, doctor_id).await?;
            }
        }

        for entry in &entries {
            let current: Option<DoctorId> = conn.get(self.position_key(entry.patient_id)).await?;
            if let Some(other) = current.filter(|other| *other != doctor_id) {
                self.remove_member(&mut conn, other, entry.patient_id).await?;
            }
        }

        let first_seq = if entries.is_empty() {
            0
        } else {
            self.reserve_sequence(&mut conn, entries.len()).await?
        };

        let mut pipe = redis::pipe();
        pipe.atomic().del(&queue_key).ignore();
        for (idx, entry) in entries.iter().enumerate() {
            let member = encode_member(first_seq + idx as u64, entry)?;
            pipe.zadd(&queue_key, member, idx as f64)
                .ignore()
                .set(self.position_key(entry.patient_id), doctor_id)
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        debug!("Queue for doctor {} reordered with {} entries", doctor_id, entries.len());
        Ok(())
    }

    /// Counts decodable entries, so the length always matches `get_queue`.
    pub async fn try_length(&self, doctor_id: DoctorId) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        Ok(self.read_queue(&mut conn, doctor_id).await?.len())
    }

    pub async fn try_clear(&self, doctor_id: DoctorId) -> Result<bool, QueueError> {
        let mut conn = self.connection().await?;
        let queue_key = self.queue_key(doctor_id);

        for (_, entry) in self.read_queue(&mut conn, doctor_id).await? {
            self.unindex_if_at(&mut conn, entry.patient_id, doctor_id).await?;
        }

        let removed: i64 = conn.del(&queue_key).await?;
        Ok(removed > 0)
    }

    pub async fn try_clear_all(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;

        for pattern in [
            self.key("queue:doctor:*"),
            self.key("position:patient:*"),
            self.sequence_key(),
        ] {
            let keys: Vec<String> = conn.keys(&pattern).await?;
            if !keys.is_empty() {
                let _: i64 = conn.del(keys).await?;
            }
        }

        info!("Cleared all Redis queue state");
        Ok(())
    }

    // Helpers shared by the operations above.

    /// Raw members with their decoded entries, in score order. Members that
    /// fail to decode are logged and skipped.
    async fn read_queue(
        &self,
        conn: &mut Connection,
        doctor_id: DoctorId,
    ) -> Result<Vec<(String, QueueEntry)>, QueueError> {
        let queue_key = self.queue_key(doctor_id);
        let raw: Vec<String> = conn.zrange(&queue_key, 0, -1).await?;

        Ok(raw
            .into_iter()
            .filter_map(|member| match decode_member(&member) {
                Ok(entry) => Some((member, entry)),
                Err(e) => {
                    warn!("Skipping undecodable entry in {}: {}", queue_key, e);
                    None
                }
            })
            .collect())
    }

    async fn remove_member(
        &self,
        conn: &mut Connection,
        doctor_id: DoctorId,
        patient_id: PatientId,
    ) -> Result<bool, QueueError> {
        let entries = self.read_queue(conn, doctor_id).await?;
        let Some((member, _)) = entries.into_iter().find(|(_, e)| e.patient_id == patient_id) else {
            return Ok(false);
        };

        let removed: i64 = conn.zrem(self.queue_key(doctor_id), member).await?;
        Ok(removed > 0)
    }

    async fn unindex_if_at(
        &self,
        conn: &mut Connection,
        patient_id: PatientId,
        doctor_id: DoctorId,
    ) -> Result<(), QueueError> {
        let position_key = self.position_key(patient_id);
        let current: Option<DoctorId> = conn.get(&position_key).await?;
        if current == Some(doctor_id) {
            let _: i64 = conn.del(&position_key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SharedStore {
    async fn enqueue(&self, entry: QueueEntry) -> bool {
        let result = self.bounded(self.try_enqueue(&entry)).await.map(|_| true);
        self.settle("enqueue", result, false)
    }

    async fn dequeue(&self, doctor_id: DoctorId) -> Option<QueueEntry> {
        let result = self.bounded(self.try_dequeue(doctor_id)).await;
        self.settle("dequeue", result, None)
    }

    async fn get_queue(&self, doctor_id: DoctorId) -> Vec<PositionedEntry> {
        let result = self.bounded(self.try_get_queue(doctor_id)).await;
        self.settle("get_queue", result, Vec::new())
    }

    async fn get_position(&self, patient_id: PatientId) -> Option<QueuePosition> {
        let result = self.bounded(self.try_get_position(patient_id)).await;
        self.settle("get_position", result, None)
    }

    async fn remove_from_queue(&self, patient_id: PatientId) -> bool {
        let result = self.bounded(self.try_remove(patient_id)).await;
        self.settle("remove_from_queue", result, false)
    }

    async fn reorder_queue(&self, doctor_id: DoctorId, entries: Vec<QueueEntry>) -> bool {
        let result = self.bounded(self.try_reorder(doctor_id, entries)).await.map(|_| true);
        self.settle("reorder_queue", result, false)
    }

    async fn get_queue_length(&self, doctor_id: DoctorId) -> usize {
        let result = self.bounded(self.try_length(doctor_id)).await;
        self.settle("get_queue_length", result, 0)
    }

    async fn clear_queue(&self, doctor_id: DoctorId) -> bool {
        let result = self.bounded(self.try_clear(doctor_id)).await;
        self.settle("clear_queue", result, false)
    }

    async fn clear_all(&self) {
        let result = self.bounded(self.try_clear_all()).await;
        self.settle("clear_all", result, ())
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }
}
