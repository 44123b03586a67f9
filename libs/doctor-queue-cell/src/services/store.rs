use async_trait::async_trait;

use crate::{DoctorId, PatientId, PositionedEntry, QueueEntry, QueuePosition};

/// Capability set every queue backing store provides.
///
/// Not-found outcomes (empty queue, unqueued patient) are normal results,
/// never errors. Implementations handle their own I/O and decoding failures
/// and report them through the same `false`/`None`/empty values.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Inserts `entry` into its doctor's queue and points the reverse index
    /// at that doctor. A patient already waiting anywhere is moved.
    async fn enqueue(&self, entry: QueueEntry) -> bool;

    /// Pops the front of the doctor's queue.
    async fn dequeue(&self, doctor_id: DoctorId) -> Option<QueueEntry>;

    /// Full ordered snapshot with 1-based positions.
    async fn get_queue(&self, doctor_id: DoctorId) -> Vec<PositionedEntry>;

    async fn get_position(&self, patient_id: PatientId) -> Option<QueuePosition>;

    async fn remove_from_queue(&self, patient_id: PatientId) -> bool;

    /// Replaces the doctor's whole ordering with `entries`, in list order.
    async fn reorder_queue(&self, doctor_id: DoctorId, entries: Vec<QueueEntry>) -> bool;

    async fn get_queue_length(&self, doctor_id: DoctorId) -> usize;

    async fn clear_queue(&self, doctor_id: DoctorId) -> bool;

    /// Wipes every queue and the whole reverse index.
    async fn clear_all(&self);

    /// Whether the store can currently serve requests.
    fn is_usable(&self) -> bool {
        true
    }
}

/// Prepares a reorder list: every entry is bound to `doctor_id` and only the
/// first occurrence of a patient is kept.
pub(crate) fn normalize_reorder(doctor_id: DoctorId, entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.patient_id))
        .map(|mut entry| {
            entry.doctor_id = doctor_id;
            entry
        })
        .collect()
}
