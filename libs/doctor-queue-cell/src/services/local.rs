use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::services::store::{normalize_reorder, QueueStore};
use crate::{DoctorId, PatientId, PositionedEntry, QueueEntry, QueuePosition};

/// Tie-breaker shared by every in-process store.
static INSERTION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    INSERTION_SEQUENCE.fetch_add(1, AtomicOrdering::Relaxed)
}

#[derive(Debug, Clone)]
struct HeapItem {
    score: f64,
    sequence: u64,
    entry: QueueEntry,
}

impl HeapItem {
    fn new(score: f64, entry: QueueEntry) -> Self {
        Self {
            score,
            sequence: next_sequence(),
            entry,
        }
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.sequence.cmp(&other.sequence))
    }
}

type DoctorHeap = BinaryHeap<Reverse<HeapItem>>;

#[derive(Default)]
struct LocalState {
    queues: HashMap<DoctorId, DoctorHeap>,
    patient_index: HashMap<PatientId, DoctorId>,
}

impl LocalState {
    /// Heap contents in serving order. Heaps only order their front element.
    fn sorted(&self, doctor_id: DoctorId) -> Vec<QueueEntry> {
        let Some(heap) = self.queues.get(&doctor_id) else {
            return Vec::new();
        };
        let mut items: Vec<&HeapItem> = heap.iter().map(|Reverse(item)| item).collect();
        items.sort();
        items.into_iter().map(|item| item.entry.clone()).collect()
    }

    fn take_from_doctor(&mut self, doctor_id: DoctorId, patient_id: PatientId) -> bool {
        let Some(heap) = self.queues.get_mut(&doctor_id) else {
            return false;
        };
        let before = heap.len();
        heap.retain(|Reverse(item)| item.entry.patient_id != patient_id);
        let removed = heap.len() != before;
        if heap.is_empty() {
            self.queues.remove(&doctor_id);
        }
        removed
    }

    /// Drops the patient from wherever the reverse index says they wait.
    fn detach_patient(&mut self, patient_id: PatientId) -> bool {
        match self.patient_index.remove(&patient_id) {
            Some(doctor_id) => self.take_from_doctor(doctor_id, patient_id),
            None => false,
        }
    }

    fn unindex_if_at(&mut self, patient_id: PatientId, doctor_id: DoctorId) {
        if self.patient_index.get(&patient_id) == Some(&doctor_id) {
            self.patient_index.remove(&patient_id);
        }
    }
}

/// In-process queue store: one min-heap per doctor behind a single mutex.
///
/// State lives as long as the process and is not shared between processes.
#[derive(Default)]
pub struct LocalStore {
    state: Mutex<LocalState>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for LocalStore {
    async fn enqueue(&self, entry: QueueEntry) -> bool {
        let mut state = self.state.lock().await;

        if state.detach_patient(entry.patient_id) {
            debug!("Patient {} re-enqueued, previous entry dropped", entry.patient_id);
        }

        let patient_id = entry.patient_id;
        let doctor_id = entry.doctor_id;
        let item = HeapItem::new(entry.score(), entry);
        state.queues.entry(doctor_id).or_default().push(Reverse(item));
        state.patient_index.insert(patient_id, doctor_id);

        debug!("Patient {} enqueued for doctor {}", patient_id, doctor_id);
        true
    }

    async fn dequeue(&self, doctor_id: DoctorId) -> Option<QueueEntry> {
        let mut state = self.state.lock().await;

        let heap = state.queues.get_mut(&doctor_id)?;
        let Reverse(item) = heap.pop()?;
        if heap.is_empty() {
            state.queues.remove(&doctor_id);
        }
        state.unindex_if_at(item.entry.patient_id, doctor_id);

        debug!("Patient {} dequeued from doctor {}", item.entry.patient_id, doctor_id);
        Some(item.entry)
    }

    async fn get_queue(&self, doctor_id: DoctorId) -> Vec<PositionedEntry> {
        let state = self.state.lock().await;
        PositionedEntry::number_sorted(state.sorted(doctor_id))
    }

    async fn get_position(&self, patient_id: PatientId) -> Option<QueuePosition> {
        let state = self.state.lock().await;

        let doctor_id = *state.patient_index.get(&patient_id)?;
        let entries = state.sorted(doctor_id);
        let total = entries.len();
        let idx = entries.iter().position(|e| e.patient_id == patient_id)?;

        Some(QueuePosition {
            position: idx + 1,
            total,
            doctor_id,
            entry: entries[idx].clone(),
        })
    }

    async fn remove_from_queue(&self, patient_id: PatientId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.detach_patient(patient_id);
        if removed {
            debug!("Patient {} removed from queue", patient_id);
        }
        removed
    }

    async fn reorder_queue(&self, doctor_id: DoctorId, entries: Vec<QueueEntry>) -> bool {
        let entries = normalize_reorder(doctor_id, entries);
        let mut state = self.state.lock().await;

        let previous = state.queues.remove(&doctor_id).unwrap_or_default();
        let listed: HashSet<PatientId> = entries.iter().map(|e| e.patient_id).collect();
        for Reverse(item) in previous.iter() {
            if !listed.contains(&item.entry.patient_id) {
                state.unindex_if_at(item.entry.patient_id, doctor_id);
            }
        }

        let mut heap = DoctorHeap::with_capacity(entries.len());
        for (idx, entry) in entries.into_iter().enumerate() {
            match state.patient_index.get(&entry.patient_id).copied() {
                Some(other) if other != doctor_id => {
                    state.take_from_doctor(other, entry.patient_id);
                }
                _ => {}
            }
            state.patient_index.insert(entry.patient_id, doctor_id);
            heap.push(Reverse(HeapItem::new(idx as f64, entry)));
        }

        if !heap.is_empty() {
            state.queues.insert(doctor_id, heap);
        }

        debug!("Queue for doctor {} reordered", doctor_id);
        true
    }

    async fn get_queue_length(&self, doctor_id: DoctorId) -> usize {
        let state = self.state.lock().await;
        state.queues.get(&doctor_id).map_or(0, |heap| heap.len())
    }

    async fn clear_queue(&self, doctor_id: DoctorId) -> bool {
        let mut state = self.state.lock().await;

        let Some(heap) = state.queues.remove(&doctor_id) else {
            return false;
        };
        for Reverse(item) in heap.iter() {
            state.unindex_if_at(item.entry.patient_id, doctor_id);
        }

        debug!("Cleared {} entries from doctor {}", heap.len(), doctor_id);
        !heap.is_empty()
    }

    async fn clear_all(&self) {
        let mut state = self.state.lock().await;
        state.queues.clear();
        state.patient_index.clear();
    }
}
