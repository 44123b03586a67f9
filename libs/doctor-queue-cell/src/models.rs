use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PatientId = i64;
pub type DoctorId = i64;

/// One patient's waiting-room record within a doctor's queue.
///
/// Entries are never mutated in place once stored; any change is a
/// remove followed by a reinsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub appointment_id: Option<i64>,
    #[serde(default)]
    pub queue_number: Option<i64>,
    pub joined_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(patient_id: PatientId, doctor_id: DoctorId) -> Self {
        Self {
            patient_id,
            doctor_id,
            priority: 0,
            appointment_id: None,
            queue_number: None,
            joined_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_appointment(mut self, appointment_id: Option<i64>) -> Self {
        self.appointment_id = appointment_id;
        self
    }

    pub fn with_queue_number(mut self, queue_number: Option<i64>) -> Self {
        self.queue_number = queue_number;
        self
    }

    pub fn is_walk_in(&self) -> bool {
        self.appointment_id.is_none()
    }

    /// Ordering score shared by both stores. Lower scores are served first:
    /// any positive priority maps below every timestamp, everything else is
    /// FIFO by join time.
    pub fn score(&self) -> f64 {
        priority_score(self.priority, self.joined_at)
    }
}

pub fn priority_score(priority: i32, joined_at: DateTime<Utc>) -> f64 {
    if priority > 0 {
        -f64::from(priority)
    } else {
        joined_at.timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Arguments for a queue join, as handed over by the route layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub appointment_id: Option<i64>,
    #[serde(default)]
    pub queue_number: Option<i64>,
}

impl EnqueueRequest {
    pub fn walk_in(patient_id: PatientId, doctor_id: DoctorId) -> Self {
        Self {
            patient_id,
            doctor_id,
            priority: 0,
            appointment_id: None,
            queue_number: None,
        }
    }

    pub fn into_entry(self) -> QueueEntry {
        QueueEntry::new(self.patient_id, self.doctor_id)
            .with_priority(self.priority)
            .with_appointment(self.appointment_id)
            .with_queue_number(self.queue_number)
    }
}

/// A queue entry annotated with its 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedEntry {
    #[serde(flatten)]
    pub entry: QueueEntry,
    pub position: usize,
}

impl PositionedEntry {
    pub fn number_sorted(entries: Vec<QueueEntry>) -> Vec<PositionedEntry> {
        entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| PositionedEntry { entry, position: idx + 1 })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePosition {
    pub position: usize,
    pub total: usize,
    pub doctor_id: DoctorId,
    pub entry: QueueEntry,
}

impl QueuePosition {
    /// Patients ahead times the average consultation length.
    pub fn estimated_wait_minutes(&self, avg_consultation_minutes: u32) -> u64 {
        self.position.saturating_sub(1) as u64 * u64::from(avg_consultation_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Shared,
    Local,
}

/// Why store selection ended up where it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum SelectionReason {
    SharedStoreReachable,
    ForcedLocal,
    SharedStoreDisabled,
    SharedStoreUnreachable(String),
    StrictSharedStoreUnreachable(String),
}

impl SelectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            SelectionReason::SharedStoreReachable => "shared_store_reachable",
            SelectionReason::ForcedLocal => "forced_local",
            SelectionReason::SharedStoreDisabled => "shared_store_disabled",
            SelectionReason::SharedStoreUnreachable(_) => "shared_store_unreachable",
            SelectionReason::StrictSharedStoreUnreachable(_) => "strict_shared_store_unreachable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueBackendStatus {
    pub backend: StoreKind,
    pub reason: SelectionReason,
    pub usable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub entries: Vec<QueueEntry>,
}
