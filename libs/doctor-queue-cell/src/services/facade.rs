use std::time::Duration;

use tracing::{info, instrument, warn};

use shared_config::AppConfig;

use crate::services::{local::LocalStore, shared::SharedStore, store::QueueStore};
use crate::{
    DoctorId, EnqueueRequest, PatientId, PositionedEntry, QueueBackendStatus, QueueEntry,
    QueuePosition, SelectionReason, StoreKind,
};

/// The store chosen at startup.
pub enum ActiveStore {
    Shared(SharedStore),
    Local(LocalStore),
}

impl ActiveStore {
    pub fn kind(&self) -> StoreKind {
        match self {
            ActiveStore::Shared(_) => StoreKind::Shared,
            ActiveStore::Local(_) => StoreKind::Local,
        }
    }

    fn as_store(&self) -> &dyn QueueStore {
        match self {
            ActiveStore::Shared(store) => store,
            ActiveStore::Local(store) => store,
        }
    }
}

/// Outcome of store selection: which store, and why.
pub struct StoreSelection {
    pub store: ActiveStore,
    pub reason: SelectionReason,
}

/// Picks the backing store with a single connectivity probe. Never fails:
/// anything short of a reachable Redis ends in the in-process store, except
/// in strict mode where the unreachable Redis store is kept as is.
#[instrument(skip(config), fields(use_redis = config.use_redis, force_local = config.queue_force_local))]
pub async fn select_store(config: &AppConfig) -> StoreSelection {
    if config.queue_force_local {
        info!("Queue store: in-process (forced local)");
        return local_selection(SelectionReason::ForcedLocal);
    }
    if !config.wants_redis() {
        info!("Queue store: in-process (Redis disabled)");
        return local_selection(SelectionReason::SharedStoreDisabled);
    }

    let url = config.redis_url_or_default();
    let timeout = Duration::from_millis(config.redis_timeout_ms);

    let store = match SharedStore::new(&url, config.queue_key_prefix.clone(), timeout) {
        Ok(store) => store,
        Err(e) => {
            warn!("Queue store: Redis pool could not be built ({}), using in-process store", e);
            return local_selection(SelectionReason::SharedStoreUnreachable(e.to_string()));
        }
    };

    match store.probe().await {
        Ok(()) => {
            info!("Queue store: Redis");
            StoreSelection {
                store: ActiveStore::Shared(store),
                reason: SelectionReason::SharedStoreReachable,
            }
        }
        Err(e) if config.queue_strict_redis => {
            warn!("Queue store: Redis unreachable ({}), strict mode keeps it active", e);
            StoreSelection {
                store: ActiveStore::Shared(store),
                reason: SelectionReason::StrictSharedStoreUnreachable(e.to_string()),
            }
        }
        Err(e) => {
            warn!("Queue store: Redis unreachable ({}), falling back to in-process store", e);
            local_selection(SelectionReason::SharedStoreUnreachable(e.to_string()))
        }
    }
}

fn local_selection(reason: SelectionReason) -> StoreSelection {
    StoreSelection {
        store: ActiveStore::Local(LocalStore::new()),
        reason,
    }
}

/// Single entry point for doctor-queue operations.
///
/// Built once at startup and shared by handle; the active store never
/// changes for the lifetime of the facade.
pub struct QueueFacade {
    store: ActiveStore,
    reason: SelectionReason,
}

impl QueueFacade {
    pub async fn initialize(config: &AppConfig) -> Self {
        Self::from_selection(select_store(config).await)
    }

    pub fn from_selection(selection: StoreSelection) -> Self {
        Self {
            store: selection.store,
            reason: selection.reason,
        }
    }

    /// Facade over a fresh in-process store.
    pub fn local() -> Self {
        Self::from_selection(local_selection(SelectionReason::ForcedLocal))
    }

    pub fn backend(&self) -> StoreKind {
        self.store.kind()
    }

    pub fn selection_reason(&self) -> &SelectionReason {
        &self.reason
    }

    pub fn status(&self) -> QueueBackendStatus {
        QueueBackendStatus {
            backend: self.backend(),
            reason: self.reason.clone(),
            usable: self.store.as_store().is_usable(),
        }
    }

    pub async fn enqueue(&self, request: EnqueueRequest) -> bool {
        self.store.as_store().enqueue(request.into_entry()).await
    }

    pub async fn dequeue(&self, doctor_id: DoctorId) -> Option<QueueEntry> {
        self.store.as_store().dequeue(doctor_id).await
    }

    pub async fn get_queue(&self, doctor_id: DoctorId) -> Vec<PositionedEntry> {
        self.store.as_store().get_queue(doctor_id).await
    }

    pub async fn get_position(&self, patient_id: PatientId) -> Option<QueuePosition> {
        self.store.as_store().get_position(patient_id).await
    }

    pub async fn remove_from_queue(&self, patient_id: PatientId) -> bool {
        self.store.as_store().remove_from_queue(patient_id).await
    }

    pub async fn reorder_queue(&self, doctor_id: DoctorId, entries: Vec<QueueEntry>) -> bool {
        self.store.as_store().reorder_queue(doctor_id, entries).await
    }

    pub async fn get_queue_length(&self, doctor_id: DoctorId) -> usize {
        self.store.as_store().get_queue_length(doctor_id).await
    }

    pub async fn clear_queue(&self, doctor_id: DoctorId) -> bool {
        self.store.as_store().clear_queue(doctor_id).await
    }

    pub async fn clear_all(&self) {
        self.store.as_store().clear_all().await
    }
}
