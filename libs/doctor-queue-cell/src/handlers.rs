use std::sync::Arc;
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::{DoctorId, EnqueueRequest, PatientId, QueueFacade, ReorderRequest};

/// Router state: the process-wide queue facade plus config.
#[derive(Clone)]
pub struct QueueAppState {
    pub queue: Arc<QueueFacade>,
    pub config: Arc<AppConfig>,
}

impl QueueAppState {
    pub fn new(queue: Arc<QueueFacade>, config: Arc<AppConfig>) -> Self {
        Self { queue, config }
    }
}

/// Join a doctor's queue. A patient already waiting anywhere is refused.
pub async fn join_queue(
    State(state): State<QueueAppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Queue join request: patient {} for doctor {}", request.patient_id, request.doctor_id);

    if let Some(existing) = state.queue.get_position(request.patient_id).await {
        return Err(AppError::Conflict(format!(
            "Patient {} is already in doctor {}'s queue",
            request.patient_id, existing.doctor_id
        )));
    }

    let patient_id = request.patient_id;
    if !state.queue.enqueue(request).await {
        warn!("Queue store rejected enqueue for patient {}", patient_id);
        return Err(AppError::ServiceUnavailable("Queue store unavailable".to_string()));
    }

    let position = state.queue.get_position(patient_id).await;
    let estimated_wait = position
        .as_ref()
        .map(|p| p.estimated_wait_minutes(state.config.avg_consultation_minutes));

    Ok(Json(json!({
        "success": true,
        "position": position,
        "estimated_wait_minutes": estimated_wait,
    })))
}

pub async fn leave_queue(
    State(state): State<QueueAppState>,
    Path(patient_id): Path<PatientId>,
) -> Result<Json<Value>, AppError> {
    info!("Queue leave request for patient {}", patient_id);

    let removed = state.queue.remove_from_queue(patient_id).await;
    Ok(Json(json!({
        "success": true,
        "removed": removed,
    })))
}

/// Live position of a patient, with a wait estimate.
pub async fn get_patient_position(
    State(state): State<QueueAppState>,
    Path(patient_id): Path<PatientId>,
) -> Result<Json<Value>, AppError> {
    let position = state
        .queue
        .get_position(patient_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Patient {} is not currently queued", patient_id)))?;

    let estimated_wait = position.estimated_wait_minutes(state.config.avg_consultation_minutes);
    Ok(Json(json!({
        "success": true,
        "position": position,
        "estimated_wait_minutes": estimated_wait,
    })))
}

pub async fn get_doctor_queue(
    State(state): State<QueueAppState>,
    Path(doctor_id): Path<DoctorId>,
) -> Result<Json<Value>, AppError> {
    let queue = state.queue.get_queue(doctor_id).await;
    Ok(Json(json!({
        "success": true,
        "doctor_id": doctor_id,
        "queue_length": queue.len(),
        "queue": queue,
    })))
}

pub async fn call_next_patient(
    State(state): State<QueueAppState>,
    Path(doctor_id): Path<DoctorId>,
) -> Result<Json<Value>, AppError> {
    info!("Call-next request for doctor {}", doctor_id);

    let next = state.queue.dequeue(doctor_id).await;
    let message = if next.is_some() {
        "Next patient called"
    } else {
        "No patients in queue"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "patient": next,
        "remaining": state.queue.get_queue_length(doctor_id).await,
    })))
}

pub async fn reorder_doctor_queue(
    State(state): State<QueueAppState>,
    Path(doctor_id): Path<DoctorId>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Reorder request for doctor {} with {} entries", doctor_id, request.entries.len());

    if !state.queue.reorder_queue(doctor_id, request.entries).await {
        return Err(AppError::ServiceUnavailable("Queue store unavailable".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "queue": state.queue.get_queue(doctor_id).await,
    })))
}

pub async fn clear_doctor_queue(
    State(state): State<QueueAppState>,
    Path(doctor_id): Path<DoctorId>,
) -> Result<Json<Value>, AppError> {
    info!("Clear request for doctor {}", doctor_id);

    let cleared = state.queue.clear_queue(doctor_id).await;
    Ok(Json(json!({
        "success": true,
        "cleared": cleared,
    })))
}

pub async fn get_queue_health(State(state): State<QueueAppState>) -> Json<Value> {
    let status = state.queue.status();
    Json(json!({
        "backend": status.backend,
        "reason": status.reason.code(),
        "usable": status.usable,
    }))
}
