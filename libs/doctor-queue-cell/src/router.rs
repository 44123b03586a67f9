use std::sync::Arc;
use axum::{
    Router,
    routing::{get, post, put},
};

use shared_config::AppConfig;
use crate::handlers::{
    join_queue,
    leave_queue,
    get_patient_position,
    get_doctor_queue,
    call_next_patient,
    reorder_doctor_queue,
    clear_doctor_queue,
    get_queue_health,
    QueueAppState,
};
use crate::QueueFacade;

pub fn create_doctor_queue_router(queue: Arc<QueueFacade>, config: Arc<AppConfig>) -> Router {
    let state = QueueAppState::new(queue, config);

    Router::new()
        .route("/join", post(join_queue))
        .route("/patients/{patient_id}/leave", post(leave_queue))
        .route("/patients/{patient_id}/position", get(get_patient_position))
        .route(
            "/doctors/{doctor_id}",
            get(get_doctor_queue).delete(clear_doctor_queue),
        )
        .route("/doctors/{doctor_id}/call-next", post(call_next_patient))
        .route("/doctors/{doctor_id}/order", put(reorder_doctor_queue))
        .route("/health", get(get_queue_health))
        .with_state(state)
}
