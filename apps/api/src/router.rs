use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use doctor_queue_cell::{create_doctor_queue_router, QueueFacade};
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, queue: Arc<QueueFacade>) -> Router {
    Router::new()
        .route("/", get(|| async { "MediQueue API is running!" }))
        .nest("/queue", create_doctor_queue_router(queue, config))
}
