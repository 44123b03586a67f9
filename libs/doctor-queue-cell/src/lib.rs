pub mod models;
pub mod services;
pub mod error;
pub mod handlers;
pub mod router;

pub use models::*;
pub use error::*;
pub use services::*;
pub use router::create_doctor_queue_router;
