pub mod store;
pub mod local;
pub mod shared;
pub mod facade;

pub use store::*;
pub use local::*;
pub use shared::*;
pub use facade::*;
