//! Engine ownership and process bootstrap.

pub mod controller_handler;
pub mod engine;

pub use controller_handler::Controller;
pub use engine::Engine;
