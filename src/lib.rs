pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod event_bus;
pub mod network;
pub mod protocol_decoding;
pub mod session_management;
pub mod web_interface;

pub use controller::{Controller, Engine};
