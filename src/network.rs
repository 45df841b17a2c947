//! Relay listeners and target health.
//!
//! Re-exports:
//! - [`ProxyRegistry`]: add, remove and list relays.
//! - [`ProxyStatus`], [`RelayStats`]: per-relay runtime view.

pub mod health_monitor;
pub mod proxy_registry;
pub mod types;

pub use health_monitor::{probe_target, spawn_health_monitor};
pub use proxy_registry::ProxyRegistry;
pub use types::{ProxyStatus, RelayCounters, RelayStats, TargetHealth};
