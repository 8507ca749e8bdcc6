//! portwatch - a watchdog for network-reachable services.
//!
//! The registry stores services (host, port, protocol), the monitoring
//! orchestrator probes them concurrently, and the watchdog schedule entry
//! gates the whole thing. The [`api`] module is the typed surface an HTTP
//! layer mounts routes over.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod pagination;
pub mod pool;
pub mod validation;
pub mod watchdog;
