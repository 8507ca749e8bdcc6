//! Monitoring engine module
//!
//! This module is responsible for:
//! - Resolving hosts and probing TCP/UDP port reachability
//! - Dispatching one concurrent probe per registered service
//! - Applying status transitions back to the registry

pub mod orchestrator;
pub mod prober;


pub use orchestrator::Orchestrator;
pub use prober::{ProbeOutcome, Prober};
