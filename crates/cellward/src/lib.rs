//! Service root for the cellward security substrate: wires the
//! Permission Authority, Sandbox Supervisor, DLP-gated Tool Executor
//! and Durable Audit Pipeline together behind a single [`Service`]
//! handle (spec §2, §9 "Global state" — process-wide registries become
//! explicit objects owned here instead of singletons).

pub mod config;
pub mod service;

pub use config::CellwardConfig;
pub use service::Service;
