//! Feast Sim - seeded end-to-end runs of the orchestrator
//!
//! Drives [`feast_core::EnrichmentOrchestrator`] with a simulated backend
//! and audits everything a consumer would observe.

pub mod audit;
pub mod client;
pub mod simulator;

pub use audit::{AuditObserver, ObserverTally, ViewAudit, Violation};
pub use client::{ClientCalls, ClientProfile, SimulatedClient};
pub use simulator::{
    run_plan, stress_plan, supersede_plan, PlannedQuery, SimulatorConfig, SimulatorReport,
    SimulatorStats,
};
