mod adapter;
mod counts;
mod maintenance;
mod orchestrator;
mod package_manager;
mod store;
mod windows_update;

pub use adapter::{PhaseAdapter, PhaseContext};
pub use maintenance::{MaintenancePhase, MAINTENANCE_TIMEOUT_FLOOR};
pub use orchestrator::{
    default_adapters, execution_plan, Orchestrator, Reporter, MAX_CONCURRENT_PHASES,
};
pub use package_manager::PackageManagerPhase;
pub use store::StorePhase;
pub use windows_update::{WindowsUpdatePhase, UPDATE_TIMEOUT_FLOOR};

#[cfg(test)]
mod tests;
