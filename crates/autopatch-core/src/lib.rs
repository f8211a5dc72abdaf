mod config;
mod outcome;
mod phase;
mod request;
mod retry;

pub use config::{PhaseOverride, PhaseSelection, PhaseSettings, UpdateConfig};
pub use outcome::{PhaseOutcome, RunReport, RunStatus};
pub use phase::{PhaseKey, PhaseState};
pub use request::{ExecutionRequest, FailureKind};
pub use retry::RetryPolicy;
