mod powershell;
mod probes;
mod process;
mod runner;

pub use powershell::{powershell_args, POWERSHELL};
pub use probes::{
    has_internet, is_tool_available, reboot_required, RebootProbe, CONNECTIVITY_ENDPOINTS,
};
pub use process::{run_once, AttemptOutput};
pub use runner::{execute_with_retries, CommandRunner, SystemCommandRunner};
