//! Terminating SAP GUI processes for the forced logoff path.

use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// Kills processes by executable name.
pub trait ProcessTerminator {
    /// Kills every process whose name matches one of `names` (case-insensitive).
    /// Returns how many were killed.
    fn terminate(&self, names: &[String]) -> usize;
}

/// [`ProcessTerminator`] backed by the system process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTerminator;

impl SystemProcessTerminator {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTerminator for SystemProcessTerminator {
    fn terminate(&self, names: &[String]) -> usize {
        let wanted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut killed_count = 0;
        for (pid, process) in system.processes() {
            let process_name = process.name().to_string_lossy().to_lowercase();
            if !matches_any(&process_name, &wanted) {
                continue;
            }

            if process.kill() {
                killed_count += 1;
                info!("Killed {} (PID {})", process_name, pid.as_u32());
            } else {
                warn!(
                    "Failed to kill {} (PID {}), may require elevated permissions",
                    process_name,
                    pid.as_u32()
                );
            }
        }

        debug!("Terminated {} SAP process(es)", killed_count);
        killed_count
    }
}

/// Compares with and without the `.exe` suffix so configs work on every platform.
fn matches_any(process_name: &str, wanted: &[String]) -> bool {
    let bare = process_name.trim_end_matches(".exe");
    wanted
        .iter()
        .any(|w| w == process_name || w.trim_end_matches(".exe") == bare)
}
