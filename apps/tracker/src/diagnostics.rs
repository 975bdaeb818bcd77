use drift_tracker_core::ResourceMonitor;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// Logs host memory after each alert attempt, so a leaking mail session
/// shows up in the service log over long uptimes.
pub struct SysinfoMonitor {
    system: System,
    refresh_kind: RefreshKind,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            refresh_kind: RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        }
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceMonitor for SysinfoMonitor {
    fn sample(&mut self) {
        self.system.refresh_specifics(self.refresh_kind);

        let total_kb = self.system.total_memory() / 1024;
        let used_kb = self.system.used_memory() / 1024;
        debug!(
            used_kb,
            free_kb = total_kb.saturating_sub(used_kb),
            total_kb,
            "Memory after dispatch"
        );
    }
}
