//! Port and process inspection.
//!
//! Everything the supervisor knows about "who owns this port" flows through
//! the [`ProcessInspector`] trait so the rest of the engine never touches
//! platform specifics. An inspection failure is a reported error, never an
//! empty answer: "nobody owns the port" and "we could not look" are different
//! results.

mod lsof;
mod mock;
mod procfs;

pub use lsof::LsofInspector;
pub use mock::MockInspector;
pub use procfs::ProcfsInspector;

use std::path::Path;

use ops_common::Result;

/// Platform-neutral process inspection capability.
pub trait ProcessInspector {
    /// Pids of processes listening on the given TCP port, sorted and
    /// deduplicated. Empty means the port is genuinely free.
    fn listening_pids(&self, port: u16) -> Result<Vec<u32>>;

    /// Full command line of a process, arguments space-joined.
    fn cmdline(&self, pid: u32) -> Result<String>;
}

/// Select the inspector for this host. Decided once at startup.
pub fn detect_inspector() -> Box<dyn ProcessInspector> {
    if Path::new("/proc/net/tcp").exists() {
        Box::new(ProcfsInspector::new())
    } else {
        Box::new(LsofInspector::new())
    }
}
