//! Scripted inspector for tests.
//!
//! `listening_pids` answers from a scripted sequence (one entry per call,
//! the final state repeating once the script is exhausted), which makes
//! takeover loops deterministic without real sockets.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use ops_common::{Error, Result};

use super::ProcessInspector;

#[derive(Debug, Default)]
pub struct MockInspector {
    script: Mutex<VecDeque<Vec<u32>>>,
    steady: Mutex<Vec<u32>>,
    cmdlines: Mutex<HashMap<u32, String>>,
}

impl MockInspector {
    /// An inspector that always reports a free port.
    pub fn new() -> Self {
        MockInspector::default()
    }

    /// An inspector that always reports a single owner.
    pub fn with_owner(pid: u32, cmdline: impl Into<String>) -> Self {
        let mock = MockInspector::default();
        *mock.steady.lock().unwrap() = vec![pid];
        mock.set_cmdline(pid, cmdline);
        mock
    }

    /// Script successive `listening_pids` answers; `steady` repeats after.
    pub fn scripted(rounds: Vec<Vec<u32>>, steady: Vec<u32>) -> Self {
        let mock = MockInspector::default();
        *mock.script.lock().unwrap() = rounds.into();
        *mock.steady.lock().unwrap() = steady;
        mock
    }

    pub fn set_cmdline(&self, pid: u32, cmdline: impl Into<String>) {
        self.cmdlines.lock().unwrap().insert(pid, cmdline.into());
    }
}

impl ProcessInspector for MockInspector {
    fn listening_pids(&self, _port: u16) -> Result<Vec<u32>> {
        if let Some(round) = self.script.lock().unwrap().pop_front() {
            return Ok(round);
        }
        Ok(self.steady.lock().unwrap().clone())
    }

    fn cmdline(&self, pid: u32) -> Result<String> {
        self.cmdlines
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or(Error::ProcessNotFound { pid })
    }
}
