//! Fallback inspector built on external tools (`lsof`, `ps`).
//!
//! Used on hosts without a readable /proc (macOS, some containers). Tool
//! invocations are bounded: output is drained on a helper thread and the
//! child is killed if it outlives the deadline.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use ops_common::{Error, Result};

use super::ProcessInspector;

const TOOL_TIMEOUT: Duration = Duration::from_secs(5);
const TOOL_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct LsofInspector;

impl LsofInspector {
    pub fn new() -> Self {
        LsofInspector
    }
}

impl ProcessInspector for LsofInspector {
    fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        // lsof exits non-zero when nothing matches; that is a free port.
        let output = run_tool(
            "lsof",
            &["-ti", &format!("tcp:{}", port), "-sTCP:LISTEN"],
            TOOL_TIMEOUT,
        )?;

        let mut pids: Vec<u32> = output
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect();
        pids.sort_unstable();
        pids.dedup();
        Ok(pids)
    }

    fn cmdline(&self, pid: u32) -> Result<String> {
        let output = run_tool("ps", &["-o", "command=", "-p", &pid.to_string()], TOOL_TIMEOUT)?;
        let cmdline = output.trim();
        if cmdline.is_empty() {
            return Err(Error::ProcessNotFound { pid });
        }
        Ok(cmdline.to_string())
    }
}

/// Run an external tool and capture stdout, killing it at the deadline.
fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| Error::InspectUnavailable(format!("{}: {}", program, err)))?;

    // Drain stdout on a helper thread so a chatty child cannot block on a
    // full pipe before we reap it.
    let stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut stdout) = stdout {
            let _ = stdout.read_to_string(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_status)) => break,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::InspectFailed(format!(
                        "{} timed out after {:?}",
                        program, timeout
                    )));
                }
                thread::sleep(TOOL_POLL);
            }
            Err(err) => return Err(Error::InspectFailed(err.to_string())),
        }
    }

    Ok(reader.join().unwrap_or_default())
}
