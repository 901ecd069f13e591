//! Linux inspector backed by /proc.
//!
//! Listening pids are found in two steps: collect the socket inodes of
//! LISTEN entries for the port from /proc/net/tcp{,6}, then walk
//! /proc/[pid]/fd looking for "socket:[inode]" links. Command lines come
//! from /proc/[pid]/cmdline (NUL-separated, space-joined).

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;

use ops_common::{Error, Result};

use super::ProcessInspector;

/// TCP state hex code for LISTEN in /proc/net/tcp.
const TCP_LISTEN: u8 = 0x0A;

#[derive(Debug, Default)]
pub struct ProcfsInspector;

impl ProcfsInspector {
    pub fn new() -> Self {
        ProcfsInspector
    }
}

impl ProcessInspector for ProcfsInspector {
    fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        let tcp = fs::read_to_string("/proc/net/tcp")
            .map_err(|err| Error::InspectUnavailable(format!("/proc/net/tcp: {}", err)))?;

        let mut inodes: HashSet<u64> = listen_inodes(&tcp, port).into_iter().collect();
        // tcp6 covers dual-stack listeners; absence is not an error.
        if let Ok(tcp6) = fs::read_to_string("/proc/net/tcp6") {
            inodes.extend(listen_inodes(&tcp6, port));
        }
        if inodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut pids = BTreeSet::new();
        let entries = fs::read_dir("/proc")
            .map_err(|err| Error::InspectUnavailable(format!("/proc: {}", err)))?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Ok(pid) = name.to_string_lossy().parse::<u32>() else {
                continue;
            };
            if socket_inodes_of(pid).iter().any(|inode| inodes.contains(inode)) {
                pids.insert(pid);
            }
        }

        Ok(pids.into_iter().collect())
    }

    fn cmdline(&self, pid: u32) -> Result<String> {
        let raw = fs::read(format!("/proc/{}/cmdline", pid)).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Error::ProcessNotFound { pid }
            } else {
                Error::InspectFailed(format!("/proc/{}/cmdline: {}", pid, err))
            }
        })?;

        let joined = raw
            .split(|byte| *byte == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        if !joined.is_empty() {
            return Ok(joined);
        }

        // Kernel threads and zombies have an empty cmdline; fall back to comm.
        let comm = fs::read_to_string(format!("/proc/{}/comm", pid)).unwrap_or_default();
        Ok(comm.trim().to_string())
    }
}

/// Socket inodes held open by a pid. Unreadable fd directories (permission,
/// exited process) yield an empty set; the caller treats that pid as not
/// owning the port.
fn socket_inodes_of(pid: u32) -> HashSet<u64> {
    let mut inodes = HashSet::new();
    let Ok(entries) = fs::read_dir(format!("/proc/{}/fd", pid)) else {
        return inodes;
    };
    for entry in entries.flatten() {
        if let Ok(target) = fs::read_link(entry.path()) {
            let target = target.to_string_lossy();
            // Socket links look like "socket:[12345]"
            if let Some(inode) = target
                .strip_prefix("socket:[")
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse::<u64>().ok())
            {
                inodes.insert(inode);
            }
        }
    }
    inodes
}

/// Socket inodes of LISTEN entries for `port` in /proc/net/tcp{,6} content.
pub fn listen_inodes(content: &str, port: u16) -> Vec<u64> {
    let mut inodes = Vec::new();

    for line in content.lines().skip(1) {
        // Format: sl local_address rem_address st tx:rx tr:tm->when retrnsmt uid timeout inode
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let state = u8::from_str_radix(parts[3], 16).unwrap_or(0);
        if state != TCP_LISTEN {
            continue;
        }

        let Some(local_port) = parts[1]
            .rsplit(':')
            .next()
            .and_then(|hex| u16::from_str_radix(hex, 16).ok())
        else {
            continue;
        };
        if local_port != port {
            continue;
        }

        if let Ok(inode) = parts[9].parse::<u64>() {
            inodes.push(inode);
        }
    }

    inodes
}
