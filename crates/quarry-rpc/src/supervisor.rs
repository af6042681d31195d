// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracks every plugin worker process so none outlives the host.
//!
//! On unix each child leads its own process group, so killing the group also
//! takes down anything the plugin spawned. All groups are killed on
//! [`ProcessSupervisor::kill_all`] and when the supervisor is dropped; children
//! are additionally spawned with `kill_on_drop`.
//!
//! None of that runs when the host aborts or is killed outright. On Linux each
//! child therefore also asks the kernel for `SIGKILL` when its parent dies.
//! The kernel ties that to the spawning thread, which is always a runtime
//! thread living as long as the host.

use dashmap::DashMap;
use quarry_core::{PluginId, QuarryError};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    groups: DashMap<u32, PluginId>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `command` in a fresh process group and starts tracking it.
    pub fn spawn(&self, plugin: &PluginId, command: &mut Command) -> Result<Child, QuarryError> {
        #[cfg(unix)]
        command.process_group(0);
        #[cfg(target_os = "linux")]
        die_with_host(command);
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            QuarryError::transport_with(plugin, format!("failed to start plugin process: {e}"), e)
        })?;
        if let Some(pid) = child.id() {
            debug!(plugin = %plugin, pid, "plugin process started");
            self.groups.insert(pid, plugin.clone());
        }
        Ok(child)
    }

    /// Stops tracking a process that exited on its own.
    pub fn release(&self, pid: u32) {
        self.groups.remove(&pid);
    }

    /// Kills a child's process group, then the child itself, and waits for it to exit.
    pub async fn terminate(&self, child: &mut Child) {
        if let Some(pid) = child.id() {
            kill_group(pid);
            self.release(pid);
        }
        if let Err(e) = child.kill().await {
            debug!(error = %e, "plugin process already gone");
        }
    }

    /// Number of tracked live processes.
    pub fn live(&self) -> usize {
        self.groups.len()
    }

    /// Tracked process ids belonging to one plugin.
    pub fn pids_of(&self, plugin: &PluginId) -> Vec<u32> {
        self.groups
            .iter()
            .filter(|entry| entry.value() == plugin)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Kills every tracked process group.
    pub fn kill_all(&self) {
        let pids: Vec<u32> = self.groups.iter().map(|entry| *entry.key()).collect();
        for pid in pids {
            if let Some((_, plugin)) = self.groups.remove(&pid) {
                debug!(plugin = %plugin, pid, "killing plugin process group");
                kill_group(pid);
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if !self.groups.is_empty() {
            warn!(count = self.groups.len(), "killing plugin processes left running");
            self.kill_all();
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; a stale group id only yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

#[cfg(target_os = "linux")]
fn die_with_host(command: &mut Command) {
    let host = std::process::id() as libc::pid_t;
    // SAFETY: the hook runs between fork and exec and only calls
    // async-signal-safe functions.
    unsafe {
        command.pre_exec(move || {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong, 0, 0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            // The host died before the request took effect.
            if libc::getppid() != host {
                libc::_exit(1);
            }
            Ok(())
        });
    }
}
