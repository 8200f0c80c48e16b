//! Process lifecycle management for external commands
//!
//! Transfers and quantification run as child shells. If the stage is killed
//! while one of them runs, the child must not keep moving data on its own.
//!
//! - Children are spawned in their own process group with a parent-death signal
//! - Running children are tracked in a global registry
//! - On SIGINT/SIGTERM/SIGHUP every tracked group gets SIGTERM, then SIGKILL

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry of running child process groups
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Registered child process group {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process group {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// SIGTERM every tracked group, SIGKILL whatever outlives `grace_period`
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.pids.is_empty() {
            return;
        }
        info!("Terminating {} child process group(s)", self.pids.len());

        let pids: Vec<u32> = self.pids.drain().collect();
        for &pid in &pids {
            terminate_group(pid);
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if !pids.iter().any(|&pid| is_process_alive(pid)) {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        for &pid in pids.iter().filter(|&&pid| is_process_alive(pid)) {
            warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
            kill_group(pid);
        }
    }
}

/// Register `pid` with the global registry
pub fn track(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }
}

/// Remove `pid` from the global registry
pub fn untrack(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
}

/// Send SIGTERM to the process group led by `pgid`, falling back to the
/// leader alone when the group is already gone
pub fn terminate_group(pgid: u32) {
    if signal::kill(Pid::from_raw(-(pgid as i32)), Signal::SIGTERM).is_err() {
        let _ = signal::kill(Pid::from_raw(pgid as i32), Signal::SIGTERM);
    }
}

/// Send SIGKILL to the process group led by `pgid`
pub fn kill_group(pgid: u32) {
    if signal::kill(Pid::from_raw(-(pgid as i32)), Signal::SIGKILL).is_err() {
        let _ = signal::kill(Pid::from_raw(pgid as i32), Signal::SIGKILL);
    }
}

/// Check if a process is still running (zombies count as dead)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    // Field 3 of /proc/<pid>/stat is the state
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !matches!(stat.split_whitespace().nth(2), Some("Z" | "X")),
        Err(_) => true,
    }
}

/// Install handlers that clean up children on SIGINT, SIGTERM and SIGHUP.
///
/// The process exits with `128 + signal` once children are gone.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping child processes", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe setpgid and prctl
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::from)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
