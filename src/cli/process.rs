use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

/// Stops every other process started from `name`. Returns how many were stopped.
pub fn kill_previous_servers(name: &Path) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't find own process id: {e}"))?;
    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .is_some_and(|v| name == v)
        {
            info!("Stopping tracker {pid}");
            // A termination signal lets the tracker save. Windows has no such signal.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            killed += 1;
        }
    }
    Ok(killed)
}

/// Executable of the detaching daemon, placed next to the cli.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("activity-tracker-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

/// Stops trackers started through either executable.
pub fn stop_trackers() -> Result<usize> {
    let process_name = env::current_exe().context("Can't operate without an executable")?;
    let daemon_name = to_daemon_path(process_name.clone());
    Ok(kill_previous_servers(&process_name)? + kill_previous_servers(&daemon_name)?)
}

/// Shuts down previous trackers and starts a new one as a detached `serve` process with `args`.
pub fn restart_server(args: Vec<String>) -> Result<()> {
    let stopped = stop_trackers()?;
    if stopped > 0 {
        println!("Stopped {stopped} running tracker(s)");
    }

    let process_name = env::current_exe().context("Can't operate without an executable")?;
    let mut command = std::process::Command::new(process_name);
    command.arg("serve").args(args);

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdin(std::process::Stdio::null());
        command.stdout(std::process::Stdio::null());
        command.stderr(std::process::Stdio::null());
    }

    #[allow(clippy::zombie_processes)]
    let child = command.spawn().context("Failed to spawn tracker")?;
    println!("Started tracker {}", child.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::to_daemon_path;

    #[test]
    fn test_daemon_path_is_sibling() {
        let daemon = to_daemon_path(PathBuf::from("/opt/bin/activity-tracker"));
        #[cfg(not(windows))]
        assert_eq!(daemon, PathBuf::from("/opt/bin/activity-tracker-daemon"));
        #[cfg(windows)]
        assert_eq!(daemon, PathBuf::from("/opt/bin/activity-tracker-daemon.exe"));
    }
}
