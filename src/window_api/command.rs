use std::{
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use tracing::{debug, instrument};

use crate::daemon::storage::entities::ActivityKey;

use super::WindowProbe;

/// Longest a probe program may run before it's killed and the sample counts as unknown.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Asks an external program for the foreground window. The program is expected to print the
/// title on stdout and exit successfully within `timeout`.
pub struct CommandProbe {
    program: &'static str,
    args: &'static [&'static str],
    timeout: Duration,
}

impl CommandProbe {
    pub fn xdotool() -> Self {
        Self {
            program: "xdotool",
            args: &["getactivewindow", "getwindowname"],
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn osascript() -> Self {
        Self {
            program: "osascript",
            args: &[
                "-e",
                "tell application \"System Events\" to get name of first application process whose frontmost is true",
            ],
            timeout: PROBE_TIMEOUT,
        }
    }

    #[instrument(skip(self), fields(program = self.program))]
    fn run(&self) -> Result<String> {
        let mut child = Command::new(self.program)
            .args(self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        while child.try_wait()?.is_none() {
            if Instant::now() >= deadline {
                child.kill()?;
                child.wait()?;
                return Err(anyhow!(
                    "{} didn't answer within {:?}",
                    self.program,
                    self.timeout
                ));
            }
            thread::sleep(POLL_INTERVAL);
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(anyhow!("{} exited with {}", self.program, output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

impl WindowProbe for CommandProbe {
    fn probe(&mut self) -> Option<ActivityKey> {
        match self.run() {
            Ok(title) => ActivityKey::new_opt(title),
            Err(e) => {
                debug!("Failed to get foreground window {e:?}");
                None
            }
        }
    }
}
