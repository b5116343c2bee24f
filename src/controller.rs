//! Stopping and starting the external controller process.
use crate::config::DedupConfig;
use crate::error::{DedupError, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on how long `stop` waits for signalled instances to exit.
const EXIT_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Linux keeps the first 15 bytes of a process name, and `pkill -x` /
/// `pgrep -x` match against that truncated name.
#[cfg(target_os = "linux")]
const PROCESS_NAME_MAX_BYTES: usize = 15;
#[cfg(all(not(windows), not(target_os = "linux")))]
const PROCESS_NAME_MAX_BYTES: usize = usize::MAX;

/// Lifecycle hooks around a cleanup run.
pub trait Controller {
    fn stop(&mut self) -> Result<()>;
    fn start(&mut self) -> Result<()>;
}

/// Controls the real controller through platform process tools.
#[derive(Debug, Clone)]
pub struct ProcessController {
    executable: PathBuf,
    image: String,
    grace_period: Duration,
}

impl ProcessController {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            executable: config.controller_exe.clone(),
            image: config.controller_image.clone(),
            grace_period: config.grace_period,
        }
    }

    fn settle(&self, action: &str) {
        tracing::debug!(
            action,
            grace_ms = self.grace_period.as_millis() as u64,
            "waiting for controller"
        );
        thread::sleep(self.grace_period);
    }

    /// Poll until no process with the controller image is left.
    fn wait_for_exit(&self) -> Result<()> {
        let deadline = Instant::now() + EXIT_TIMEOUT;
        while is_running(&self.image)? {
            if Instant::now() >= deadline {
                return Err(controller_error(
                    "stop",
                    format!(
                        "{} still running {}s after being signalled",
                        self.image,
                        EXIT_TIMEOUT.as_secs()
                    ),
                ));
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        Ok(())
    }
}

impl Controller for ProcessController {
    fn stop(&mut self) -> Result<()> {
        let start = Instant::now();
        let output = kill_command(&self.image)?
            .stdin(Stdio::null())
            .output()
            .map_err(|err| controller_error("stop", err.to_string()))?;
        if !output.status.success() && !no_matching_process(output.status.code()) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => format!("status {}", output.status),
                line => line.to_string(),
            };
            return Err(controller_error("stop", detail));
        }
        self.wait_for_exit()?;
        tracing::info!(
            image = %self.image,
            was_running = output.status.success(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "controller stopped"
        );
        self.settle("stop");
        Ok(())
    }

    // The detached child is reaped by init once this process exits.
    #[allow(clippy::zombie_processes)]
    fn start(&mut self) -> Result<()> {
        let mut command = Command::new(&self.executable);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);
        let child = command.spawn().map_err(|err| {
            controller_error(
                "start",
                format!("spawn {}: {err}", self.executable.display()),
            )
        })?;
        tracing::info!(
            executable = %self.executable.display(),
            pid = child.id(),
            "controller started"
        );
        self.settle("start");
        Ok(())
    }
}

fn controller_error(action: &'static str, reason: String) -> DedupError {
    DedupError::Controller { action, reason }
}

fn locate(tool: &str) -> Result<PathBuf> {
    which::which(tool).map_err(|err| controller_error("stop", format!("locate {tool}: {err}")))
}

#[cfg(windows)]
fn kill_command(image: &str) -> Result<Command> {
    let mut command = Command::new(locate("taskkill")?);
    command.args(["/F", "/IM", image]);
    Ok(command)
}

#[cfg(not(windows))]
fn kill_command(image: &str) -> Result<Command> {
    let mut command = Command::new(locate("pkill")?);
    command.arg("-x").arg(process_pattern(image));
    Ok(command)
}

#[cfg(windows)]
fn is_running(image: &str) -> Result<bool> {
    let output = Command::new(locate("tasklist")?)
        .args(["/FI", &format!("IMAGENAME eq {image}"), "/NH"])
        .stdin(Stdio::null())
        .output()
        .map_err(|err| controller_error("stop", format!("tasklist: {err}")))?;
    let listing = String::from_utf8_lossy(&output.stdout).to_ascii_lowercase();
    Ok(listing.contains(&image.to_ascii_lowercase()))
}

#[cfg(not(windows))]
fn is_running(image: &str) -> Result<bool> {
    let status = Command::new(locate("pgrep")?)
        .arg("-x")
        .arg(process_pattern(image))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| controller_error("stop", format!("pgrep: {err}")))?;
    match status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(controller_error("stop", format!("pgrep failed: {status}"))),
    }
}

/// Anchored pattern for `pkill -x` / `pgrep -x`: the image name as the kernel
/// stores it, with extended-regex metacharacters escaped.
#[cfg(not(windows))]
fn process_pattern(image: &str) -> String {
    let mut end = image.len().min(PROCESS_NAME_MAX_BYTES);
    while !image.is_char_boundary(end) {
        end -= 1;
    }
    let mut pattern = String::with_capacity(end);
    for ch in image[..end].chars() {
        if ".[]()*+?{}|^$\\".contains(ch) {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern
}

/// Exit code the kill tool uses when nothing matched the image name.
#[cfg(windows)]
fn no_matching_process(code: Option<i32>) -> bool {
    code == Some(128)
}

#[cfg(not(windows))]
fn no_matching_process(code: Option<i32>) -> bool {
    code == Some(1)
}

/// Run the controller in its own session so it outlives this process.
#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}
