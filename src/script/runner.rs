//! Command runner: one external script call with a hard timeout.
//!
//! Every call spawns the script in its own process group so a timeout can
//! take down the script together with anything it forked (`sleep`,
//! `systemctl`, package managers). The child is always reaped before the
//! call returns.

use futures::future::BoxFuture;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::models::{script_display_name, ProcessOutcome, ProcessResult};

/// How long to wait for stdout/stderr to hit EOF once the script exited.
/// A script that backgrounds a daemon may leave the pipe open forever.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Seam between the engine and the operating system.
///
/// `Ok` covers every ordinary outcome, including missing scripts, launch
/// refusals and timeouts. `Err` is reserved for resource exhaustion (the
/// OS could not fork at all), which callers treat as a fault.
pub trait ScriptRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        path: &'a Path,
        args: Vec<String>,
        timeout: Duration,
    ) -> BoxFuture<'a, io::Result<ProcessResult>>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run scripts from `dir` instead of the panel's own working directory.
    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        ProcessRunner {
            working_dir: Some(dir.into()),
        }
    }
}

impl ScriptRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        path: &'a Path,
        args: Vec<String>,
        timeout: Duration,
    ) -> BoxFuture<'a, io::Result<ProcessResult>> {
        Box::pin(run_process(path, args, timeout, self.working_dir.as_deref()))
    }
}

async fn run_process(
    path: &Path,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<&Path>,
) -> io::Result<ProcessResult> {
    let name = script_display_name(path);

    if !path.exists() {
        log::warn!("[Runner] Script not found: {}", path.display());
        return Ok(ProcessResult::new(ProcessOutcome::NotFound));
    }

    let mut command = Command::new(path);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    command.process_group(0);

    log::debug!("[Runner] {} {} (timeout {}s)", name, args.join(" "), timeout.as_secs());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if is_resource_exhaustion(&e) => {
            log::error!("[Runner] Cannot fork for {}: {}", name, e);
            return Err(e);
        }
        Err(e) => {
            log::warn!("[Runner] Failed to launch {}: {}", name, e);
            return Ok(ProcessResult::new(ProcessOutcome::LaunchFailed(e.to_string())));
        }
    };

    let stdout_task = child.stdout.take().map(PipeCapture::spawn);
    let stderr_task = child.stderr.take().map(PipeCapture::spawn);

    let outcome = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => match status.code() {
            Some(code) => ProcessOutcome::Exited(code),
            None => ProcessOutcome::Signaled,
        },
        Ok(Err(e)) => {
            terminate(&mut child).await;
            ProcessOutcome::LaunchFailed(format!("failed to wait for process: {}", e))
        }
        Err(_) => {
            log::warn!("[Runner] {} exceeded {}s, killing process group", name, timeout.as_secs());
            terminate(&mut child).await;
            ProcessOutcome::TimedOut
        }
    };

    let stdout = collect_pipe(stdout_task).await;
    let stderr = collect_pipe(stderr_task).await;

    Ok(ProcessResult {
        outcome,
        stdout,
        stderr,
    })
}

/// Bytes read from one pipe so far. The buffer is shared with the reader
/// task so a pipe held open by a leftover grandchild still yields whatever
/// the script itself wrote.
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(pipe: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(read_pipe(pipe, Arc::clone(&buffer)));
        PipeCapture { buffer, task }
    }

    fn text(&self) -> String {
        let buf = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(mut pipe: R, buffer: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut buf = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                log::debug!("[Runner] pipe read error: {}", e);
                break;
            }
        }
    }
}

async fn collect_pipe(capture: Option<PipeCapture>) -> String {
    let Some(mut capture) = capture else {
        return String::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut capture.task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("[Runner] pipe reader task failed: {}", e),
        Err(_) => {
            log::debug!("[Runner] pipe still open after exit, keeping output read so far");
            capture.task.abort();
        }
    }
    capture.text()
}

/// Kill the child's whole process group and reap the child.
pub(crate) async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_process_group(pid);
    }
    if let Err(e) = child.start_kill() {
        log::debug!("[Runner] start_kill: {}", e);
    }
    if let Err(e) = child.wait().await {
        log::warn!("[Runner] failed to reap child: {}", e);
    }
}

#[cfg(unix)]
fn signal_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        log::debug!("[Runner] killpg({}) failed: {}", pid, e);
    }
}

/// Fork failures that mean the machine is out of processes, memory or
/// descriptors rather than that this particular script is broken.
pub(crate) fn is_resource_exhaustion(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EAGAIN) | Some(libc::ENOMEM) | Some(libc::EMFILE) | Some(libc::ENFILE)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}
