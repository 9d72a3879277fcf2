use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use common::{ServiceDescriptor, pidfile};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::command::CommandLine;
use crate::error::SupervisorError;
use crate::status::{Status, format_uptime};

/// How often a process announced through the pid file is checked once the
/// spawned process itself has exited.
const HANDOVER_POLL: Duration = Duration::from_millis(200);

/// How one run of the main command ended.
#[derive(Debug)]
pub enum ExitOutcome {
    Exited(ExitStatus),
    WaitFailed(io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Clean exit, our own SIGKILL, or a process somebody else already reaped.
    Expected,
    Failed,
    WaitError,
}

impl ExitOutcome {
    pub fn kind(&self) -> ExitKind {
        match self {
            ExitOutcome::Exited(status) if status.success() => ExitKind::Expected,
            ExitOutcome::Exited(status) if status.signal() == Some(Signal::SIGKILL as i32) => {
                ExitKind::Expected
            }
            ExitOutcome::Exited(_) => ExitKind::Failed,
            ExitOutcome::WaitFailed(e) if e.raw_os_error() == Some(Errno::ECHILD as i32) => {
                ExitKind::Expected
            }
            ExitOutcome::WaitFailed(_) => ExitKind::WaitError,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ExitOutcome::Exited(status) => status.to_string(),
            ExitOutcome::WaitFailed(e) => e.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct RuntimeState {
    /// Cancels the command currently being waited on.
    cancel: Option<CancellationToken>,
    started_at: Option<Instant>,
    last_state: String,
    backoff: Backoff,
    pid: Option<i32>,
    running: bool,
    spawns: u64,
}

struct Inner {
    desc: Arc<ServiceDescriptor>,
    tracker: TaskTracker,
    dnr: AtomicBool,
    /// Cancelled once by [`ProcessSupervisor::exit`]; never reset.
    exited: CancellationToken,
    state: Mutex<RuntimeState>,
}

/// Owns the lifecycle of one service's main command.
///
/// The supervising loop spawns the command, waits for it to exit and spawns it
/// again unless the service is marked do-not-restart. `restart` and `exit` only
/// ever stop the current process; bringing it back is the loop's job.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn new(desc: Arc<ServiceDescriptor>) -> Self {
        Self::with_tracker(desc, TaskTracker::new())
    }

    /// Every task of this supervisor is spawned on `tracker`.
    pub fn with_tracker(desc: Arc<ServiceDescriptor>, tracker: TaskTracker) -> Self {
        let dnr = AtomicBool::new(desc.dnr);
        ProcessSupervisor {
            inner: Arc::new(Inner {
                desc,
                tracker,
                dnr,
                exited: CancellationToken::new(),
                state: Mutex::new(RuntimeState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.desc.name
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    pub fn is_dnr(&self) -> bool {
        self.inner.dnr.load(Ordering::SeqCst)
    }

    pub fn is_exited(&self) -> bool {
        self.inner.exited.is_cancelled()
    }

    /// Currently tracked pid, kept after exit for display.
    pub fn pid(&self) -> Option<i32> {
        self.inner.state.lock().pid
    }

    /// Number of successful spawns of the main command so far.
    pub fn spawns(&self) -> u64 {
        self.inner.state.lock().spawns
    }

    pub fn backoff(&self) -> Backoff {
        self.inner.state.lock().backoff
    }

    /// Run the `before` command to completion, then hand the main command to
    /// the supervising loop. A failing `before` command aborts the start.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let name = self.name();
        if self.is_exited() {
            warn!("{name}: already exited, not starting");
            return Ok(());
        }
        info!("{name}: starting");

        let line = CommandLine::parse(&self.inner.desc.run)?;
        if let Some(before) = self.inner.desc.before.as_deref()
            && !before.trim().is_empty()
        {
            self.run_setup(before).await?;
        }

        let this = self.clone();
        self.inner.tracker.spawn(this.supervise(line));
        Ok(())
    }

    async fn run_setup(&self, before: &str) -> Result<(), SupervisorError> {
        let desc = &self.inner.desc;
        let line = CommandLine::parse(before)?;
        let token = CancellationToken::new();
        self.inner.state.lock().cancel = Some(token.clone());

        let mut child =
            line.command(desc)
                .spawn()
                .map_err(|source| SupervisorError::SetupSpawn {
                    service: desc.name.clone(),
                    source,
                })?;
        let status = tokio::select! {
            status = child.wait() => status,
            _ = token.cancelled() => {
                let _ = child.start_kill();
                child.wait().await
            }
            _ = self.inner.exited.cancelled() => {
                let _ = child.start_kill();
                child.wait().await
            }
        };
        self.inner.state.lock().cancel = None;

        match status {
            Ok(status) if status.success() => {
                debug!("{}: 'before' command finished", desc.name);
                Ok(())
            }
            Ok(status) => Err(SupervisorError::SetupFailed {
                service: desc.name.clone(),
                status: status.to_string(),
            }),
            Err(e) => Err(SupervisorError::SetupFailed {
                service: desc.name.clone(),
                status: e.to_string(),
            }),
        }
    }

    async fn supervise(self, line: CommandLine) {
        let desc = self.inner.desc.clone();
        let name = desc.name.as_str();

        while !self.is_exited() {
            let token = CancellationToken::new();
            {
                let mut state = self.inner.state.lock();
                // exit() cancels `exited` before stop() takes this lock
                if self.is_exited() {
                    break;
                }
                state.cancel = Some(token.clone());
                state.started_at = Some(Instant::now());
            }

            let child = match line.command(&desc).spawn() {
                Ok(child) => child,
                Err(e) => {
                    token.cancel();
                    error!("{name}: command failed with error: {e}");
                    self.inner.state.lock().last_state = e.to_string();
                    if self.is_dnr() {
                        break;
                    }
                    let delay = self.inner.state.lock().backoff.next_delay();
                    debug!("{name}: next attempt in {}s", delay.as_secs());
                    if !self.pause(delay).await {
                        break;
                    }
                    continue;
                }
            };

            let spawned = child.id().and_then(|pid| i32::try_from(pid).ok());
            let pid = pidfile::read_pid(&desc.dir, name).or(spawned);
            {
                let mut state = self.inner.state.lock();
                state.backoff.reset();
                state.pid = pid;
                state.running = true;
                state.spawns += 1;
            }
            match pid {
                Some(pid) => info!("{name}: running (pid:{pid})"),
                None => info!("{name}: running"),
            }

            let waiter = self
                .inner
                .tracker
                .spawn(self.clone().wait_for_exit(child, token, spawned));
            let outcome = match waiter.await {
                Ok(outcome) => outcome,
                Err(e) => ExitOutcome::WaitFailed(io::Error::other(e)),
            };
            self.record_exit(&outcome);

            if self.is_dnr() {
                break;
            }
            if desc.sleep > 0 && !self.pause(Duration::from_millis(desc.sleep)).await {
                break;
            }
        }
        debug!("{name}: supervising loop finished");
    }

    async fn wait_for_exit(
        self,
        mut child: Child,
        token: CancellationToken,
        spawned: Option<i32>,
    ) -> ExitOutcome {
        let exited = self.inner.exited.clone();
        let status = tokio::select! {
            status = child.wait() => status,
            _ = token.cancelled() => {
                if let Err(e) = child.start_kill() {
                    debug!("{}: failed to kill spawned process: {e}", self.name());
                }
                child.wait().await
            }
            _ = exited.cancelled() => {
                token.cancel();
                if let Err(e) = child.start_kill() {
                    debug!("{}: failed to kill spawned process: {e}", self.name());
                }
                child.wait().await
            }
        };
        if !token.is_cancelled() {
            self.follow_handover(spawned, &token).await;
        }
        match status {
            Ok(status) => ExitOutcome::Exited(status),
            Err(e) => ExitOutcome::WaitFailed(e),
        }
    }

    /// The spawned process may have handed over to another process announced in
    /// the pid file; that process has to be gone before a respawn.
    async fn follow_handover(&self, spawned: Option<i32>, token: &CancellationToken) {
        let desc = &self.inner.desc;
        let Some(pid) = pidfile::read_pid(&desc.dir, &desc.name).or_else(|| self.pid()) else {
            return;
        };
        if Some(pid) == spawned {
            return;
        }
        self.inner.state.lock().pid = Some(pid);
        info!("{}: following pid {pid} from pid file", desc.name);
        while is_alive(pid) {
            tokio::select! {
                _ = sleep(HANDOVER_POLL) => {}
                _ = token.cancelled() => break,
            }
        }
    }

    fn record_exit(&self, outcome: &ExitOutcome) {
        let name = self.name();
        match outcome.kind() {
            ExitKind::Expected => info!("{name}: ended ({})", outcome.describe()),
            ExitKind::Failed => error!("{name}: ended with error: {}", outcome.describe()),
            ExitKind::WaitError => {
                error!("{name}: error waiting for process: {}", outcome.describe())
            }
        }
        let mut state = self.inner.state.lock();
        state.running = false;
        state.cancel = None;
        state.last_state = outcome.describe();
    }

    /// Sleep unless the supervisor is exited first. Returns false on exit.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = sleep(delay) => true,
            _ = self.inner.exited.cancelled() => false,
        }
    }

    /// Non-blocking, best-effort view of the tracked process.
    pub fn status(&self) -> Status {
        let state = self.inner.state.lock();
        let Some(pid) = state.pid else {
            let mut status = Status::not_started();
            if !state.last_state.is_empty() {
                status.state = state.last_state.clone();
            }
            return status;
        };

        let liveness = if state.running {
            signal::kill(Pid::from_raw(pid), None)
        } else {
            Err(Errno::ESRCH)
        };
        match liveness {
            Ok(()) => {
                let uptime = state.started_at.map(|t| t.elapsed()).unwrap_or_default();
                Status {
                    active: true,
                    state: format!("OK {}", format_uptime(uptime)),
                    pid: Some(pid),
                }
            }
            Err(errno) => Status {
                active: false,
                state: if state.last_state.is_empty() {
                    errno.desc().to_string()
                } else {
                    state.last_state.clone()
                },
                pid: Some(pid),
            },
        }
    }

    /// Cancel the current command and kill the tracked process.
    fn stop(&self) {
        let name = self.name();
        let (cancel, pid, running) = {
            let state = self.inner.state.lock();
            (state.cancel.clone(), state.pid, state.running)
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if !running {
            return;
        }
        if let Some(pid) = pid {
            match signal::kill(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) => debug!("{name}: sent SIGKILL to {pid}"),
                Err(Errno::ESRCH) => debug!("{name}: process {pid} is already gone"),
                Err(e) => error!("{name}: failed to kill process {pid}: {e}"),
            }
        }
    }

    /// Stop the current process and let the supervising loop bring it back.
    pub fn restart(&self) {
        info!("{}: restarting", self.name());
        self.stop();
    }

    /// Mark do-not-restart and stop the current process. Terminal.
    pub fn exit(&self) {
        self.inner.dnr.store(true, Ordering::SeqCst);
        info!("{}: exiting", self.name());
        self.inner.exited.cancel();
        self.stop();
    }

    /// Wait until every task spawned for this service has finished.
    pub async fn wait(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("{}: finished", self.name());
    }
}

/// An orphan may linger as a zombie when nothing reaps it; treat that as gone.
fn is_alive(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok() && !is_zombie(pid)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: i32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: i32) -> bool {
    false
}
