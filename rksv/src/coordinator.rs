use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use libsupervisor::{ServiceSupervisor, Status};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use crate::registry::ServiceRegistry;

/// Signal that asks for a status dump.
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub fn status_signal() -> SignalKind {
    SignalKind::info()
}

#[cfg(not(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
pub fn status_signal() -> SignalKind {
    SignalKind::user_defined1()
}

/// Owns one supervisor per configured service and drives the selected ones.
pub struct Coordinator {
    supervisors: Vec<Arc<ServiceSupervisor>>,
}

impl Coordinator {
    /// Build a supervisor for every service in the registry. If one cannot be
    /// built, the ones built so far are exited and the error is returned.
    pub fn new(registry: &ServiceRegistry) -> Result<Self> {
        let mut supervisors = Vec::with_capacity(registry.services().len());
        for desc in registry.services() {
            match ServiceSupervisor::new(desc.clone()) {
                Ok(supervisor) => supervisors.push(Arc::new(supervisor)),
                Err(e) => {
                    supervisors.iter().for_each(|s| s.exit());
                    return Err(e).with_context(|| format!("{}: invalid service", desc.name));
                }
            }
        }
        Ok(Coordinator { supervisors })
    }

    pub fn from_supervisors(supervisors: Vec<ServiceSupervisor>) -> Self {
        Coordinator {
            supervisors: supervisors.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn supervisors(&self) -> &[Arc<ServiceSupervisor>] {
        &self.supervisors
    }

    fn selected(&self, selection: &[usize]) -> impl Iterator<Item = &Arc<ServiceSupervisor>> {
        selection.iter().filter_map(|&i| self.supervisors.get(i))
    }

    /// Start the selected services concurrently. A service that fails to
    /// start is logged and left alone; the others keep running.
    pub async fn start(&self, selection: &[usize]) {
        join_all(self.selected(selection).map(|supervisor| async move {
            if let Err(e) = supervisor.start().await {
                error!("{}: failed to start with error: {e}", supervisor.name());
            }
        }))
        .await;
    }

    /// Status of every configured service, selected or not.
    pub fn status_report(&self) -> Vec<(String, Status)> {
        self.supervisors
            .iter()
            .map(|s| (s.name().to_string(), s.status()))
            .collect()
    }

    pub fn dump_status(&self) {
        for (name, status) in self.status_report() {
            if status.active {
                info!("{name} {status}");
            } else {
                error!("{name} {status}");
            }
        }
    }

    /// Exit every service, selected or not.
    pub fn exit_all(&self) {
        self.supervisors.iter().for_each(|s| s.exit());
    }

    /// Wait until every task of the selected services has finished.
    pub async fn wait(&self, selection: &[usize]) {
        join_all(self.selected(selection).map(|s| s.wait())).await;
    }

    /// Start the selection, dump status on the status signal and shut
    /// everything down on SIGINT or SIGTERM.
    pub async fn run(&self, selection: &[usize]) -> Result<()> {
        let mut status = signal(status_signal()).context("failed to install status signal handler")?;
        let mut interrupt =
            signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

        // signals are served while slow 'before' commands are still running
        let started = self.start(selection);
        tokio::pin!(started);
        let mut starting = true;
        loop {
            tokio::select! {
                _ = &mut started, if starting => starting = false,
                _ = status.recv() => self.dump_status(),
                _ = interrupt.recv() => break,
                _ = terminate.recv() => break,
            }
        }

        warn!("shutting down...");
        self.exit_all();
        if starting {
            started.await;
        }
        self.wait(selection).await;
        Ok(())
    }

    pub async fn shutdown(&self, selection: &[usize]) {
        self.exit_all();
        self.wait(selection).await;
    }
}
