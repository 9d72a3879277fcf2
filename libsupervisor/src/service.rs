use std::sync::Arc;

use common::ServiceDescriptor;
use libwatch::{WatchSession, WatchTiming};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::error::SupervisorError;
use crate::process::ProcessSupervisor;
use crate::status::Status;

/// One configured service: its process supervisor plus an optional watch
/// session that restarts the process when watched files change.
pub struct ServiceSupervisor {
    desc: Arc<ServiceDescriptor>,
    process: ProcessSupervisor,
    /// Taken by `start`; a session runs at most once.
    watch: Mutex<Option<WatchSession>>,
    watch_token: Option<CancellationToken>,
}

impl ServiceSupervisor {
    /// Fails when the watch configuration is unusable, e.g. a bad ignore pattern.
    pub fn new(desc: ServiceDescriptor) -> Result<Self, SupervisorError> {
        let desc = Arc::new(desc);
        let watch = match &desc.watch {
            Some(spec) => Some(WatchSession::new(desc.name.clone(), spec)?),
            None => None,
        };
        let watch_token = watch.as_ref().map(WatchSession::token);
        let process = ProcessSupervisor::with_tracker(desc.clone(), TaskTracker::new());
        Ok(ServiceSupervisor {
            desc,
            process,
            watch: Mutex::new(watch),
            watch_token,
        })
    }

    pub fn with_watch_timing(mut self, timing: WatchTiming) -> Self {
        let watch = self.watch.get_mut();
        *watch = watch.take().map(|w| w.with_timing(timing));
        self
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.desc
    }

    pub fn process(&self) -> &ProcessSupervisor {
        &self.process
    }

    pub fn is_watched(&self) -> bool {
        self.watch_token.is_some()
    }

    /// Start the process, then the watch session if one is configured.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.process.start().await?;
        if self.process.is_exited() {
            return Ok(());
        }

        let Some(session) = self.watch.lock().take() else {
            return Ok(());
        };
        let process = self.process.clone();
        self.process
            .tracker()
            .spawn(session.run(move || process.restart()));
        debug!("{}: watch session started", self.name());
        Ok(())
    }

    pub fn restart(&self) {
        self.process.restart();
    }

    /// Stop watching, then exit the process. Terminal.
    pub fn exit(&self) {
        if let Some(token) = &self.watch_token {
            token.cancel();
        }
        self.process.exit();
    }

    pub fn status(&self) -> Status {
        self.process.status()
    }

    pub async fn wait(&self) {
        self.process.wait().await;
    }
}
