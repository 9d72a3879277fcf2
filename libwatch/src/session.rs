use std::time::Duration;

use common::WatchSpec;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::WatchError;
use crate::ignore::IgnoreList;
use crate::node::WatchSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    /// Time between two scans of every root.
    pub scan_interval: Duration,
    /// Quiet period after the last detected change before the action fires.
    pub settle: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        WatchTiming {
            scan_interval: Duration::from_secs(1),
            settle: Duration::from_secs(1),
        }
    }
}

/// Polls a [`WatchSet`] and runs an action once changes have settled.
///
/// # Example
/// ```ignore
/// let session = WatchSession::new("api", &spec)?;
/// let token = session.token();
/// tokio::spawn(session.run(|| println!("changed")));
/// // later
/// token.cancel();
/// ```
pub struct WatchSession {
    name: String,
    set: WatchSet,
    timing: WatchTiming,
    cancel: CancellationToken,
}

impl WatchSession {
    pub fn new<N: Into<String>>(name: N, spec: &WatchSpec) -> Result<Self, WatchError> {
        let roots = spec.roots();
        if roots.is_empty() {
            return Err(WatchError::NoPaths);
        }
        let ignore = IgnoreList::new(&spec.ignore)?;
        Ok(WatchSession {
            name: name.into(),
            set: WatchSet::new(roots, ignore),
            timing: WatchTiming::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_timing(mut self, timing: WatchTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Handle that stops the loop once cancelled.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the scan/settle loop until the session's token is cancelled.
    pub async fn run<F>(self, action: F)
    where
        F: Fn() + Send + 'static,
    {
        let WatchSession {
            name,
            set,
            timing,
            cancel,
        } = self;

        for root in set.roots() {
            info!("{name}: watching {}", root.path().display());
        }

        // the first scan only records what is already there
        let Some(mut set) = scan_blocking(set).await else {
            return;
        };
        set.reset();

        let mut ticker = interval_at(Instant::now() + timing.scan_interval, timing.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let settle = sleep(timing.settle);
        tokio::pin!(settle);
        let mut armed = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("{name}: watch stopped");
                    return;
                }
                _ = &mut settle, if armed => {
                    armed = false;
                    info!("{name}: watched files changed");
                    action();
                }
                _ = ticker.tick() => {
                    let Some(scanned) = scan_blocking(set).await else {
                        return;
                    };
                    set = scanned;
                    if set.has_changed() {
                        settle.as_mut().reset(Instant::now() + timing.settle);
                        armed = true;
                        set.reset();
                    }
                }
            }
        }
    }
}

/// Filesystem I/O runs on the blocking pool; the set is handed back afterwards.
async fn scan_blocking(mut set: WatchSet) -> Option<WatchSet> {
    match tokio::task::spawn_blocking(move || {
        set.scan();
        set
    })
    .await
    {
        Ok(set) => Some(set),
        Err(e) => {
            error!("watch scan task failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn fast() -> WatchTiming {
        WatchTiming {
            scan_interval: Duration::from_millis(100),
            settle: Duration::from_millis(300),
        }
    }

    fn counting() -> (Arc<AtomicUsize>, impl Fn() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_new_requires_paths() {
        assert!(matches!(
            WatchSession::new("svc", &WatchSpec::default()),
            Err(WatchError::NoPaths)
        ));
        let spec = WatchSpec {
            path: Some("src".into()),
            paths: vec![],
            ignore: vec!["[".to_string()],
        };
        // `[` is escaped, so it is a literal and compiles fine
        assert!(WatchSession::new("svc", &spec).is_ok());
    }

    #[tokio::test]
    async fn test_existing_files_do_not_fire() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), "1").unwrap();
        let spec = WatchSpec {
            path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let session = WatchSession::new("svc", &spec).unwrap().with_timing(fast());
        let token = session.token();
        let (count, action) = counting();
        let handle = tokio::spawn(session.run(action));

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_burst_fires_once_after_settle() {
        let dir = tempdir().unwrap();
        let spec = WatchSpec {
            path: Some(dir.path().to_path_buf()),
            ignore: vec!["**/*.tmp".to_string()],
            ..Default::default()
        };
        let session = WatchSession::new("svc", &spec).unwrap().with_timing(fast());
        let token = session.token();
        let (count, action) = counting();
        tokio::spawn(session.run(action));
        tokio::time::sleep(Duration::from_millis(200)).await;

        for i in 0..4 {
            fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        // still inside the settle window of the last write
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        fs::write(dir.path().join("scratch.tmp"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        token.cancel();
    }

    #[tokio::test]
    async fn test_cancel_before_settle_drops_pending_action() {
        let dir = tempdir().unwrap();
        let spec = WatchSpec {
            path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let timing = WatchTiming {
            scan_interval: Duration::from_millis(100),
            settle: Duration::from_secs(5),
        };
        let session = WatchSession::new("svc", &spec).unwrap().with_timing(timing);
        let token = session.token();
        let (count, action) = counting();
        let handle = tokio::spawn(session.run(action));
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(dir.path().join("a.txt"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
