use ::common::ServiceDescriptor;
use nix::sys::signal;
use nix::unistd::Pid;
use std::time::Duration;
use tokio::time::{Instant, sleep};

pub fn service<N, R>(name: N, run: R) -> ServiceDescriptor
where
    N: Into<String>,
    R: Into<String>,
{
    let mut desc = ServiceDescriptor::new(name, run);
    desc.inherit_env = true;
    desc
}

/// Poll `cond` every 50ms until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    cond()
}

#[allow(dead_code)]
pub fn is_alive(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}
