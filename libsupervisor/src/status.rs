use std::fmt;
use std::time::Duration;

/// Point-in-time view of one supervisor, for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub active: bool,
    pub state: String,
    pub pid: Option<i32>,
}

impl Status {
    pub fn not_started() -> Self {
        Status {
            active: false,
            state: "not running".to_string(),
            pid: None,
        }
    }

    /// `(1234)`, or `()` when no process was ever tracked.
    pub fn pid_label(&self) -> String {
        match self.pid {
            Some(pid) => format!("({pid})"),
            None => "()".to_string(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pid_label(), self.state)
    }
}

/// Round to whole seconds and render as `1h2m3s`, `4m5s` or `6s`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = (uptime.as_millis() + 500) / 1000;
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
