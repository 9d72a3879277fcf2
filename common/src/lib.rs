use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod pidfile;

pub use pidfile::SERVICE_NAME_ENV;

/// Routing value that attaches a child stream to the supervisor's own stream.
pub const ROUTE_OS: &str = "os";

/// Fully resolved description of one supervised service.
///
/// Inheritance and placeholder substitution have already been applied by the
/// time a descriptor reaches the supervisor; nothing here is re-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// One-shot command run to completion before `run` is launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default)]
    pub run: String,
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub env: Vec<EnvEntry>,
    #[serde(default)]
    pub output: OutputRouting,
    #[serde(default)]
    pub inherit_env: bool,
    /// Do not restart: the service becomes terminal after its current exit.
    #[serde(default)]
    pub dnr: bool,
    #[serde(default)]
    pub skip: bool,
    /// Pause after each exit before respawning, in milliseconds.
    #[serde(default)]
    pub sleep: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchSpec>,
}

pub fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

impl ServiceDescriptor {
    pub fn new<N: Into<String>, R: Into<String>>(name: N, run: R) -> Self {
        ServiceDescriptor {
            name: name.into(),
            tags: vec![],
            before: None,
            run: run.into(),
            dir: default_dir(),
            env: vec![],
            output: OutputRouting::default(),
            inherit_env: false,
            dnr: false,
            skip: false,
            sleep: 0,
            watch: None,
        }
    }
}

/// One environment entry. A missing value means "copy it from the supervisor's environment".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl EnvEntry {
    pub fn literal<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        EnvEntry {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn passthrough<N: Into<String>>(name: N) -> Self {
        EnvEntry {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRouting {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub stdin: String,
}

impl OutputRouting {
    pub fn stdout_attached(&self) -> bool {
        self.stdout == ROUTE_OS
    }

    pub fn stderr_attached(&self) -> bool {
        self.stderr == ROUTE_OS
    }

    pub fn stdin_attached(&self) -> bool {
        self.stdin == ROUTE_OS
    }
}

/// Paths to watch for changes plus glob patterns to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl WatchSpec {
    /// All watched roots, the single `path` first.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.path
            .iter()
            .chain(self.paths.iter())
            .cloned()
            .collect()
    }
}
