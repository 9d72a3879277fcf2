use libwatch::WatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("could not split command line {0:?}")]
    InvalidCommand(String),

    #[error("{service}: 'before' command could not be started: {source}")]
    SetupSpawn {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{service}: 'before' command failed with {status}")]
    SetupFailed { service: String, status: String },

    #[error(transparent)]
    Watch(#[from] WatchError),
}
