use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no paths to watch")]
    NoPaths,
}
