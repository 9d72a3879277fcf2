pub mod config;
pub mod coordinator;
pub mod placeholder;
pub mod registry;

pub use config::{ConfigError, ServiceConfig};
pub use coordinator::Coordinator;
pub use registry::{SelectError, ServiceRegistry};
