pub mod backoff;
pub mod command;
pub mod error;
pub mod process;
pub mod service;
pub mod status;

pub use backoff::Backoff;
pub use command::CommandLine;
pub use error::SupervisorError;
pub use process::ProcessSupervisor;
pub use service::ServiceSupervisor;
pub use status::Status;
