pub mod error;
pub mod ignore;
pub mod node;
pub mod session;

pub use error::WatchError;
pub use ignore::IgnoreList;
pub use node::{ChangeNode, WatchSet};
pub use session::{WatchSession, WatchTiming};
