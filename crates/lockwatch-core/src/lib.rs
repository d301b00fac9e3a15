pub mod config;
pub mod error;
pub mod gateway;
pub mod key;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::WatchdogConfig;
pub use error::{Result, WatchdogError};
pub use gateway::KeyValueGateway;
pub use key::{LockKey, LockMetadata};
