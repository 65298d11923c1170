pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod security; // 访问控制核心

pub use config::{AccessConfig, ClientOverride, EdgeConfig};
pub use error::{AccessError, ConfigError};
pub use security::{
    AccessController, ClientLimits, ClientSnapshot, Limit, RecordOutcome, RequestClass, Sweeper,
};
