//! Infrastructure layer
//!
//! Runner configuration and logging setup.

mod config;
mod logging;

pub use config::{Config, ENV_LOG_LEVEL, ENV_ON_FAILURE, ENV_TIMEOUT};
pub use logging::init_logging;
