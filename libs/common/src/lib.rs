//! Shared service plumbing for the register bridge services
//!
//! Provides the pieces every service binary needs:
//! - logging bootstrap (console plus daily file)
//! - layered configuration loading
//! - graceful shutdown signal handling

pub mod config_loader;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use config_loader::{load_config, load_config_with_env};
pub use error::{CommonError, Result};
pub use logging::{init_with_config, LogConfig};
pub use shutdown::{shutdown_token, wait_for_shutdown};
