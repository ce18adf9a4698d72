mod log_utils;

pub use log_utils::{DEFAULT_LOG_LEVEL, log_init};
pub use tracing::{debug, error, info, trace, warn};

pub mod reexport {
    pub use tracing;
    pub use tracing_subscriber;
}
