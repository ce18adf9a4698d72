use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_INIT: Once = Once::new();

/// Log level used when neither `RUST_LOG` nor an explicit value is given.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Initialize the tracing subscriber once for the whole process.
///
/// `RUST_LOG` always wins. Otherwise `default_value` is used, falling back to
/// [`DEFAULT_LOG_LEVEL`]. Later calls are no-ops so every test may call it.
///
/// # Panics
///
/// Will panic if another global tracing subscriber was already installed
pub fn log_init(default_value: Option<&str>) {
    LOG_INIT.call_once(|| {
        if std::env::var("RUST_BACKTRACE").is_err() {
            #[expect(unsafe_code)]
            unsafe {
                std::env::set_var("RUST_BACKTRACE", "1");
            }
        }

        if std::env::var("RUST_LOG").is_err() {
            #[expect(unsafe_code)]
            unsafe {
                std::env::set_var("RUST_LOG", default_value.unwrap_or(DEFAULT_LOG_LEVEL));
            }
        }

        tracing_setup();
    });
}

/// Logs go to stderr: stdout carries the command results.
fn tracing_setup() {
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .compact();

    let (filter, _reload_handle) =
        tracing_subscriber::reload::Layer::new(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}

#[cfg(test)]
mod tests {
    use tracing::info;

    use super::log_init;

    #[test]
    fn log_init_is_idempotent() {
        log_init(None);
        log_init(Some("debug"));
        info!("logger initialized twice without panicking");
    }
}
