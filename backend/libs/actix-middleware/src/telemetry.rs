//! Global tracing subscriber shared by every binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,actix_web=info,sqlx=warn";

/// Installs the subscriber once per process. `RUST_LOG` overrides
/// [`DEFAULT_FILTER`]; `log_format = Some("json")` switches to JSON lines.
pub fn init_tracing(log_format: Option<&str>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format.is_some_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}
