//! A2: process-wide logging initialization.
//!
//! An `EnvFilter` sourced from `RUST_LOG` (falling back to a sensible
//! default), plain `fmt` output, and an init that's safe to call more than
//! once (harmless in production, convenient in tests).

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "storage_slot_finder=info,warn";

/// Initializes the global tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn initialize(env_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(env_filter.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
