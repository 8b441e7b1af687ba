//! Log level control for the drops core.
//!
//! With diagnostics off only WARN and ERROR get through. With them on the
//! core also logs DEBUG and INFO, and push events are dumped in full.
//! `RUST_LOG` still overrides per module.

use lazy_static::lazy_static;
use log::{info, LevelFilter};
use std::sync::atomic::{AtomicBool, Ordering};

lazy_static! {
    static ref DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);
}

pub fn level_for(diagnostics_enabled: bool) -> LevelFilter {
    if diagnostics_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Install the env_logger backend at the current diagnostics level.
/// Later calls are no-ops.
pub fn init_logging() {
    let result = env_logger::Builder::new()
        .filter_level(level_for(is_diagnostics_enabled()))
        .parse_default_env()
        .format_timestamp_millis()
        .format_module_path(true)
        .try_init();

    if result.is_ok() {
        info!("🪵 Drops logging initialized");
    }
}

/// Returns the previous value.
pub fn set_diagnostics_enabled(enabled: bool) -> bool {
    let previous = DIAGNOSTICS_ENABLED.swap(enabled, Ordering::SeqCst);
    if previous != enabled {
        log::set_max_level(level_for(enabled));
        log::warn!("🪵 Drops diagnostics {}", if enabled { "enabled" } else { "disabled" });
    }
    previous
}

pub fn is_diagnostics_enabled() -> bool {
    DIAGNOSTICS_ENABLED.load(Ordering::SeqCst)
}
