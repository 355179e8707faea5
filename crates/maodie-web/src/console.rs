//! Diagnostics routed to the browser console.
//!
//! No tracing subscriber is installed in the browser, so `tracing` events are
//! re-emitted as `log` records and `console_log` prints them.

use std::sync::Once;

use log::Level;

/// Install the panic hook and the console logger. Later calls are no-ops.
pub(crate) fn install(debug: bool) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        console_error_panic_hook::set_once();
        let level = if debug { Level::Debug } else { Level::Info };
        if console_log::init_with_level(level).is_err() {
            log::set_max_level(level.to_level_filter());
        }
    });
}
