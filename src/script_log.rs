//! Logging for script-originated output.
//!
//! Rhai's `print(...)` and `debug(...)` are routed here and forwarded to the
//! `log` facade under the `superscope::script` target. A per-frame cap keeps
//! a per-point script from flooding the log.

use std::cell::Cell;

/// Maximum number of log messages allowed per frame.
pub const MAX_LOGS_PER_FRAME: u32 = 100;

const TARGET: &str = "superscope::script";

// Rendering is single-threaded, so per-thread counters are per-renderer.
thread_local! {
    static LOG_COUNT: Cell<u32> = const { Cell::new(0) };
    /// Whether we've already warned about exceeding the log limit this frame.
    static WARNED_LIMIT: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

/// Reset the per-frame log counter. Call this at the start of each frame.
pub fn reset_frame_log_count() {
    LOG_COUNT.with(|c| c.set(0));
    WARNED_LIMIT.with(|w| w.set(false));
}

/// Returns true if under the per-frame limit.
fn can_log() -> bool {
    let count = LOG_COUNT.with(|c| {
        let n = c.get();
        c.set(n.saturating_add(1));
        n
    });
    if count >= MAX_LOGS_PER_FRAME {
        if !WARNED_LIMIT.with(|w| w.replace(true)) {
            log::warn!(
                target: TARGET,
                "Script log limit exceeded ({} messages/frame). Further logs dropped.",
                MAX_LOGS_PER_FRAME
            );
        }
        false
    } else {
        true
    }
}

/// Log a message from a script, respecting the per-frame limit.
pub fn script_log(level: LogLevel, message: &str) {
    if !can_log() {
        return;
    }
    match level {
        LogLevel::Info => log::info!(target: TARGET, "{}", message),
        LogLevel::Debug => log::debug!(target: TARGET, "{}", message),
    }
}

/// Hook script output into an engine.
pub fn install(engine: &mut rhai::Engine) {
    engine.on_print(|text| script_log(LogLevel::Info, text));
    engine.on_debug(|text, _source, pos| {
        if pos.is_none() {
            script_log(LogLevel::Debug, text);
        } else {
            script_log(LogLevel::Debug, &format!("{} @ {}", text, pos));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_log_limit() {
        reset_frame_log_count();

        for _ in 0..MAX_LOGS_PER_FRAME {
            assert!(can_log());
        }

        assert!(!can_log());

        reset_frame_log_count();
        assert!(can_log());
    }
}
