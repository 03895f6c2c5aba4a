use std::env;

/// Which kind of host a process is running on. Telemetry uses this to
/// decide between a human-friendly pretty logger and a machine-readable
/// JSON one, and to decide whether file/line info is worth the noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Staging,
    Production,
}

const ENVIRONMENT_VAR: &str = "OVERLAY_ENVIRONMENT";
const PRETTY_LOGS_VAR: &str = "OVERLAY_PRETTY_LOGS";

/// Reads `OVERLAY_ENVIRONMENT`, defaulting to [`Environment::Local`] when
/// unset or unrecognized.
pub fn get_overlay_environment() -> Environment {
    match env::var(ENVIRONMENT_VAR).as_deref() {
        Ok("staging") => Environment::Staging,
        Ok("production") => Environment::Production,
        _ => Environment::Local,
    }
}

/// Reads `OVERLAY_PRETTY_LOGS`, defaulting to `true` on a local
/// environment and `false` otherwise.
pub fn get_pretty_print_logs() -> bool {
    match env::var(PRETTY_LOGS_VAR) {
        Ok(value) => value == "1" || value.eq_ignore_ascii_case("true"),
        Err(_) => matches!(get_overlay_environment(), Environment::Local),
    }
}
