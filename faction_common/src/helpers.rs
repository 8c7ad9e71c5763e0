use std::{env, str::FromStr, time::Duration};

use log::*;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads and parses the environment variable `name`. Missing or invalid values fall back to `default`, and the
/// fallback is logged.
pub fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

/// Reads an environment variable holding a number of seconds.
pub fn env_duration_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or_default(name, default.as_secs()))
}

/// Reads an environment variable holding a number of milliseconds.
pub fn env_duration_millis(name: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_or_default(name, default_ms))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("1".into()), false));
        assert!(parse_boolean_flag(Some(" Yes ".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn env_values_fall_back_to_defaults() {
        env::set_var("FC_TEST_GOOD_NUMBER", "42");
        env::set_var("FC_TEST_BAD_NUMBER", "forty-two");
        assert_eq!(env_or_default("FC_TEST_GOOD_NUMBER", 7u32), 42);
        assert_eq!(env_or_default("FC_TEST_BAD_NUMBER", 7u32), 7);
        assert_eq!(env_or_default("FC_TEST_MISSING_NUMBER", 7u32), 7);
        assert_eq!(env_duration_secs("FC_TEST_GOOD_NUMBER", Duration::ZERO), Duration::from_secs(42));
        let fallback = Duration::from_millis(250);
        assert_eq!(env_duration_millis("FC_TEST_MISSING_NUMBER", fallback), fallback);
    }
}
