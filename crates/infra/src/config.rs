//! Runtime configuration.

use quoteflow_core::DEFAULT_SEQUENCE_WIDTH;

use crate::command_dispatcher::DEFAULT_MAX_ATTEMPTS;

pub const ENV_MAX_ATTEMPTS: &str = "QUOTEFLOW_MAX_ATTEMPTS";
pub const ENV_SEQUENCE_WIDTH: &str = "QUOTEFLOW_SEQUENCE_WIDTH";

/// Knobs for the reconciliation services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Bound on optimistic retries for stock adjustments and numbering.
    pub max_attempts: u32,
    /// Zero-padding of document sequence numbers.
    pub sequence_width: u8,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            sequence_width: DEFAULT_SEQUENCE_WIDTH,
        }
    }
}

impl ReconcileConfig {
    /// Read overrides from the process environment. Missing or malformed
    /// values fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_attempts = parse_or(&lookup, ENV_MAX_ATTEMPTS, defaults.max_attempts, |v: &u32| {
            *v >= 1
        });
        let sequence_width =
            parse_or(&lookup, ENV_SEQUENCE_WIDTH, defaults.sequence_width, |v: &u8| {
                (1..=9).contains(v)
            });

        Self {
            max_attempts,
            sequence_width,
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!("{key}={raw:?} is not valid; using default {default}");
            default
        }
    }
}
