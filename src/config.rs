// SPDX-License-Identifier: MIT

//! Engine configuration from the environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `APPROVAL_TALLY_VISIBILITY` | `counts` (`counts` or `voters`) |
//! | `APPROVAL_NOTIFY_MAX_ATTEMPTS` | `3` |
//! | `APPROVAL_NOTIFY_BACKOFF_MS` | `200` |

use std::env;
use std::time::Duration;

use crate::approval::definition::TallyVisibility;
use crate::error::EngineError;

const TALLY_VISIBILITY: &str = "APPROVAL_TALLY_VISIBILITY";
const NOTIFY_MAX_ATTEMPTS: &str = "APPROVAL_NOTIFY_MAX_ATTEMPTS";
const NOTIFY_BACKOFF_MS: &str = "APPROVAL_NOTIFY_BACKOFF_MS";

/// Retry behaviour for notification sinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly after that
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Used when a workflow does not set its own visibility
    pub tally_visibility: TallyVisibility,
    pub delivery: DeliveryPolicy,
}

impl EngineConfig {
    /// Read the process environment. Call `dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TALLY_VISIBILITY) {
            config.tally_visibility = match raw.trim().to_lowercase().as_str() {
                "counts" => TallyVisibility::Counts,
                "voters" => TallyVisibility::Voters,
                other => {
                    return Err(EngineError::config(format!(
                        "{} must be 'counts' or 'voters', got '{}'",
                        TALLY_VISIBILITY, other
                    )))
                }
            };
        }

        if let Some(raw) = lookup(NOTIFY_MAX_ATTEMPTS) {
            let attempts: u32 = parse_number(NOTIFY_MAX_ATTEMPTS, &raw)?;
            if attempts == 0 {
                return Err(EngineError::config(format!(
                    "{} must be at least 1",
                    NOTIFY_MAX_ATTEMPTS
                )));
            }
            config.delivery.max_attempts = attempts;
        }

        if let Some(raw) = lookup(NOTIFY_BACKOFF_MS) {
            config.delivery.backoff = Duration::from_millis(parse_number(NOTIFY_BACKOFF_MS, &raw)?);
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, EngineError> {
    raw.trim()
        .parse()
        .map_err(|_| EngineError::config(format!("{} must be a number, got '{}'", key, raw)))
}
