//! Bounded retry that ends in either a validated value or a fallback.

use std::future::Future;

use crew_common::{CrewError, Result};
use tracing::warn;

/// Outcome of [`retry_with_fallback`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attempted<T> {
    Validated { value: T, attempts: u32 },
    Fallback { value: T, attempts: u32, last_error: String },
}

impl<T> Attempted<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Attempted::Validated { attempts, .. } | Attempted::Fallback { attempts, .. } => *attempts,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Attempted::Fallback { .. })
    }

    /// Error of the final attempt when the value is a fallback.
    pub fn last_error(&self) -> Option<&str> {
        match self {
            Attempted::Validated { .. } => None,
            Attempted::Fallback { last_error, .. } => Some(last_error.as_str()),
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Attempted::Validated { value, .. } | Attempted::Fallback { value, .. } => value,
        }
    }
}

/// Run `attempt` up to `max_attempts` times (at least once), passing the
/// 1-based attempt number. The first `Ok` is returned as
/// [`Attempted::Validated`]; if every attempt fails, `fallback` builds the
/// value from the last error.
pub async fn retry_with_fallback<T, F, Fut, G>(
    max_attempts: u32,
    mut attempt: F,
    fallback: G,
) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    G: FnOnce(&CrewError) -> T,
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(value) => return Attempted::Validated { value, attempts: n },
            Err(e) if n < max_attempts => {
                warn!(attempt = n, max_attempts, error = %e, "Attempt failed, retrying");
                n += 1;
            }
            Err(e) => {
                warn!(attempts = n, error = %e, "All attempts failed, using fallback");
                return Attempted::Fallback {
                    value: fallback(&e),
                    attempts: n,
                    last_error: e.to_string(),
                };
            }
        }
    }
}
