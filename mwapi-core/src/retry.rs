// Retry decisions for transient server conditions
// A delay comes from `Retry-After` or from the default of a transient error
// code (`maxlag`, `readonly`); every retry spends it from a time budget

use crate::options::Options;
use crate::response::ApiMessage;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::time::Duration;

/// Response headers with lower-case names.
pub type Headers = BTreeMap<String, String>;

pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// Seconds left for sleeping between retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBudget {
    remaining: f64,
}

impl RetryBudget {
    pub fn new(seconds: f64) -> Self {
        Self {
            remaining: seconds.max(0.0),
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Spend `delay` if it fits in the remaining budget.
    ///
    /// `Duration::MAX` stands for a delay too large to represent and never fits.
    pub fn try_spend(&mut self, delay: Duration) -> bool {
        let seconds = delay.as_secs_f64();
        if delay == Duration::MAX || seconds > self.remaining {
            return false;
        }
        self.remaining -= seconds;
        true
    }
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryDecision {
    pub delay: Duration,
    pub retry: bool,
}

impl RetryDecision {
    fn no_retry() -> Self {
        Self {
            delay: Duration::ZERO,
            retry: false,
        }
    }
}

/// Transient error codes and their default delays.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    transient_codes: IndexMap<String, f64>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            transient_codes: IndexMap::new(),
        }
    }

    /// Policy with the `maxlag` and `readonly` delays from `options`.
    pub fn from_options(options: &Options) -> Self {
        Self::new()
            .with_transient_code("maxlag", options.retry_after_maxlag_seconds)
            .with_transient_code("readonly", options.retry_after_readonly_seconds)
    }

    pub fn with_transient_code(mut self, code: impl Into<String>, default_delay_seconds: f64) -> Self {
        self.transient_codes.insert(code.into(), default_delay_seconds);
        self
    }

    pub fn is_transient(&self, code: &str) -> bool {
        self.transient_codes.contains_key(code)
    }

    /// Delay the server asked for, or the default delay of the first transient error.
    pub fn retry_delay(&self, headers: &Headers, errors: Option<&[ApiMessage]>) -> Option<Duration> {
        if let Some(seconds) = headers.get(RETRY_AFTER_HEADER).and_then(|value| parse_retry_after(value)) {
            return Some(seconds);
        }
        errors?
            .iter()
            .filter_map(ApiMessage::code)
            .find_map(|code| self.transient_codes.get(code))
            .map(|seconds| delay_from_secs(seconds.max(0.0)))
    }

    /// Decide whether to retry, spending the delay from `budget` if so.
    pub fn should_retry(
        &self,
        headers: &Headers,
        errors: Option<&[ApiMessage]>,
        budget: &mut RetryBudget,
    ) -> RetryDecision {
        match self.retry_delay(headers, errors) {
            Some(delay) if budget.try_spend(delay) => RetryDecision { delay, retry: true },
            _ => RetryDecision::no_retry(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&Options::default())
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds.
///
/// The HTTP-date form is not used by MediaWiki and is ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| delay_from_secs(seconds))
}

/// Delay for a non-negative number of seconds, saturating at `Duration::MAX`.
fn delay_from_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}
