//! Bounded waits against a live session.
//!
//! A [`Waiter`] polls the current document at a fixed interval until a
//! [`Condition`] holds or its timeout runs out. Every wait checks at least
//! once, even with a zero timeout, and never sleeps past its deadline.
//!
//! What a timeout *means* is up to the caller: probes read
//! [`WaitOutcome::TimedOut`] as `false` or an empty list, actions turn it
//! into a typed error.

use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::locator::Locator;
use crate::session::{ElementHandle, Session, SessionResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set timeout from a duration
    #[must_use]
    pub fn with_timeout_duration(self, timeout: Duration) -> Self {
        self.with_timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// CONDITIONS
// =============================================================================

/// Predicate evaluated against the current document on each poll
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// First match exists
    Present(Locator),
    /// At least one match exists; yields all of them
    AllPresent(Locator),
    /// First match exists and is visible
    Visible(Locator),
    /// First match is visible and enabled
    Clickable(Locator),
    /// No match, or the first match is not visible
    Invisible(Locator),
    /// A JavaScript dialog is open
    AlertPresent,
    /// Script body whose return value is truthy
    Script(String),
}

impl Condition {
    /// Locator the condition is about, if any
    #[must_use]
    pub const fn locator(&self) -> Option<&Locator> {
        match self {
            Self::Present(l)
            | Self::AllPresent(l)
            | Self::Visible(l)
            | Self::Clickable(l)
            | Self::Invisible(l) => Some(l),
            Self::AlertPresent | Self::Script(_) => None,
        }
    }

    fn check(&self, session: &mut dyn Session) -> SessionResult<Option<WaitOutcome>> {
        Ok(match self {
            Self::Present(locator) => session.find(None, locator)?.map(WaitOutcome::Found),
            Self::AllPresent(locator) => {
                let all = session.find_all(None, locator)?;
                (!all.is_empty()).then_some(WaitOutcome::FoundMany(all))
            }
            Self::Visible(locator) => match session.find(None, locator)? {
                Some(element) if session.element_state(&element)?.is_visible() => {
                    Some(WaitOutcome::Found(element))
                }
                _ => None,
            },
            Self::Clickable(locator) => match session.find(None, locator)? {
                Some(element) if session.element_state(&element)?.is_clickable() => {
                    Some(WaitOutcome::Found(element))
                }
                _ => None,
            },
            Self::Invisible(locator) => match session.find(None, locator)? {
                None => Some(WaitOutcome::Satisfied),
                Some(element) => {
                    (!session.element_state(&element)?.is_visible()).then_some(WaitOutcome::Satisfied)
                }
            },
            Self::AlertPresent => session.alert_text()?.map(|_| WaitOutcome::Satisfied),
            Self::Script(code) => {
                is_truthy(&session.execute_script(code, &[])?).then_some(WaitOutcome::Satisfied)
            }
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present(l) => write!(f, "presence of {l}"),
            Self::AllPresent(l) => write!(f, "presence of all {l}"),
            Self::Visible(l) => write!(f, "visibility of {l}"),
            Self::Clickable(l) => write!(f, "{l} to be clickable"),
            Self::Invisible(l) => write!(f, "invisibility of {l}"),
            Self::AlertPresent => f.write_str("alert to be present"),
            Self::Script(code) => write!(f, "script `{code}` to be truthy"),
        }
    }
}

/// JavaScript truthiness of a JSON value
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Condition held and yielded one element
    Found(ElementHandle),
    /// Condition held and yielded every match
    FoundMany(Vec<ElementHandle>),
    /// Condition held without yielding an element
    Satisfied,
    /// Timeout ran out first
    TimedOut {
        /// Time actually spent waiting
        elapsed: Duration,
    },
}

impl WaitOutcome {
    /// Whether the wait ran out
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// The element, for `Found`
    #[must_use]
    pub fn into_element(self) -> Option<ElementHandle> {
        match self {
            Self::Found(element) => Some(element),
            _ => None,
        }
    }

    /// All elements; empty unless `Found` or `FoundMany`
    #[must_use]
    pub fn into_elements(self) -> Vec<ElementHandle> {
        match self {
            Self::Found(element) => vec![element],
            Self::FoundMany(elements) => elements,
            Self::Satisfied | Self::TimedOut { .. } => Vec::new(),
        }
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Polls a session until a condition holds or the timeout runs out
#[derive(Debug, Clone, Copy, Default)]
pub struct Waiter {
    options: WaitOptions,
}

impl Waiter {
    /// Create a waiter with default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a waiter with specific options
    #[must_use]
    pub const fn with_options(options: WaitOptions) -> Self {
        Self { options }
    }

    /// Waiter with the given timeout and poll interval
    #[must_use]
    pub fn for_timeout(timeout: Duration, poll_interval: Duration) -> Self {
        Self::with_options(
            WaitOptions::new()
                .with_timeout_duration(timeout)
                .with_poll_interval(u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX)),
        )
    }

    /// Options in effect
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Wait for `condition`.
    ///
    /// Stale element references seen while polling count as "not yet"; any
    /// other session error stops the wait and is returned.
    pub fn until(
        &self,
        session: &mut dyn Session,
        condition: &Condition,
    ) -> SessionResult<WaitOutcome> {
        let start = Instant::now();
        let outcome = self.poll(session, |s| condition.check(s))?;
        let outcome = outcome.unwrap_or(WaitOutcome::TimedOut {
            elapsed: start.elapsed(),
        });
        tracing::trace!(
            condition = %condition,
            timed_out = outcome.is_timed_out(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "wait finished"
        );
        Ok(outcome)
    }

    /// Retry `probe` until it yields a value; `Ok(None)` on timeout.
    pub fn poll<T, F>(&self, session: &mut dyn Session, mut probe: F) -> SessionResult<Option<T>>
    where
        F: FnMut(&mut dyn Session) -> SessionResult<Option<T>>,
    {
        let deadline = Instant::now() + self.options.timeout();
        let interval = self.options.poll_interval();
        loop {
            match probe(&mut *session) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    tracing::trace!(error = %err, "transient error while waiting");
                }
                Err(err) => return Err(err),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(interval.min(deadline - now));
        }
    }
}
