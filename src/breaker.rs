//! Circuit breaker guarding calls to the upstream API.
//!
//! The breaker keeps a rolling window of call outcomes. Once enough calls have
//! been seen and the share of failures crosses the threshold, the circuit opens
//! and calls are rejected with [`TransportError::CircuitOpen`] without touching
//! the network. After `sleep_window` a single probe is let through: success
//! closes the circuit, failure opens it again.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::http::TransportError;

/// Command name used by the account client's breaker.
pub const DEFAULT_COMMAND_NAME: &str = "account-client";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Failure percentage (0-100) at which the circuit opens
    pub error_percent_threshold: u32,
    /// Minimum calls in the window before the error rate is considered
    pub request_volume_threshold: u32,
    /// How long outcomes count towards the error rate
    pub rolling_window: Duration,
    /// How long the circuit stays open before a probe is allowed
    pub sleep_window: Duration,
    /// Upper bound for a single guarded call, retries included
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_percent_threshold: 30,
            request_volume_threshold: 20,
            rolling_window: Duration::from_secs(10),
            sleep_window: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// When the circuit opened, or when the current probe started
    since: Option<Instant>,
    outcomes: VecDeque<(Instant, bool)>,
}

impl Inner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            since: None,
            outcomes: VecDeque::new(),
        }
    }
}

/// Stateful breaker handle. Share it with `Arc` between clients that should
/// trip together.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker identified by `name` in log messages and errors.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    /// Returns the name the breaker reports in errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the thresholds this breaker was created with.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current circuit state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Closes the circuit and forgets all recorded outcomes.
    pub fn reset(&self) {
        debug!("{}: resetting circuit", self.name);
        *self.lock() = Inner::closed();
    }

    /// Runs `operation` unless the circuit is open.
    ///
    /// Errors returned by the operation, and calls exceeding the configured
    /// timeout, count as failures.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;

        let result = match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.config.timeout).into()),
        };

        self.record(admission, result.is_ok());
        result
    }

    fn admit(&self) -> Result<Admission> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open | CircuitState::HalfOpen => {
                let waited_out = inner
                    .since
                    .is_none_or(|since| now.duration_since(since) >= self.config.sleep_window);
                if !waited_out {
                    return Err(TransportError::CircuitOpen(self.name.clone()).into());
                }
                debug!("{}: letting a probe through", self.name);
                inner.state = CircuitState::HalfOpen;
                inner.since = Some(now);
                Ok(Admission::Probe)
            }
        }
    }

    fn record(&self, admission: Admission, success: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        if admission == Admission::Probe {
            if success {
                info!("{}: probe succeeded, closing circuit", self.name);
                *inner = Inner::closed();
            } else {
                warn!("{}: probe failed, circuit stays open", self.name);
                inner.state = CircuitState::Open;
                inner.since = Some(now);
            }
            return;
        }

        // Outcomes of calls admitted before a concurrent call opened the circuit
        if inner.state != CircuitState::Closed {
            return;
        }

        inner.outcomes.push_back((now, success));
        while let Some((at, _)) = inner.outcomes.front() {
            if now.duration_since(*at) > self.config.rolling_window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }

        let total = inner.outcomes.len() as u64;
        if total < u64::from(self.config.request_volume_threshold) {
            return;
        }
        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count() as u64;
        let error_percent = failures * 100 / total;

        if error_percent >= u64::from(self.config.error_percent_threshold) {
            warn!(
                "{}: error rate {}% over {} calls, opening circuit",
                self.name, error_percent, total
            );
            inner.state = CircuitState::Open;
            inner.since = Some(now);
            inner.outcomes.clear();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_NAME, BreakerConfig::default())
    }
}
