//! Request Handlers
//!
//! Simulated units of work: each endpoint sleeps for a random delay and then
//! answers with a fixed body. [`Instrumented`] wraps an endpoint so every
//! invocation is counted and timed.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::StatusCode;
use prometheus::{HistogramTimer, IntCounter};
use rand::Rng;
use tracing::debug;

use crate::registry::Instruments;

/// Body served by the home endpoint
pub const HOME_BODY: &str = "Hello Full Cycle";

/// Body served by the contact endpoint
pub const CONTACT_BODY: &str = "Contact";

// =============================================================================
// Delay
// =============================================================================

/// Random delay of `unit * n` with `n` uniform in `[0, max_steps)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    pub max_steps: u64,
    pub unit: Duration,
}

impl DelayPolicy {
    /// Whole seconds in `[0, max)`
    pub fn seconds(max: u64) -> Self {
        Self {
            max_steps: max,
            unit: Duration::from_secs(1),
        }
    }

    /// Always zero
    pub fn none() -> Self {
        Self {
            max_steps: 0,
            unit: Duration::ZERO,
        }
    }

    /// Draw one delay
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max_steps == 0 {
            return Duration::ZERO;
        }
        let steps = rng.random_range(0..self.max_steps);
        self.unit * steps as u32
    }

    /// Exclusive upper bound of [`sample`](Self::sample)
    pub fn bound(&self) -> Duration {
        self.unit * self.max_steps as u32
    }
}

// =============================================================================
// Endpoint
// =============================================================================

/// Response produced by an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// A simulated endpoint
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    body: Bytes,
    delay: DelayPolicy,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, body: impl Into<Bytes>, delay: DelayPolicy) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            delay,
        }
    }

    /// `/`, 0-7 seconds by default
    pub fn home(delay: DelayPolicy) -> Self {
        Self::new("home", HOME_BODY, delay)
    }

    /// `/contact`, 0-4 seconds by default
    pub fn contact(delay: DelayPolicy) -> Self {
        Self::new("contact", CONTACT_BODY, delay)
    }

    /// Handler label value
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delay(&self) -> DelayPolicy {
        self.delay
    }

    fn next_delay(&self) -> Duration {
        self.delay.sample(&mut rand::rng())
    }

    /// Sleep for the simulated work, then answer
    pub async fn handle(&self) -> Reply {
        let delay = self.next_delay();
        debug!(handler = %self.name, ?delay, "Simulating work");
        tokio::time::sleep(delay).await;

        Reply {
            status: StatusCode::OK,
            body: self.body.clone(),
        }
    }
}

// =============================================================================
// Instrumentation
// =============================================================================

/// Records one request on drop: count +1 and one duration observation
///
/// Recording on drop covers handlers whose future is abandoned mid-sleep,
/// e.g. when the client disconnects.
struct RequestGuard {
    requests: IntCounter,
    _timer: HistogramTimer,
}

impl RequestGuard {
    fn start(instruments: &Instruments, handler: &str) -> Self {
        Self {
            requests: instruments
                .http_requests_total
                .with_label_values(&[handler]),
            _timer: instruments
                .http_request_duration
                .with_label_values(&[handler])
                .start_timer(),
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.requests.inc();
    }
}

/// Endpoint wrapped with request count and duration instrumentation
#[derive(Debug, Clone)]
pub struct Instrumented {
    endpoint: Arc<Endpoint>,
    instruments: Arc<Instruments>,
}

impl Instrumented {
    pub fn new(endpoint: Endpoint, instruments: Arc<Instruments>) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            instruments,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run the endpoint; timing spans the whole call including the sleep
    pub async fn call(&self) -> Reply {
        let _guard = RequestGuard::start(&self.instruments, self.endpoint.name());
        self.endpoint.handle().await
    }
}

// =============================================================================
// Tests
// =============================================================================
