//! Per-service circuit breaker.
//!
//! Failure accounting only sees network-class errors; a provider that
//! answers with a business failure is healthy as far as the breaker is
//! concerned. State lives in atomics so a breaker can be shared across
//! caller tasks without a lock on the hot path.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use tracing::{info, warn};

use relay_common::config::BreakerSettings;
use relay_common::protocol::{ErrorCode, Result, RpcError};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    settings: BreakerSettings,
    /// Monotonic time base for all the millisecond counters below.
    epoch: Instant,
    state: AtomicU8,
    failures: AtomicU32,
    last_failure: AtomicU64,
    opened_at: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            epoch: Instant::now(),
            state: AtomicU8::new(CLOSED),
            failures: AtomicU32::new(0),
            last_failure: AtomicU64::new(0),
            opened_at: AtomicU64::new(0),
        }
    }

    /// A breaker that never trips.
    pub fn disabled() -> Self {
        Self::new(BreakerSettings::default())
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::SeqCst) {
            OPEN => BreakerState::Open,
            HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Ops hook: force the breaker back to closed.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
        self.state.store(CLOSED, Ordering::SeqCst);
    }

    /// Gate run before the network call. `Ok(())` admits the call; an open
    /// circuit fast-fails with the remaining wait in the message.
    pub fn pre_call(&self) -> Result<()> {
        if !self.settings.enabled {
            return Ok(());
        }
        let now = self.now_ms();
        match self.state.load(Ordering::SeqCst) {
            OPEN => {
                let elapsed = now.saturating_sub(self.opened_at.load(Ordering::SeqCst));
                if elapsed < self.settings.half_open_initial_delay_ms {
                    return Err(self.rejection(self.settings.half_open_initial_delay_ms - elapsed));
                }
                // One caller wins the transition; losers proceed as half-open
                // traffic rather than fast-failing.
                if self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    info!("circuit half-open, probing");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn rejection(&self, remaining_ms: u64) -> RpcError {
        RpcError::framework(
            ErrorCode::CircuitBreakerOpen,
            format!("circuit open, next probe admitted in {remaining_ms}ms"),
        )
    }

    /// Records a network-error-free completion. A probe success closes the
    /// circuit.
    pub fn on_success(&self) {
        if !self.settings.enabled {
            return;
        }
        self.failures.store(0, Ordering::SeqCst);
        let previous = self.state.swap(CLOSED, Ordering::SeqCst);
        if previous != CLOSED {
            info!("circuit closed");
        }
    }

    /// Records a network failure. In half-open this reopens the circuit
    /// immediately; in closed it counts against the sliding window.
    pub fn on_failure(&self) {
        if !self.settings.enabled {
            return;
        }
        let now = self.now_ms();

        if self
            .state
            .compare_exchange(HALF_OPEN, OPEN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.opened_at.store(now, Ordering::SeqCst);
            warn!("probe failed, circuit reopened");
            return;
        }

        // A quiet gap longer than the window retires the running streak; a
        // steady trickle of failures keeps it alive.
        let previous = self.last_failure.swap(now, Ordering::SeqCst);
        if now.saturating_sub(previous) > self.settings.window_ms {
            self.failures.store(0, Ordering::SeqCst);
        }

        let count = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.settings.fault_limit
            && self
                .state
                .compare_exchange(CLOSED, OPEN, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            self.opened_at.store(now, Ordering::SeqCst);
            warn!(failures = count, "fault limit reached, circuit opened");
        }
    }
}
