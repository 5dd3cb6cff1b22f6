//! Global burst/gap pacing gate.
//!
//! The gate admits at most `burst_size` submissions, then holds every
//! further submitter until the gap has elapsed, then opens a new burst
//! window. It is shared across the whole batch, so the platform never
//! sees more than `burst_size` submission flows start inside one gap
//! window no matter how many jobs finish uploading at once. The gap is
//! measured from the instant the burst's last slot is taken, which keeps
//! the ceiling valid for any rolling window of the gap's length.
//!
//! Admission order among blocked submitters is whatever the lock hands
//! out; only the rate ceiling is guaranteed.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::ThrottleConfig;

#[derive(Debug)]
struct GateState {
    /// Admissions in the current burst window
    admitted: u32,
    /// When set, no admission until this instant
    gap_until: Option<Instant>,
}

/// Mutex/condvar-guarded burst counter. The only state shared between
/// submission flows besides the ledger channel.
#[derive(Debug)]
pub struct PacingGate {
    burst_size: u32,
    gap: Duration,
    state: Mutex<GateState>,
    reopened: Condvar,
}

impl PacingGate {
    /// `burst_size` must be positive (enforced by config validation).
    pub fn new(burst_size: u32, gap: Duration) -> Self {
        Self {
            burst_size,
            gap,
            state: Mutex::new(GateState {
                admitted: 0,
                gap_until: None,
            }),
            reopened: Condvar::new(),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.burst_size, config.gap())
    }

    /// Block until this submission may proceed.
    pub fn admit(&self) {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(until) = state.gap_until {
                let now = Instant::now();
                if now < until {
                    let (guard, _) = self
                        .reopened
                        .wait_timeout(state, until - now)
                        .unwrap();
                    state = guard;
                    continue;
                }
                debug!(burst_size = self.burst_size, "pacing gap elapsed, new burst window");
                state.admitted = 0;
                state.gap_until = None;
            }

            state.admitted += 1;
            if state.admitted >= self.burst_size {
                // Burst filled; everyone after this waits out the gap.
                state.gap_until = Some(Instant::now() + self.gap);
                debug!(
                    burst_size = self.burst_size,
                    gap_ms = self.gap.as_millis() as u64,
                    "burst filled, gating submissions"
                );
            }
            return;
        }
    }
}
