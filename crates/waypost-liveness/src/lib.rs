//! Dead-connection detection for the waypost relay.
//!
//! A relay holds sockets open indefinitely, so a peer that vanishes
//! without a close frame (laptop lid, NAT timeout, crashed tab) would
//! pin its session forever. The liveness monitor reclaims those: each
//! sweep it terminates every connection that failed to answer the
//! previous sweep's probe, then clears the alive flag on the survivors
//! and probes them again.
//!
//! This is a 2-sweep timeout: a connection dies only after staying
//! silent through one full probe cycle, so worst-case detection
//! latency is twice the sweep interval.
//!
//! # Integration
//!
//! The monitor owns no connection set — the server injects the current
//! one each sweep:
//!
//! ```ignore
//! let mut monitor = LivenessMonitor::new(LivenessConfig::default());
//! loop {
//!     monitor.wait_for_sweep().await;
//!     let conns = state.connections.lock().await.values().cloned().collect::<Vec<_>>();
//!     monitor.sweep(conns).await;
//! }
//! ```
//!
//! Terminating a connection unblocks its engine task's `recv`, which
//! runs the normal release path — the monitor never touches the
//! registry directly.

use std::time::Duration;

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, warn};

use waypost_transport::{Connection, ConnectionId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the liveness monitor.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Time between sweeps. Default: 30 seconds.
    ///
    /// Connections that stay silent for two consecutive sweeps are
    /// terminated, so the effective dead-peer timeout is `2 × interval`.
    pub interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl LivenessConfig {
    /// Minimum supported sweep interval.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// Creates a config with the given sweep interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`LivenessMonitor::new`]. A zero (or
    /// sub-minimum) interval would turn the monitor into a busy loop
    /// that kills every connection before it can answer a probe.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "liveness interval below minimum — clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Running counters for the monitor.
#[derive(Debug, Clone, Default)]
pub struct LivenessMetrics {
    /// Total sweeps executed.
    pub sweeps: u64,
    /// Total probes sent.
    pub probes_sent: u64,
    /// Total connections terminated for failing to answer.
    pub terminated: u64,
}

/// What a single sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Connections probed this sweep.
    pub probed: usize,
    /// Connections terminated this sweep.
    pub terminated: Vec<ConnectionId>,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Periodic prober and reaper for a set of connections.
///
/// One monitor per server. The caller drives it: [`wait_for_sweep`]
/// sleeps until the next sweep is due, [`sweep`] walks whatever
/// connection set the caller passes in.
///
/// [`wait_for_sweep`]: Self::wait_for_sweep
/// [`sweep`]: Self::sweep
pub struct LivenessMonitor {
    config: LivenessConfig,
    /// When the next sweep should fire.
    next_sweep: TokioInstant,
    metrics: LivenessMetrics,
}

impl LivenessMonitor {
    /// Creates a monitor from config (validated first).
    pub fn new(config: LivenessConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            "liveness monitor created"
        );
        Self {
            next_sweep: TokioInstant::now() + config.interval,
            config,
            metrics: LivenessMetrics::default(),
        }
    }

    /// Creates a monitor with the given sweep interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self::new(LivenessConfig::with_interval(interval))
    }

    /// Sleeps until the next sweep is due.
    ///
    /// The next deadline is scheduled from *now*, not from the missed
    /// deadline, so a slow sweep never produces a catch-up burst of
    /// probes.
    pub async fn wait_for_sweep(&mut self) {
        time::sleep_until(self.next_sweep).await;
        self.next_sweep = TokioInstant::now() + self.config.interval;
    }

    /// Probes and reaps one pass over `connections`.
    ///
    /// For every open connection: if it never answered the previous
    /// sweep's probe, terminate it (the close unblocks its engine task,
    /// which releases it from the registry); otherwise clear its alive
    /// flag and probe again. Probe failures are swallowed — the write
    /// side being broken just means the next sweep reaps it.
    pub async fn sweep<C, I>(&mut self, connections: I) -> SweepOutcome
    where
        C: Connection,
        I: IntoIterator<Item = C>,
    {
        self.metrics.sweeps += 1;
        let mut outcome = SweepOutcome::default();

        for conn in connections {
            if !conn.is_open() {
                continue;
            }
            if !conn.is_alive() {
                warn!(conn = %conn.id(), "no probe answer since last sweep — terminating");
                let _ = conn.close().await;
                outcome.terminated.push(conn.id());
                continue;
            }
            conn.clear_alive();
            match conn.probe().await {
                Ok(()) => outcome.probed += 1,
                Err(e) => {
                    debug!(conn = %conn.id(), error = %e, "probe failed");
                }
            }
        }

        self.metrics.probes_sent += outcome.probed as u64;
        self.metrics.terminated += outcome.terminated.len() as u64;

        debug!(
            sweep = self.metrics.sweeps,
            probed = outcome.probed,
            terminated = outcome.terminated.len(),
            "liveness sweep complete"
        );
        outcome
    }

    /// The configured sweep interval.
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Snapshot of the running counters.
    pub fn metrics(&self) -> &LivenessMetrics {
        &self.metrics
    }
}
