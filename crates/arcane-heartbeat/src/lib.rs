//! Liveness monitor for Arcane.
//!
//! A single background task wakes every [`HeartbeatConfig::period`], looks
//! at when each peer last sent anything and evicts the ones that have been
//! silent for longer than [`HeartbeatConfig::timeout`].
//!
//! The monitor doesn't know what a peer is. It works against the
//! [`Liveness`] trait, which the server's supervisor implements by
//! snapshotting its connection registry and kicking sessions.
//!
//! # Stopping
//!
//! [`HeartbeatMonitor::stop`] is a signal-and-acknowledge handshake: the
//! caller sends a stop signal, the task leaves its loop (finishing any
//! sweep already in progress), sends an acknowledgment on a separate
//! channel and exits. `stop` resolves only after both, so once it returns
//! no further evictions can happen.
//!
//! ```text
//! spawn() ──→ [sleep period] ──→ sweep() ──→ [sleep period] ──→ ...
//!                 │
//!     stop() ─────┴──→ break ──→ ack ──→ task exits
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Reason attached to every eviction made by the monitor.
pub const LIVENESS_TIMEOUT_REASON: &str = "liveness timeout";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing for the liveness sweep.
///
/// This is the only place the timeout lives; nothing else in the server
/// hard-codes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often the sweep runs. Default: 60 seconds.
    pub period: Duration,
    /// How long a peer may stay silent before it is evicted.
    /// Default: 60 seconds.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Smallest period or timeout the monitor accepts.
    pub const MIN_DURATION: Duration = Duration::from_secs(1);

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`HeartbeatMonitor::spawn`]. A zero period
    /// would spin and a zero timeout would evict everyone, so both are
    /// raised to [`Self::MIN_DURATION`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_DURATION {
            warn!(
                period_ms = self.period.as_millis() as u64,
                "heartbeat period below minimum, clamping"
            );
            self.period = Self::MIN_DURATION;
        }
        if self.timeout < Self::MIN_DURATION {
            warn!(
                timeout_ms = self.timeout.as_millis() as u64,
                "heartbeat timeout below minimum, clamping"
            );
            self.timeout = Self::MIN_DURATION;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Something that tracks peers and can evict them.
pub trait Liveness: Send + Sync + 'static {
    /// How a peer is identified.
    type Peer: Copy + Send + Sync + fmt::Display + 'static;

    /// Every current peer with the instant it was last heard from. Taken
    /// as a snapshot: the monitor never holds the implementor's locks.
    fn last_seen(&self) -> Vec<(Self::Peer, Instant)>;

    /// Removes `peer`, telling it why, unless it has been heard from at or
    /// after `cutoff` since [`last_seen`](Self::last_seen) was taken.
    /// Returns whether the peer was evicted.
    fn evict(
        &self,
        peer: Self::Peer,
        cutoff: Instant,
        reason: &str,
    ) -> impl Future<Output = bool> + Send;
}

/// Evicts every peer whose last activity is strictly before
/// `now - timeout`. Returns how many were evicted.
pub async fn sweep<L: Liveness>(liveness: &L, timeout: Duration) -> usize {
    let now = Instant::now();
    let Some(cutoff) = now.checked_sub(timeout) else {
        return 0;
    };

    let peers = liveness.last_seen();
    let total = peers.len();
    let mut evicted = 0;
    for (peer, seen) in peers {
        if seen < cutoff {
            debug!(
                %peer,
                silent_ms = now.saturating_duration_since(seen).as_millis() as u64,
                "peer exceeded liveness timeout"
            );
            if liveness.evict(peer, cutoff, LIVENESS_TIMEOUT_REASON).await {
                evicted += 1;
            } else {
                debug!(%peer, "peer spoke during the sweep, spared");
            }
        }
    }

    if evicted > 0 {
        info!(evicted, checked = total, "liveness sweep evicted stale peers");
    } else {
        debug!(checked = total, "liveness sweep found no stale peers");
    }
    evicted
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Errors from stopping the monitor.
#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    /// The monitor task ended without acknowledging the stop signal.
    #[error("heartbeat monitor exited without acknowledging stop")]
    NoAck,

    /// The monitor task panicked or was cancelled.
    #[error("heartbeat monitor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle to the running liveness task.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    stop_tx: oneshot::Sender<()>,
    ack_rx: oneshot::Receiver<()>,
    handle: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Spawns the monitor onto the current runtime. The first sweep runs
    /// one full period from now.
    pub fn spawn<L: Liveness>(liveness: Arc<L>, config: HeartbeatConfig) -> Self {
        let config = config.validated();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();

        let handle = tokio::spawn(run(liveness, config, stop_rx, ack_tx));
        info!(
            period_secs = config.period.as_secs_f64(),
            timeout_secs = config.timeout.as_secs_f64(),
            "heartbeat monitor started"
        );

        Self {
            config,
            stop_tx,
            ack_rx,
            handle,
        }
    }

    /// The config in effect, after validation.
    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Signals the task to stop and waits for its acknowledgment and exit.
    pub async fn stop(self) -> Result<(), HeartbeatError> {
        // The task may already be gone; the ack below reports that.
        let _ = self.stop_tx.send(());
        let acked = self.ack_rx.await;
        self.handle.await?;
        acked.map_err(|_| HeartbeatError::NoAck)
    }
}

async fn run<L: Liveness>(
    liveness: Arc<L>,
    config: HeartbeatConfig,
    mut stop_rx: oneshot::Receiver<()>,
    ack_tx: oneshot::Sender<()>,
) {
    let mut interval = time::interval_at(Instant::now() + config.period, config.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // A dropped handle counts as a stop request too.
            _ = &mut stop_rx => break,
            _ = interval.tick() => {
                sweep(liveness.as_ref(), config.timeout).await;
            }
        }
    }

    info!("heartbeat monitor stopped");
    let _ = ack_tx.send(());
}
