//! Heartbeat driver: periodic liveness pulses and dead-peer detection.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{protocol, writer::FrameWriter};

const MIN_POLL: Duration = Duration::from_millis(1);

/// Liveness state shared between the frame reader and the heartbeat driver.
#[derive(Debug, Default)]
pub struct HeartbeatState {
    last_sequence: AtomicU64,
    ack_pending: AtomicBool,
    requested: AtomicBool,
}

impl HeartbeatState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last sequence number seen on the event stream.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Store the latest sequence number.
    pub fn set_sequence(&self, sequence: u64) {
        self.last_sequence.store(sequence, Ordering::Release);
    }

    /// Whether the last heartbeat is still unacknowledged.
    #[must_use]
    pub fn ack_pending(&self) -> bool {
        self.ack_pending.load(Ordering::Acquire)
    }

    /// Record a heartbeat acknowledgment.
    pub fn acknowledge(&self) {
        self.ack_pending.store(false, Ordering::Release);
    }

    /// Ask the driver to beat on its next tick.
    pub fn request_immediate(&self) {
        self.requested.store(true, Ordering::Release);
    }

    fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    fn mark_sent(&self) {
        self.ack_pending.store(true, Ordering::Release);
    }

    /// Clear per-connection flags. The sequence is kept.
    pub fn reset_connection(&self) {
        self.ack_pending.store(false, Ordering::Release);
        self.requested.store(false, Ordering::Release);
    }
}

/// Sent by the driver when it stops for a reason the reader must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSignal {
    /// An interval passed without an acknowledgment.
    DeadPeer,
    /// A heartbeat could not be written.
    WriteFailed,
}

/// Why the driver loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    Stopped,
    DeadPeer,
    WriteFailed,
}

/// Heartbeat schedule.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatTiming {
    /// Time between heartbeats.
    pub interval: Duration,
    /// Delay before the first heartbeat, at most `interval`.
    pub first_delay: Duration,
    /// How often the loop wakes to check what is due. Raised to 1 ms if lower.
    pub poll: Duration,
}

impl HeartbeatTiming {
    /// Schedule with a random first delay in `[0, interval)`.
    #[must_use]
    pub fn jittered(interval: Duration, poll: Duration) -> Self {
        let jitter: f64 = rand::random();
        Self {
            interval,
            first_delay: interval.mul_f64(jitter),
            poll,
        }
    }
}

/// A running heartbeat loop bound to one connection.
pub struct HeartbeatDriver {
    cancel: CancellationToken,
    handle: JoinHandle<HeartbeatExit>,
}

impl HeartbeatDriver {
    /// Start beating on `writer`.
    pub fn spawn(
        writer: Arc<dyn FrameWriter>,
        state: Arc<HeartbeatState>,
        timing: HeartbeatTiming,
        signals: mpsc::UnboundedSender<ConnectionSignal>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(writer, state, timing, signals, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stop the loop and wait until it has exited.
    pub async fn stop(self) -> HeartbeatExit {
        self.cancel.cancel();
        match self.handle.await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::error!("Heartbeat task failed: {e}");
                HeartbeatExit::Stopped
            }
        }
    }
}

async fn run(
    writer: Arc<dyn FrameWriter>,
    state: Arc<HeartbeatState>,
    timing: HeartbeatTiming,
    signals: mpsc::UnboundedSender<ConnectionSignal>,
    cancel: CancellationToken,
) -> HeartbeatExit {
    let mut ticker = time::interval(timing.poll.max(MIN_POLL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_due = Instant::now() + timing.first_delay.min(timing.interval);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatExit::Stopped,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let due = now >= next_due;

        if state.take_request() || (due && !state.ack_pending()) {
            let sequence = state.sequence();
            let sent = match protocol::heartbeat(sequence).to_text() {
                Ok(text) => writer.send_text(text).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                tracing::warn!("Failed to send heartbeat: {e}");
                notify(&signals, ConnectionSignal::WriteFailed);
                return HeartbeatExit::WriteFailed;
            }
            tracing::debug!(seq = sequence, "Heartbeat sent");
            state.mark_sent();
            next_due = now + timing.interval;
        } else if due {
            tracing::warn!(
                interval_ms = timing.interval.as_millis(),
                "No heartbeat acknowledgment, connection presumed dead"
            );
            notify(&signals, ConnectionSignal::DeadPeer);
            return HeartbeatExit::DeadPeer;
        }
    }
}

fn notify(signals: &mpsc::UnboundedSender<ConnectionSignal>, signal: ConnectionSignal) {
    if signals.send(signal).is_err() {
        tracing::debug!(signal = ?signal, "Connection reader already gone");
    }
}
