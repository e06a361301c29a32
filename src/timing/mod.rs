//! Raw and server-synced time with nanosecond precision
//!
//! Every player runs its own uncorrected monotonic clock. The [`Clock`]
//! carries a signed offset estimated from timestamped probe exchanges with
//! the coordinator; `synced_time` is the player's best estimate of the
//! coordinator's clock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{NetworkError, SyncError};
use crate::protocol::{TimeSyncRequest, TimeSyncResponse};

/// A source of coordinator-frame time, injected into the streamer and the
/// chunk scheduler so both can be driven by a manual clock in tests.
pub trait TimeSource: Send + Sync {
    /// Current time in the coordinator's clock frame, in nanoseconds
    fn synced_time(&self) -> i64;
}

/// Boundary to the coordinator for time sync probes: the client sends its
/// local send timestamp, the coordinator echoes it together with its own
/// receive and send timestamps.
pub trait TimeSyncExchange: Send + Sync {
    fn exchange(&self, request: TimeSyncRequest) -> Result<TimeSyncResponse, NetworkError>;
}

/// Monotonic clock plus the offset to the coordinator's clock
pub struct Clock {
    epoch: Instant,
    offset: Mutex<i64>,
    probes: Mutex<ProbeBatch>,
}

struct ProbeBatch {
    offsets: Vec<i64>,
    target: usize,
    published: bool,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: Mutex::new(0),
            probes: Mutex::new(ProbeBatch {
                offsets: Vec::new(),
                target: 0,
                published: true,
            }),
        }
    }

    /// Local monotonic time in nanoseconds, not synced to the coordinator
    pub fn raw_time(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }

    /// Current clock offset in nanoseconds
    pub fn offset(&self) -> i64 {
        *self.offset.lock()
    }

    pub fn set_offset(&self, offset: i64) {
        *self.offset.lock() = offset;
    }

    /// Start a new probe batch, discarding any unpublished probes
    pub fn begin_sync(&self, cycles: usize) {
        let mut probes = self.probes.lock();
        probes.offsets = Vec::with_capacity(cycles);
        probes.target = cycles;
        probes.published = false;
    }

    /// Record the four timestamps of one completed probe cycle.
    ///
    /// Once the whole batch has arrived the mean of all per-cycle estimates
    /// is published as the new offset.
    pub fn record_probe(&self, client_send: i64, server_recv: i64, server_send: i64, client_recv: i64) {
        tracing::trace!(
            client_send,
            server_recv,
            server_send,
            client_recv,
            "recording time sync probe"
        );

        let estimate = ((server_recv - client_send) + (server_send - client_recv)) / 2;

        let mut probes = self.probes.lock();
        probes.offsets.push(estimate);
        if probes.offsets.len() == probes.target {
            probes.published = true;
            let offset = mean_offset(&probes.offsets);
            drop(probes);
            self.set_offset(offset);
            tracing::debug!(offset, "time synced");
        }
    }

    /// Publish the mean of the probes that actually arrived.
    ///
    /// Lost cycles are simply absent from the average. If no probe at all
    /// completed, the previous offset stays in effect.
    pub fn finish_sync(&self) {
        let mut probes = self.probes.lock();
        if probes.published {
            return;
        }
        probes.published = true;
        if probes.offsets.is_empty() {
            tracing::warn!("time sync run completed without any probes, keeping previous offset");
            return;
        }
        let completed = probes.offsets.len();
        let offset = mean_offset(&probes.offsets);
        drop(probes);
        self.set_offset(offset);
        tracing::debug!(offset, completed, "time synced from partial batch");
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for Clock {
    fn synced_time(&self) -> i64 {
        self.raw_time() + self.offset()
    }
}

/// Summed in i128 so a batch of large nanosecond offsets cannot overflow
fn mean_offset(offsets: &[i64]) -> i64 {
    let sum: i128 = offsets.iter().map(|&o| i128::from(o)).sum();
    (sum / offsets.len() as i128) as i64
}

/// Run one full time sync: `cycles` probe exchanges spaced by `cycle_delay`.
///
/// Individual probe failures are logged and skipped; the offset is derived
/// from whatever probes completed. Fails only when not a single probe made
/// it, in which case the previous offset stays in effect.
pub fn sync_once(
    clock: &Clock,
    transport: &dyn TimeSyncExchange,
    cycles: usize,
    cycle_delay: Duration,
) -> Result<(), SyncError> {
    tracing::info!(cycles, "syncing time");
    clock.begin_sync(cycles);
    let mut completed = 0usize;
    for _ in 0..cycles {
        let request = TimeSyncRequest {
            client_send: clock.raw_time(),
        };
        match transport.exchange(request) {
            Ok(response) => {
                let client_recv = clock.raw_time();
                clock.record_probe(
                    response.client_send,
                    response.server_recv,
                    response.server_send,
                    client_recv,
                );
                completed += 1;
            }
            Err(e) => tracing::warn!("failed to exchange time sync probe: {}", e),
        }
        thread::sleep(cycle_delay);
    }
    clock.finish_sync();
    if completed == 0 {
        return Err(SyncError::NoProbes);
    }
    Ok(())
}

/// Spawn the background sync loop: one run at startup, then one per
/// `interval` to recalibrate offset drift. Runs for the process lifetime.
pub fn run_sync_loop(
    clock: Arc<Clock>,
    transport: Arc<dyn TimeSyncExchange>,
    interval: Duration,
    cycles: usize,
    cycle_delay: Duration,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("time-sync".to_string())
        .spawn(move || loop {
            if let Err(e) = sync_once(&clock, transport.as_ref(), cycles, cycle_delay) {
                tracing::warn!("time sync run failed: {}", e);
            }
            thread::sleep(interval);
        })
        .expect("failed to spawn time-sync thread")
}

/// Coordinator-side answer to a probe. The coordinator's own clock is the
/// reference frame, so raw timestamps are used directly.
pub fn answer_probe(clock: &Clock, request: &TimeSyncRequest) -> TimeSyncResponse {
    let server_recv = clock.raw_time();
    TimeSyncResponse {
        client_send: request.client_send,
        server_recv,
        server_send: clock.raw_time(),
    }
}

/// Manually advanced time source for deterministic tests and demos
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: i64) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn synced_time(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic exchange with a symmetric network delay and a fixed skew of
    /// the server clock against the client clock.
    struct FakeExchange {
        delay: i64,
        skew: i64,
    }

    impl TimeSyncExchange for FakeExchange {
        fn exchange(&self, request: TimeSyncRequest) -> Result<TimeSyncResponse, NetworkError> {
            let server_recv = request.client_send + self.delay + self.skew;
            Ok(TimeSyncResponse {
                client_send: request.client_send,
                server_recv,
                server_send: server_recv,
            })
        }
    }

    fn run_probes(clock: &Clock, exchange: &FakeExchange, cycles: usize) {
        clock.begin_sync(cycles);
        for _ in 0..cycles {
            let client_send = clock.raw_time();
            let response = exchange.exchange(TimeSyncRequest { client_send }).unwrap();
            // the reply arrives after the full round trip
            let client_recv = client_send + 2 * exchange.delay;
            clock.record_probe(
                response.client_send,
                response.server_recv,
                response.server_send,
                client_recv,
            );
        }
        clock.finish_sync();
    }

    #[test]
    fn symmetric_delay_without_skew_converges_to_zero() {
        let clock = Clock::new();
        run_probes(&clock, &FakeExchange { delay: 250_000, skew: 0 }, 100);
        assert_eq!(clock.offset(), 0);
    }

    #[test]
    fn skew_is_recovered_exactly() {
        let clock = Clock::new();
        let skew = 7_000_000;
        run_probes(&clock, &FakeExchange { delay: 0, skew }, 100);
        assert_eq!(clock.offset(), skew);
    }

    #[test]
    fn skew_is_recovered_under_symmetric_delay() {
        let clock = Clock::new();
        let skew = -3_000_000;
        run_probes(&clock, &FakeExchange { delay: 400_000, skew }, 100);
        assert_eq!(clock.offset(), skew);
    }

    #[test]
    fn partial_batch_still_publishes() {
        let clock = Clock::new();
        clock.set_offset(42);
        clock.begin_sync(10);
        // only 3 of 10 probes arrive
        for _ in 0..3 {
            let cs = clock.raw_time();
            clock.record_probe(cs, cs + 1000, cs + 1000, cs);
        }
        clock.finish_sync();
        assert_eq!(clock.offset(), 1000);
    }

    #[test]
    fn empty_batch_keeps_previous_offset() {
        let clock = Clock::new();
        clock.set_offset(1234);
        clock.begin_sync(10);
        clock.finish_sync();
        assert_eq!(clock.offset(), 1234);
    }

    #[test]
    fn synced_time_applies_offset() {
        let clock = Clock::new();
        clock.set_offset(1_000_000_000);
        let raw = clock.raw_time();
        let synced = clock.synced_time();
        assert!(synced - raw >= 1_000_000_000);
        // raw time advances between the two reads, but by far less than 1 ms
        assert!(synced - raw < 1_001_000_000);
    }

    #[test]
    fn answer_probe_echoes_client_send() {
        let clock = Clock::new();
        let response = answer_probe(&clock, &TimeSyncRequest { client_send: 99 });
        assert_eq!(response.client_send, 99);
        assert!(response.server_recv <= response.server_send);
    }
}
