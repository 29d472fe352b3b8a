//! Buffering decorator that flushes measurements to a downstream transmitter
//! in the background.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::stats::SharedStats;
use crate::{BufferStats, Measurement, MeasurementBuffer, TransmitError, Transmitter};

/// Buffer occupancy from which a flush is requested out of band, in percent of
/// the hard limit.
const SOFT_LIMIT_PERCENT: usize = 90;

/// Any error that may occur while setting up a [`BufferedTransmitter`].
///
/// Configuration errors are fatal at construction time and never retried.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The configured buffer size is zero.
    #[error("max_buffer_size must be greater than 0")]
    InvalidBufferSize,
    /// The configured flush interval is zero.
    #[error("max_flush_interval_ms must be greater than 0")]
    InvalidFlushInterval,
    /// The flusher thread could not be spawned.
    #[error("failed to spawn flusher thread")]
    SpawnFailed(#[source] std::io::Error),
}

/// Parameters used by the [`BufferedTransmitter`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum number of measurements to buffer.
    ///
    /// This is the hard limit: once reached, every further measurement evicts
    /// the oldest buffered one. At 90% occupancy (the soft limit) the flusher
    /// is woken early to drain the buffer before evictions start.
    ///
    /// Defaults to `1000`.
    pub max_buffer_size: usize,

    /// The longest time in milliseconds that buffered measurements wait before
    /// being flushed downstream.
    ///
    /// Defaults to `10_000`, i.e. 10 seconds.
    pub max_flush_interval_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1000,
            max_flush_interval_ms: 10_000,
        }
    }
}

impl BufferConfig {
    fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.max_flush_interval_ms)
    }
}

/// Wakeups for the flusher thread.
///
/// Signaling is edge-triggered and lossy: multiple soft-limit crossings before
/// the flusher wakes collapse into a single flush, which always drains the
/// entire buffer.
enum Signal {
    Flush,
    Shutdown,
}

/// A decorator that buffers measurements and transmits them in the background.
///
/// Measurements accumulate in a bounded buffer and are flushed to the wrapped
/// downstream transmitter either periodically or as soon as the buffer crosses
/// its soft limit. Producers are never blocked on the network and never
/// observe delivery failures: a failed flush is logged and rolled back into
/// the buffer, merged with whatever was published during the attempt, to be
/// retried on the next wakeup.
///
/// Delivery is best effort. When the hard limit is reached the oldest
/// measurements are evicted silently; [`BufferedTransmitter::stats`] exposes
/// counters for evictions and failed flushes.
///
/// The flusher thread runs for the lifetime of the transmitter. Call
/// [`close`](Self::close) for an orderly shutdown with a final flush; dropping
/// the transmitter without closing ends the thread the same way.
pub struct BufferedTransmitter {
    inner: Arc<Inner>,
    signal: Sender<Signal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferedTransmitter {
    /// Creates a buffered transmitter in front of `downstream` and starts its
    /// flusher thread.
    pub fn new(downstream: Arc<dyn Transmitter>, config: BufferConfig) -> Result<Self, BufferError> {
        if config.max_buffer_size == 0 {
            return Err(BufferError::InvalidBufferSize);
        }
        if config.max_flush_interval_ms == 0 {
            return Err(BufferError::InvalidFlushInterval);
        }

        let inner = Arc::new(Inner {
            downstream,
            buffer: Mutex::new(MeasurementBuffer::new(config.max_buffer_size)),
            flush_gate: Mutex::new(()),
            stats: SharedStats::default(),
        });

        // Capacity 1 keeps the soft-limit signal edge-triggered: a pending
        // wakeup already covers any further crossing.
        let (signal_tx, signal_rx) = crossbeam_channel::bounded(1);

        let worker = std::thread::Builder::new()
            .name("telemeter-flusher".to_owned())
            .spawn({
                let inner = Arc::clone(&inner);
                let interval = config.flush_interval();
                move || run_flush_loop(&inner, &signal_rx, interval)
            })
            .map_err(BufferError::SpawnFailed)?;

        Ok(Self {
            inner,
            signal: signal_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Flushes all buffered measurements to the downstream transmitter.
    ///
    /// Called by the flusher thread on every wakeup, and callable externally
    /// at any time. Never fails observably: downstream errors are logged and
    /// the batch is rolled back into the buffer. Concurrent invocations are
    /// serialized.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// The number of measurements currently buffered.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// The number of measurements that can be buffered before eviction
    /// starts.
    pub fn remaining_capacity(&self) -> usize {
        self.inner.buffer.lock().remaining_capacity()
    }

    /// A snapshot of the delivery counters.
    pub fn stats(&self) -> BufferStats {
        self.inner.stats.snapshot()
    }

    /// Shuts the transmitter down, flushing buffered measurements one final
    /// time and joining the flusher thread.
    pub fn close(&self) {
        self.signal.send(Signal::Shutdown).ok();
        if let Some(worker) = self.worker.lock().take() {
            worker.join().ok();
        }
    }
}

impl Transmitter for BufferedTransmitter {
    /// Buffers the measurements; never blocks on the network, never errors.
    fn publish(&self, measurements: &[Measurement]) -> Result<(), TransmitError> {
        let soft_limit_reached = {
            let mut buffer = self.inner.buffer.lock();
            for measurement in measurements {
                if let Some(evicted) = buffer.insert(measurement.clone()) {
                    self.inner.stats.evicted.fetch_add(1, Relaxed);
                    telemeter_log::trace!(
                        name = evicted.name(),
                        "buffer full, dropping oldest measurement"
                    );
                }
            }
            self.inner
                .stats
                .published
                .fetch_add(measurements.len() as u64, Relaxed);
            100 * buffer.len() >= SOFT_LIMIT_PERCENT * buffer.capacity()
        };

        if soft_limit_reached {
            // A full channel means a wakeup is already pending.
            self.signal.try_send(Signal::Flush).ok();
        }

        Ok(())
    }
}

impl std::fmt::Debug for BufferedTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedTransmitter")
            .field("buffered", &self.buffered())
            .field("stats", &self.stats())
            .finish()
    }
}

struct Inner {
    downstream: Arc<dyn Transmitter>,
    buffer: Mutex<MeasurementBuffer>,
    /// Serializes flush invocations end to end, so a failed flush can never
    /// roll back over a concurrent flush's detach.
    flush_gate: Mutex<()>,
    stats: SharedStats,
}

impl Inner {
    fn flush(&self) {
        let _gate = self.flush_gate.lock();

        // Detach under the buffer lock, transmit without it, so producers
        // keep publishing while the downstream call is in flight.
        let batch = self.buffer.lock().drain();
        if batch.is_empty() {
            return;
        }

        match self.downstream.publish(&batch) {
            Ok(()) => {
                self.stats.flushed.fetch_add(batch.len() as u64, Relaxed);
                telemeter_log::debug!("{} measurements published", batch.len());
            }
            Err(error) => {
                self.stats.failed_flushes.fetch_add(1, Relaxed);
                telemeter_log::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to publish measurements, keeping them buffered"
                );

                let evicted = self.buffer.lock().restore(batch);
                if evicted > 0 {
                    self.stats.evicted.fetch_add(evicted as u64, Relaxed);
                    telemeter_log::debug!(
                        "dropped {evicted} oldest measurements while restoring failed flush"
                    );
                }
            }
        }
    }
}

fn run_flush_loop(inner: &Inner, signal: &Receiver<Signal>, interval: Duration) {
    telemeter_log::trace!("flusher thread started");

    loop {
        match signal.recv_timeout(interval) {
            Ok(Signal::Flush) | Err(RecvTimeoutError::Timeout) => inner.flush(),
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // One final drain so an orderly shutdown does not leave data behind.
    inner.flush();
    telemeter_log::trace!("flusher thread stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::RwLock;
    use std::time::Instant;

    use chrono::{TimeZone, Utc};
    use similar_asserts::assert_eq;

    use crate::TagMap;

    use super::*;

    #[derive(Clone, Default)]
    struct TestTransmitter {
        received: Arc<RwLock<Vec<Measurement>>>,
        calls: Arc<AtomicUsize>,
        reject_all: Arc<AtomicBool>,
    }

    impl TestTransmitter {
        fn received_count(&self) -> usize {
            self.received.read().unwrap().len()
        }

        fn received_names(&self) -> Vec<String> {
            self.received
                .read()
                .unwrap()
                .iter()
                .map(|m| m.name().to_owned())
                .collect()
        }
    }

    impl Transmitter for TestTransmitter {
        fn publish(&self, measurements: &[Measurement]) -> Result<(), TransmitError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.reject_all.load(Ordering::Relaxed) {
                return Err(TransmitError::new("rejected"));
            }
            self.received.write().unwrap().extend_from_slice(measurements);
            Ok(())
        }
    }

    /// A transmitter that parks in `publish` until released, then fails.
    struct BlockingTransmitter {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl Transmitter for BlockingTransmitter {
        fn publish(&self, _measurements: &[Measurement]) -> Result<(), TransmitError> {
            self.entered.send(()).ok();
            self.release.recv().ok();
            Err(TransmitError::new("rejected"))
        }
    }

    fn config(max_buffer_size: usize, max_flush_interval_ms: u64) -> BufferConfig {
        BufferConfig {
            max_buffer_size,
            max_flush_interval_ms,
        }
    }

    fn measurement(name: &str, secs: i64) -> Measurement {
        let timestamp = Utc.timestamp_opt(secs, 0).unwrap();
        Measurement::at(name, 1.into(), TagMap::new(), timestamp)
    }

    fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_invalid_config() {
        let downstream: Arc<dyn Transmitter> = Arc::new(TestTransmitter::default());

        let result = BufferedTransmitter::new(Arc::clone(&downstream), config(0, 1000));
        assert!(matches!(result, Err(BufferError::InvalidBufferSize)));

        let result = BufferedTransmitter::new(downstream, config(10, 0));
        assert!(matches!(result, Err(BufferError::InvalidFlushInterval)));
    }

    #[test]
    fn test_soft_limit_triggers_flush() {
        telemeter_test::setup();

        let downstream = TestTransmitter::default();
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(10, 60_000)).unwrap();

        let measurements: Vec<_> = (0..9i64).map(|i| measurement("m", i)).collect();
        transmitter.publish(&measurements).unwrap();

        // 90% occupancy must flush well before the 60s interval.
        assert!(wait_until(Duration::from_secs(2), || {
            downstream.received_count() == 9
        }));
        assert_eq!(transmitter.buffered(), 0);
        assert_eq!(transmitter.remaining_capacity(), 10);
    }

    #[test]
    fn test_periodic_flush() {
        telemeter_test::setup();

        let downstream = TestTransmitter::default();
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(10, 5)).unwrap();

        transmitter
            .publish(&[measurement("a", 1), measurement("b", 2)])
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            downstream.received_count() == 2
        }));
        assert_eq!(downstream.received_names(), ["a", "b"]);
        assert_eq!(transmitter.remaining_capacity(), 10);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let downstream = TestTransmitter::default();
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(10, 60_000)).unwrap();

        transmitter.flush();
        assert_eq!(downstream.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_rollback_on_failure() {
        telemeter_test::setup();

        let downstream = TestTransmitter::default();
        downstream.reject_all.store(true, Ordering::Relaxed);
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(10, 60_000)).unwrap();

        transmitter
            .publish(&[measurement("a", 1), measurement("b", 2)])
            .unwrap();
        assert_eq!(transmitter.remaining_capacity(), 8);

        transmitter.flush();

        // The failed batch stays buffered and the failure is not surfaced.
        assert_eq!(transmitter.remaining_capacity(), 8);
        assert_eq!(transmitter.buffered(), 2);
        assert_eq!(transmitter.stats().failed_flushes, 1);
        assert_eq!(transmitter.stats().flushed, 0);

        // The next flush retries the same batch.
        downstream.reject_all.store(false, Ordering::Relaxed);
        transmitter.flush();
        assert_eq!(downstream.received_names(), ["a", "b"]);
        assert_eq!(transmitter.buffered(), 0);
        assert_eq!(transmitter.stats().flushed, 2);
    }

    #[test]
    fn test_rollback_merges_concurrent_publishes() {
        telemeter_test::setup();

        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let downstream = BlockingTransmitter {
            entered: entered_tx,
            release: release_rx,
        };

        let transmitter = Arc::new(
            BufferedTransmitter::new(Arc::new(downstream), config(10, 60_000)).unwrap(),
        );

        transmitter
            .publish(&[measurement("a", 1), measurement("b", 2)])
            .unwrap();

        let flusher = {
            let transmitter = Arc::clone(&transmitter);
            std::thread::spawn(move || transmitter.flush())
        };

        // Publish while the downstream call is in flight, then let it fail.
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        transmitter.publish(&[measurement("c", 3)]).unwrap();
        release_tx.send(()).unwrap();
        flusher.join().unwrap();

        // The failed batch is restored underneath the concurrent publish.
        assert_eq!(transmitter.buffered(), 3);
        assert_eq!(transmitter.remaining_capacity(), 7);
    }

    #[test]
    fn test_eviction_under_failing_downstream() {
        telemeter_test::setup();

        let downstream = TestTransmitter::default();
        downstream.reject_all.store(true, Ordering::Relaxed);
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(3, 60_000)).unwrap();

        let measurements: Vec<_> = (0..4i64).map(|i| measurement("m", i)).collect();
        transmitter.publish(&measurements).unwrap();

        assert_eq!(transmitter.buffered(), 3);
        assert_eq!(transmitter.remaining_capacity(), 0);
        assert_eq!(transmitter.stats().evicted, 1);
    }

    #[test]
    fn test_duplicate_measurements_collapse() {
        let downstream = TestTransmitter::default();
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(10, 60_000)).unwrap();

        let frozen = measurement("cpu.load", 42);
        transmitter.publish(&[frozen.clone()]).unwrap();
        transmitter.publish(&[frozen]).unwrap();

        assert_eq!(transmitter.buffered(), 1);
        assert_eq!(transmitter.stats().published, 2);
    }

    #[test]
    fn test_close_flushes_remaining() {
        telemeter_test::setup();

        let downstream = TestTransmitter::default();
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(10, 60_000)).unwrap();

        transmitter
            .publish(&[measurement("a", 1), measurement("b", 2)])
            .unwrap();
        transmitter.close();

        assert_eq!(downstream.received_names(), ["a", "b"]);
    }

    #[test]
    fn test_drop_flushes_remaining() {
        telemeter_test::setup();

        let downstream = TestTransmitter::default();
        let transmitter =
            BufferedTransmitter::new(Arc::new(downstream.clone()), config(10, 60_000)).unwrap();

        transmitter.publish(&[measurement("a", 1)]).unwrap();
        drop(transmitter);

        // Dropping without `close` disconnects the signal channel; the
        // flusher drains the buffer once more on its way out.
        assert!(wait_until(Duration::from_secs(2), || {
            downstream.received_count() == 1
        }));
    }
}
