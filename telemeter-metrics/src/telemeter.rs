//! Producer-facing facade for recording measurements.

use std::sync::Arc;
use std::time::Instant;

use crate::{FiniteF64, Measurement, TagMap, TransmitError, Transmitter};

/// The central entry point for recording telemetry in an application.
///
/// A telemeter publishes measurements to whatever [`Transmitter`] it is
/// configured with, typically a [`BufferedTransmitter`] in front of a network
/// sink. It merges a set of default tags into every measurement and hands out
/// typed metric handles: [`Counter`], [`Gauge`] and [`Timer`].
///
/// Recording is fire and forget: delivery failures never propagate to the
/// producer.
///
/// [`BufferedTransmitter`]: crate::BufferedTransmitter
#[derive(Clone)]
pub struct Telemeter {
    transmitter: Arc<dyn Transmitter>,
    default_tags: TagMap,
}

impl Telemeter {
    /// Creates a telemeter publishing to the given transmitter.
    pub fn new(transmitter: Arc<dyn Transmitter>) -> Self {
        Self::with_default_tags(transmitter, TagMap::new())
    }

    /// Like [`Self::new`], with tags that are merged into every measurement.
    ///
    /// Tags passed at record time take precedence over default tags with the
    /// same key.
    pub fn with_default_tags(transmitter: Arc<dyn Transmitter>, default_tags: TagMap) -> Self {
        Self {
            transmitter,
            default_tags,
        }
    }

    /// Records a single observation for `name`, captured now.
    pub fn record(&self, name: &str, value: FiniteF64, tags: TagMap) {
        let measurement = Measurement::new(name, value, self.build_tags(tags));
        if let Err(error) = self.transmitter.publish(std::slice::from_ref(&measurement)) {
            telemeter_log::debug!(
                error = &error as &dyn std::error::Error,
                "measurement dropped"
            );
        }
    }

    /// Returns a counter handle for `name`.
    pub fn counter<'a>(&'a self, name: &str) -> Counter<'a> {
        Counter {
            telemeter: self,
            name: name.to_owned(),
        }
    }

    /// Returns a gauge handle for `name`.
    pub fn gauge<'a>(&'a self, name: &str) -> Gauge<'a> {
        Gauge {
            telemeter: self,
            name: name.to_owned(),
        }
    }

    /// Returns a timer handle for `name`.
    pub fn timer<'a>(&'a self, name: &str) -> Timer<'a> {
        Timer {
            telemeter: self,
            name: name.to_owned(),
        }
    }

    fn build_tags(&self, tags: TagMap) -> TagMap {
        if self.default_tags.is_empty() {
            return tags;
        }
        let mut merged = self.default_tags.clone();
        merged.extend(tags);
        merged
    }
}

impl Transmitter for Telemeter {
    /// Forwards a batch to the configured transmitter, without tag merging.
    fn publish(&self, measurements: &[Measurement]) -> Result<(), TransmitError> {
        self.transmitter.publish(measurements)
    }
}

impl std::fmt::Debug for Telemeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemeter")
            .field("default_tags", &self.default_tags)
            .finish()
    }
}

/// An increment/decrement metric. Useful for counting things.
#[derive(Debug)]
pub struct Counter<'a> {
    telemeter: &'a Telemeter,
    name: String,
}

impl Counter<'_> {
    /// Records an increment by one.
    pub fn inc(&self, tags: TagMap) {
        self.telemeter.record(&self.name, 1.into(), tags);
    }

    /// Records a decrement by one.
    pub fn dec(&self, tags: TagMap) {
        self.telemeter.record(&self.name, (-1).into(), tags);
    }
}

/// An arbitrary-value metric.
#[derive(Debug)]
pub struct Gauge<'a> {
    telemeter: &'a Telemeter,
    name: String,
}

impl Gauge<'_> {
    /// Records the current value of the gauge.
    pub fn set(&self, value: FiniteF64, tags: TagMap) {
        self.telemeter.record(&self.name, value, tags);
    }
}

/// An elapsed-time metric.
///
/// ```
/// # use std::sync::Arc;
/// # use telemeter_metrics::{DiscardTransmitter, TagMap, Telemeter};
/// let telemeter = Telemeter::new(Arc::new(DiscardTransmitter));
/// let timer = telemeter.timer("db.query");
/// {
///     let _guard = timer.start(TagMap::new());
///     // timed work
/// } // elapsed seconds are recorded here
/// ```
#[derive(Debug)]
pub struct Timer<'a> {
    telemeter: &'a Telemeter,
    name: String,
}

impl Timer<'_> {
    /// Starts timing a scope.
    ///
    /// The returned guard records the elapsed wall-clock seconds when it is
    /// dropped, on every exit path.
    pub fn start(&self, tags: TagMap) -> TimerGuard<'_> {
        TimerGuard {
            telemeter: self.telemeter,
            name: &self.name,
            tags: Some(tags),
            start: Instant::now(),
        }
    }
}

/// Scope guard returned by [`Timer::start`].
#[derive(Debug)]
pub struct TimerGuard<'a> {
    telemeter: &'a Telemeter,
    name: &'a str,
    tags: Option<TagMap>,
    start: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        if let Some(value) = FiniteF64::new(elapsed) {
            self.telemeter
                .record(self.name, value, self.tags.take().unwrap_or_default());
        }
    }
}
