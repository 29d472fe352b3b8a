//! The capability interface for delivering measurement batches.

use std::error::Error;
use std::sync::Arc;

use crate::Measurement;

/// Error returned when a transmitter fails to deliver a batch.
///
/// Callers only decide between commit and rollback and never inspect the
/// cause. The source is retained for logging.
#[derive(Debug, thiserror::Error)]
#[error("failed to transmit measurements")]
pub struct TransmitError {
    #[source]
    source: Box<dyn Error + Send + Sync>,
}

impl TransmitError {
    /// Creates a transmit error wrapping the underlying cause.
    pub fn new(source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// A destination capable of accepting a batch of measurements.
///
/// The batch is borrowed: a failed call leaves the caller owning the data, so
/// it can be rolled back or retried. Implementations must be callable from
/// multiple threads.
pub trait Transmitter: Send + Sync {
    /// Delivers the given measurements to the destination.
    fn publish(&self, measurements: &[Measurement]) -> Result<(), TransmitError>;
}

impl<T: Transmitter + ?Sized> Transmitter for Arc<T> {
    fn publish(&self, measurements: &[Measurement]) -> Result<(), TransmitError> {
        (**self).publish(measurements)
    }
}

/// A transmitter that accepts and drops every batch.
///
/// Useful as a stand-in when telemetry is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardTransmitter;

impl Transmitter for DiscardTransmitter {
    fn publish(&self, _measurements: &[Measurement]) -> Result<(), TransmitError> {
        Ok(())
    }
}
