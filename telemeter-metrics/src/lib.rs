//! Measurement recording and buffered delivery to a monitoring backend.
//!
//! Application code emits named, tagged, timestamped measurements through a
//! [`Telemeter`] and a [`Transmitter`] ships them to a monitoring backend.
//! The core of the crate is the [`BufferedTransmitter`], a decorator that sits
//! between the two: it accumulates measurements in a bounded buffer, flushes
//! them in a background thread on a wall-clock interval or as soon as a soft
//! occupancy limit is crossed, and rolls failed flushes back into the buffer.
//! Producers are never blocked and never observe delivery failures.
//!
//! Delivery is best effort: when the buffer's hard limit is reached, the
//! oldest measurements are evicted silently to bound memory.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use telemeter_metrics::{
//!     BufferConfig, BufferedTransmitter, DiscardTransmitter, TagMap, Telemeter, Transmitter,
//! };
//!
//! let buffered = Arc::new(BufferedTransmitter::new(
//!     Arc::new(DiscardTransmitter),
//!     BufferConfig::default(),
//! )?);
//!
//! let transmitter: Arc<dyn Transmitter> = buffered.clone();
//! let telemeter = Telemeter::new(transmitter);
//! telemeter.counter("requests").inc(TagMap::new());
//! telemeter.gauge("queue.depth").set(17.into(), TagMap::new());
//!
//! buffered.close();
//! # Ok::<(), telemeter_metrics::BufferError>(())
//! ```

#![warn(missing_docs)]

mod buffer;
mod buffered;
mod protocol;
mod stats;
mod telemeter;
mod transmitter;

pub use self::buffer::MeasurementBuffer;
pub use self::buffered::{BufferConfig, BufferError, BufferedTransmitter};
pub use self::protocol::{FiniteF64, Measurement, TagMap, TryFromFloatError};
pub use self::stats::BufferStats;
pub use self::telemeter::{Counter, Gauge, Telemeter, Timer, TimerGuard};
pub use self::transmitter::{DiscardTransmitter, TransmitError, Transmitter};
