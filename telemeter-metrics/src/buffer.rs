//! Bounded, insertion-ordered storage for measurements awaiting transmission.

use indexmap::IndexMap;

use crate::Measurement;

/// An insertion-ordered collection of unique measurements with a capacity
/// ceiling and FIFO eviction.
///
/// Uniqueness follows [`Measurement`] equality, i.e. `(name, value,
/// timestamp)`. Inserting a measurement that compares equal to a buffered one
/// does not grow the collection; the buffered entry keeps its position and tag
/// set, like an ordered map updating an existing key.
///
/// When an insert of a new measurement would exceed the capacity, the oldest
/// entry is removed first. Eviction is silent data loss by design and never an
/// error; callers that want to observe it can count the returned entries.
///
/// The buffer is not internally synchronized. [`BufferedTransmitter`] wraps it
/// in a mutex and owns all locking.
///
/// [`BufferedTransmitter`]: crate::BufferedTransmitter
#[derive(Debug)]
pub struct MeasurementBuffer {
    entries: IndexMap<Measurement, ()>,
    capacity: usize,
}

impl MeasurementBuffer {
    /// Creates an empty buffer holding at most `capacity` measurements.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts a measurement, evicting the oldest entry if the buffer is full.
    ///
    /// Returns the evicted measurement, if any. An insert that merely replaces
    /// an equal buffered measurement never evicts.
    pub fn insert(&mut self, measurement: Measurement) -> Option<Measurement> {
        if self.entries.contains_key(&measurement) {
            self.entries.insert(measurement, ());
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0).map(|(oldest, ())| oldest)
        } else {
            None
        };

        self.entries.insert(measurement, ());
        evicted
    }

    /// Detaches and returns all buffered measurements in insertion order,
    /// leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Measurement> {
        self.entries.drain(..).map(|(measurement, ())| measurement).collect()
    }

    /// Restores a previously drained batch underneath whatever accumulated
    /// since the drain.
    ///
    /// The batch becomes the older part of the buffer and the accumulated
    /// entries are re-applied on top through the regular insert path, so the
    /// combined contents obey the capacity and its FIFO eviction. Returns the
    /// number of evicted measurements.
    pub fn restore(&mut self, batch: Vec<Measurement>) -> usize {
        let newer = self.drain();

        let mut evicted = 0;
        for measurement in batch.into_iter().chain(newer) {
            if self.insert(measurement).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    /// The number of buffered measurements. Never exceeds the capacity.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The maximum number of measurements this buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of measurements that fit before the buffer starts evicting.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.entries.len()
    }
}
