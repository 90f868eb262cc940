// SPDX-License-Identifier: Apache-2.0

//! Bounded median filter shared by the tachometer and potentiometer paths.

use crate::error::Fault;

/// Smallest supported [`MedianBuffer`] capacity
pub const MIN_CAPACITY: u8 = 3;
/// Largest supported [`MedianBuffer`] capacity
pub const MAX_CAPACITY: u8 = 16;

/// A stored measurement and its rank in the insertion order.
#[derive(Default, Debug, Eq, PartialEq, Copy, Clone)]
struct Sample {
    /// Measured value
    value: u16,
    /// Position of this sample in [`MedianBuffer::insertion_order`]; 0 is the oldest
    age: u8,
}

/// Sliding window of the most recent samples, kept sorted so the median is a single index.
///
/// Once the buffer is full, every insertion evicts the least recently inserted sample. All
/// operations are O(capacity), and capacity never exceeds [`MAX_CAPACITY`].
#[derive(Debug, Clone)]
pub struct MedianBuffer {
    /// Maximum number of samples, fixed at construction
    capacity: u8,
    /// Number of samples currently stored
    len: u8,
    /// Stored samples in ascending order of value
    values: [Sample; MAX_CAPACITY as usize],
    /// Indices into `values`, oldest sample first
    insertion_order: [u8; MAX_CAPACITY as usize],
}

impl MedianBuffer {
    /// Create an empty buffer holding at most `capacity` samples.
    ///
    /// Fails with [`Fault::FilterCapacity`] unless `capacity` is within
    /// [`MIN_CAPACITY`]..=[`MAX_CAPACITY`].
    pub const fn new(capacity: u8) -> Result<Self, Fault> {
        if capacity < MIN_CAPACITY || capacity > MAX_CAPACITY {
            return Err(Fault::FilterCapacity(capacity));
        }
        Ok(Self {
            capacity,
            len: 0,
            values: [Sample { value: 0, age: 0 }; MAX_CAPACITY as usize],
            insertion_order: [0; MAX_CAPACITY as usize],
        })
    }

    /// Maximum number of samples held
    pub fn capacity(&self) -> u8 {
        self.capacity
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// No sample has been inserted yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stored values in ascending order
    pub fn values(&self) -> impl Iterator<Item = u16> + '_ {
        self.values[..self.len()].iter().map(|sample| sample.value)
    }

    /// Insert a new sample, evicting the oldest one first if the buffer is full.
    pub fn insert(&mut self, value: u16) {
        if self.len == self.capacity {
            self.evict_oldest();
        }

        // Append, then sink the new sample into place. Every swap moves one sample up a slot and
        // the new one down a slot, so their FIFO entries follow them.
        let mut slot = self.len();
        self.values[slot] = Sample {
            value,
            age: self.len,
        };
        self.insertion_order[slot] = self.len;
        while slot > 0 && self.values[slot].value < self.values[slot - 1].value {
            self.insertion_order[self.values[slot - 1].age as usize] += 1;
            self.insertion_order[self.values[slot].age as usize] -= 1;
            self.values.swap(slot - 1, slot);
            slot -= 1;
        }
        self.len += 1;
    }

    /// Median of the stored samples: the upper middle element for even counts.
    ///
    /// Returns [`None`] only before the first insertion. Owners seed their buffers at creation, so
    /// this does not happen in practice.
    pub fn median(&self) -> Option<u16> {
        if self.is_empty() {
            None
        } else {
            Some(self.values[self.len() / 2].value)
        }
    }

    /// Remove the least recently inserted sample.
    fn evict_oldest(&mut self) {
        let len = self.len();
        let oldest = self.insertion_order[0] as usize;

        // Close the gap; each shifted sample now sits one slot lower
        self.values.copy_within(oldest + 1..len, oldest);
        for slot in oldest..len - 1 {
            self.insertion_order[self.values[slot].age as usize] -= 1;
        }

        // Drop the head of the FIFO; every remaining sample moves up one rank
        self.insertion_order.copy_within(1..len, 0);
        self.len -= 1;
        for sample in &mut self.values[..len - 1] {
            sample.age -= 1;
        }
    }

    /// Both index structures agree and values are sorted.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let stored = &self.values[..self.len()];
        let sorted = stored.windows(2).all(|pair| pair[0].value <= pair[1].value);
        let linked = stored
            .iter()
            .enumerate()
            .all(|(slot, sample)| self.insertion_order[sample.age as usize] as usize == slot);
        sorted && linked
    }
}
