//! Flat addressing of padded per-example slots.
//!
//! A padded batch stores `slots_per_example` positions for each of
//! `example_count` examples. [`FlatIndex`] maps an `(example, local)` pair to
//! one global position in `0..example_count * slots_per_example` so that all
//! slots of a batch can be gathered and scattered as one collection.
//!
//! Padding never receives a global index. A padding local index is `None`
//! internally and `-1` at the boundary; both map to `None`, so `-1` can never
//! alias the last slot of the previous example.

use super::error::Error;

/// Bijection between `(example, local slot)` and a flat global slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatIndex {
    example_count: usize,
    slots_per_example: usize,
}

impl FlatIndex {
    pub fn new(example_count: usize, slots_per_example: usize) -> Self {
        Self {
            example_count,
            slots_per_example,
        }
    }

    #[inline]
    pub fn example_count(&self) -> usize {
        self.example_count
    }

    #[inline]
    pub fn slots_per_example(&self) -> usize {
        self.slots_per_example
    }

    /// Total number of global slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.example_count * self.slots_per_example
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maps a local slot to its global index.
    ///
    /// Returns `None` for padding (`local == None`) and for any address
    /// outside the batch.
    #[inline]
    pub fn global(&self, example: usize, local: Option<usize>) -> Option<usize> {
        let local = local?;
        if example >= self.example_count || local >= self.slots_per_example {
            return None;
        }
        Some(example * self.slots_per_example + local)
    }

    /// Maps a boundary-convention local index (`-1` = padding) to a global index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] for indices below `-1` or at/after
    /// `slots_per_example`; `slot` is only used to label the error.
    pub fn global_from_sentinel(
        &self,
        example: usize,
        slot: usize,
        local: i64,
    ) -> Result<Option<usize>, Error> {
        match local {
            -1 => Ok(None),
            l if l < -1 || l as u64 >= self.slots_per_example as u64 => {
                Err(Error::invalid_index(example, slot, l))
            }
            l => self
                .global(example, Some(l as usize))
                .map(Some)
                .ok_or_else(|| Error::invalid_index(example, slot, l)),
        }
    }

    /// Inverse of [`global`](Self::global).
    #[inline]
    pub fn local(&self, global: usize) -> Option<(usize, usize)> {
        if global >= self.len() {
            return None;
        }
        Some((
            global / self.slots_per_example,
            global % self.slots_per_example,
        ))
    }
}
