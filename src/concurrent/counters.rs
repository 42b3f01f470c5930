//! Read-only view over the CnC file's counters metadata/values regions.
//!
//! Counters are written by the driver (and sometimes other clients); this
//! crate only ever reads them. A counter's numeric value lives in its own
//! cache-line-aligned slot in the values buffer so independent counters
//! never false-share a cache line; its label and type live in a
//! fixed-stride record in the metadata buffer at the same counter id.

use crate::concurrent::AtomicBuffer;
use crate::util::bit::CACHE_LINE_LENGTH;
use crate::util::{AeronError, IndexT, Result};

/// Layout constants for a single counters-metadata record.
pub mod metadata_descriptor {
    use crate::util::bit::CACHE_LINE_LENGTH;
    use crate::util::IndexT;

    /// A counter id with no metadata record written yet.
    pub const UNREGISTERED: i32 = 0;
    /// A counter id whose metadata record is live.
    pub const RECORD_ALLOCATED: i32 = 1;
    /// A counter id whose metadata record has been freed and may be
    /// reused.
    pub const RECORD_RECLAIMED: i32 = -1;

    /// Byte length of a single counters-metadata record, label space
    /// included.
    pub const RECORD_LENGTH: IndexT = (CACHE_LINE_LENGTH * 4) as IndexT;

    pub(super) const STATE_OFFSET: IndexT = 0;
    pub(super) const TYPE_ID_OFFSET: IndexT = 4;
    pub(super) const LABEL_OFFSET: IndexT = (CACHE_LINE_LENGTH * 2) as IndexT;
}

/// Byte length of a single counter's value slot.
pub const COUNTER_LENGTH: IndexT = CACHE_LINE_LENGTH as IndexT;

/// A value observed for an unregistered counter id.
pub const NOT_ALLOCATED: i64 = 0;

/// Read-only access to the counters metadata/values pair the driver
/// maintains. Labels are US-ASCII and validated as such on read.
pub struct CountersReader<M, V>
where
    M: AtomicBuffer,
    V: AtomicBuffer,
{
    metadata: M,
    values: V,
}

impl<M, V> CountersReader<M, V>
where
    M: AtomicBuffer,
    V: AtomicBuffer,
{
    /// Wrap the metadata and values sub-regions of a mapped CnC file.
    pub fn new(metadata: M, values: V) -> Self {
        CountersReader { metadata, values }
    }

    /// Maximum number of counters representable given the values buffer's
    /// length.
    pub fn max_counter_id(&self) -> i32 {
        self.values.capacity() / COUNTER_LENGTH
    }

    /// Current value of counter `id`. Returns `0` for an id that has never
    /// been allocated, matching the zero-initialized buffer state.
    pub fn counter_value(&self, id: i32) -> Result<i64> {
        self.values.get_i64_volatile(id * COUNTER_LENGTH)
    }

    /// Allocation state of counter `id`: [`metadata_descriptor::UNREGISTERED`],
    /// [`metadata_descriptor::RECORD_ALLOCATED`], or
    /// [`metadata_descriptor::RECORD_RECLAIMED`].
    pub fn counter_state(&self, id: i32) -> Result<i32> {
        let offset = id * metadata_descriptor::RECORD_LENGTH + metadata_descriptor::STATE_OFFSET;
        self.metadata.get_i32_volatile(offset)
    }

    /// Application-defined type id recorded for counter `id`.
    pub fn counter_type_id(&self, id: i32) -> Result<i32> {
        let offset = id * metadata_descriptor::RECORD_LENGTH + metadata_descriptor::TYPE_ID_OFFSET;
        self.metadata.get_i32(offset)
    }

    /// Human-readable label for counter `id`. Only meaningful once
    /// [`counter_state`](Self::counter_state) reports
    /// [`metadata_descriptor::RECORD_ALLOCATED`].
    pub fn counter_label(&self, id: i32) -> Result<&str> {
        let offset = id * metadata_descriptor::RECORD_LENGTH + metadata_descriptor::LABEL_OFFSET;
        let label = self.metadata.get_string(offset)?;
        if label.is_ascii() {
            Ok(label)
        } else {
            Err(AeronError::IllegalArgument)
        }
    }

    /// Invoke `handler` for every counter id currently allocated.
    pub fn for_each<F>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(i32, &str),
    {
        for id in 0..self.max_counter_id() {
            if self.counter_state(id)? == metadata_descriptor::RECORD_ALLOCATED {
                handler(id, self.counter_label(id)?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_counter(metadata: &mut Vec<u8>, values: &mut Vec<u8>, id: i32, type_id: i32, label: &str, value: i64) {
        let record_offset = id * metadata_descriptor::RECORD_LENGTH;
        metadata
            .put_i32_ordered(record_offset + metadata_descriptor::STATE_OFFSET, metadata_descriptor::RECORD_ALLOCATED)
            .unwrap();
        metadata.put_i32(record_offset + metadata_descriptor::TYPE_ID_OFFSET, type_id).unwrap();
        metadata.put_string(record_offset + metadata_descriptor::LABEL_OFFSET, label).unwrap();
        values.put_i64_ordered(id * COUNTER_LENGTH, value).unwrap();
    }

    #[test]
    fn reads_back_label_and_value() {
        let mut metadata = vec![0u8; metadata_descriptor::RECORD_LENGTH as usize * 4];
        let mut values = vec![0u8; COUNTER_LENGTH as usize * 4];
        write_counter(&mut metadata, &mut values, 2, 101, "client-heartbeat", 42);

        let reader = CountersReader::new(metadata, values);
        assert_eq!(reader.counter_state(2).unwrap(), metadata_descriptor::RECORD_ALLOCATED);
        assert_eq!(reader.counter_type_id(2).unwrap(), 101);
        assert_eq!(reader.counter_label(2).unwrap(), "client-heartbeat");
        assert_eq!(reader.counter_value(2).unwrap(), 42);
    }

    #[test]
    fn unallocated_counter_reads_as_zero() {
        let metadata = vec![0u8; metadata_descriptor::RECORD_LENGTH as usize * 4];
        let values = vec![0u8; COUNTER_LENGTH as usize * 4];
        let reader = CountersReader::new(metadata, values);

        assert_eq!(reader.counter_state(0).unwrap(), metadata_descriptor::UNREGISTERED);
        assert_eq!(reader.counter_value(0).unwrap(), NOT_ALLOCATED);
    }

    #[test]
    fn for_each_visits_only_allocated() {
        let mut metadata = vec![0u8; metadata_descriptor::RECORD_LENGTH as usize * 4];
        let mut values = vec![0u8; COUNTER_LENGTH as usize * 4];
        write_counter(&mut metadata, &mut values, 1, 5, "a", 1);
        write_counter(&mut metadata, &mut values, 3, 5, "b", 2);

        let reader = CountersReader::new(metadata, values);
        let mut seen = Vec::new();
        reader.for_each(|id, label| seen.push((id, label.to_string()))).unwrap();
        assert_eq!(seen, vec![(1, "a".to_string()), (3, "b".to_string())]);
    }
}
