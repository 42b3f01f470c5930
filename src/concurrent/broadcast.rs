//! Single-producer, many-observer broadcast buffer used for the to-client
//! response stream. Unlike the command ring buffer, readers here are never
//! acknowledged: a slow observer simply misses messages that get
//! overwritten, so callers must tolerate gaps and rely on correlation ids
//! rather than sequencing.
use crate::concurrent::AtomicBuffer;
use crate::util::bit::is_power_of_two;
use crate::util::{AeronError, IndexT, Result};

/// Layout constants for the broadcast buffer trailer.
pub mod buffer_descriptor {
    use crate::util::bit::CACHE_LINE_LENGTH;
    use crate::util::IndexT;

    /// Offset of the tail intent counter: written before the record body,
    /// used by receivers to detect a writer still mid-record.
    pub const TAIL_INTENT_COUNTER_OFFSET: IndexT = 0;
    /// Offset of the tail counter: advances only once a record is fully
    /// written.
    pub const TAIL_COUNTER_OFFSET: IndexT = CACHE_LINE_LENGTH as IndexT;
    /// Offset of the latest sequence observed by any receiver; advisory
    /// only.
    pub const LATEST_COUNTER_OFFSET: IndexT = (CACHE_LINE_LENGTH * 2) as IndexT;
    /// Total length of the broadcast buffer trailer.
    pub const TRAILER_LENGTH: IndexT = (CACHE_LINE_LENGTH * 4) as IndexT;
}

/// Broadcast record header: length, message type, then the encoded body.
pub mod record_descriptor {
    use crate::util::{AeronError, IndexT, Result};
    use std::mem::size_of;

    /// Size of the broadcast record header (length + type).
    pub const HEADER_LENGTH: IndexT = size_of::<i32>() as IndexT * 2;
    /// Alignment of records within the broadcast buffer.
    pub const ALIGNMENT: IndexT = HEADER_LENGTH;
    /// Message type used to pad out to the end of the buffer.
    pub const PADDING_MSG_TYPE_ID: i32 = -1;

    pub(super) fn length_offset(record_offset: IndexT) -> IndexT {
        record_offset
    }

    pub(super) fn type_offset(record_offset: IndexT) -> IndexT {
        record_offset + size_of::<i32>() as IndexT
    }

    pub(super) fn msg_offset(record_offset: IndexT) -> IndexT {
        record_offset + HEADER_LENGTH
    }

    pub(super) fn check_msg_type_id(msg_type_id: i32) -> Result<()> {
        if msg_type_id < 1 {
            Err(AeronError::IllegalArgument)
        } else {
            Ok(())
        }
    }
}

/// Verify a broadcast buffer capacity (excluding trailer) is a legal power
/// of two.
pub fn check_capacity(capacity: IndexT) -> Result<()> {
    if is_power_of_two(capacity) {
        Ok(())
    } else {
        Err(AeronError::IllegalArgument)
    }
}

/// Low-level reader over the broadcast buffer. Scans forward from the last
/// observed position; if the writer has lapped the reader since the last
/// call, `receive_next` jumps forward to the oldest record the writer
/// still guarantees is intact rather than reading corrupted data.
pub struct BroadcastReceiver<A>
where
    A: AtomicBuffer,
{
    buffer: A,
    capacity: IndexT,
    tail_intent_counter_index: IndexT,
    tail_counter_index: IndexT,
    latest_counter_index: IndexT,
    record_offset: IndexT,
    cursor: i64,
    next_record: i64,
}

impl<A> BroadcastReceiver<A>
where
    A: AtomicBuffer,
{
    /// Create a new broadcast receiver, positioned at the writer's current
    /// tail (i.e. it will only observe records written from this point
    /// forward).
    pub fn new(buffer: A) -> Result<Self> {
        let capacity = buffer.capacity() - buffer_descriptor::TRAILER_LENGTH;
        check_capacity(capacity)?;

        let tail_counter_index = capacity + buffer_descriptor::TAIL_COUNTER_OFFSET;
        let tail = buffer.get_i64_volatile(tail_counter_index)?;

        Ok(BroadcastReceiver {
            buffer,
            capacity,
            tail_intent_counter_index: capacity + buffer_descriptor::TAIL_INTENT_COUNTER_OFFSET,
            tail_counter_index,
            latest_counter_index: capacity + buffer_descriptor::LATEST_COUNTER_OFFSET,
            record_offset: 0,
            cursor: tail,
            next_record: tail,
        })
    }

    /// Total number of bytes in this buffer, trailer excluded.
    pub fn capacity(&self) -> IndexT {
        self.capacity
    }

    fn mask(&self) -> i64 {
        i64::from(self.capacity - 1)
    }

    /// Advance to the next record, if one is available. Returns `Ok(true)`
    /// if a new record is ready to be inspected via [`type_id`](Self::type_id)
    /// and [`message`](Self::message); `Ok(false)` means the writer hasn't
    /// produced anything new.
    pub fn receive_next(&mut self) -> Result<bool> {
        let tail = self.buffer.get_i64_volatile(self.tail_counter_index)?;
        let mut cursor = self.next_record;

        if tail <= cursor {
            return Ok(false);
        }

        if !self.validate_at(cursor)? {
            // Writer has lapped us; jump forward to the oldest intact record.
            cursor = self.buffer.get_i64_volatile(self.latest_counter_index)?;
        }

        self.record_offset = (cursor & self.mask()) as IndexT;
        self.cursor = cursor;

        let length = self
            .buffer
            .get_i32_volatile(record_descriptor::length_offset(self.record_offset))?;
        // A lapping writer can leave a torn (non-positive) length here;
        // clamp to the minimum record alignment so `next_record` still
        // advances instead of sign-extending into `bit::align`'s addition.
        // `validate`/`message` reject the record itself downstream.
        let advance = if length <= 0 { record_descriptor::ALIGNMENT } else { length };
        self.next_record = cursor + crate::util::bit::align(advance as usize, record_descriptor::ALIGNMENT as usize) as i64;

        Ok(true)
    }

    /// Type identifier of the most recently received record.
    pub fn type_id(&self) -> Result<i32> {
        self.buffer
            .get_i32_volatile(record_descriptor::type_offset(self.record_offset))
    }

    /// Whether the most recently received record is a padding record and
    /// should be skipped without interpretation.
    pub fn is_padding(&self) -> Result<bool> {
        Ok(self.type_id()? == record_descriptor::PADDING_MSG_TYPE_ID)
    }

    /// Byte slice of the most recently received record's body.
    ///
    /// A record overwritten mid-read by a lapping writer can carry a
    /// corrupted length; this only guards against indexing past the
    /// buffer, it doesn't guarantee the content is still the record
    /// `receive_next` saw. Callers must still call [`validate`](Self::validate)
    /// before acting on it.
    pub fn message(&self) -> Result<&[u8]> {
        let length = self
            .buffer
            .get_i32_volatile(record_descriptor::length_offset(self.record_offset))?;
        if length < record_descriptor::HEADER_LENGTH || length > self.capacity {
            return Err(AeronError::IllegalState);
        }
        // `record_offset` is always within `[0, capacity)`, but a corrupted
        // `length` can still push the body past the capacity boundary into
        // the trailer; check the actual end, not just `length` in isolation.
        if self.record_offset + length > self.capacity {
            return Err(AeronError::IllegalState);
        }
        let start = record_descriptor::msg_offset(self.record_offset) as usize;
        let end = start + (length - record_descriptor::HEADER_LENGTH) as usize;
        Ok(&self.buffer[start..end])
    }

    /// Validate that the record read during `receive_next` hasn't since
    /// been overwritten by the writer lapping us. Must be called after
    /// inspecting `type_id`/`message` and before acting on their contents.
    pub fn validate(&self) -> Result<bool> {
        self.validate_at(self.cursor)
    }

    fn validate_at(&self, cursor: i64) -> Result<bool> {
        let tail_intent = self.buffer.get_i64_volatile(self.tail_intent_counter_index)?;
        Ok(cursor + i64::from(self.capacity) > tail_intent)
    }
}

/// Convenience wrapper over [`BroadcastReceiver`] that copies each valid
/// message into caller-supplied scratch space, retrying if the writer
/// invalidates the record mid-copy. This is the type application code
/// should use; the underlying receiver is for situations needing
/// zero-copy access.
pub struct CopyBroadcastReceiver<A>
where
    A: AtomicBuffer,
{
    receiver: BroadcastReceiver<A>,
}

impl<A> CopyBroadcastReceiver<A>
where
    A: AtomicBuffer,
{
    /// Wrap a [`BroadcastReceiver`].
    pub fn new(receiver: BroadcastReceiver<A>) -> Self {
        CopyBroadcastReceiver { receiver }
    }

    /// Receive the next message, if any, dispatching `handler` with the
    /// message type id and a copy of its body. Returns `Ok(true)` if a
    /// message was dispatched.
    pub fn receive<F>(&mut self, mut handler: F) -> Result<bool>
    where
        F: FnMut(i32, &[u8]),
    {
        loop {
            if !self.receiver.receive_next()? {
                return Ok(false);
            }

            if self.receiver.is_padding()? {
                continue;
            }

            let type_id = self.receiver.type_id()?;
            let body = match self.receiver.message() {
                Ok(body) => body.to_vec(),
                // A lapping writer corrupted the length field mid-read;
                // treat it the same as a failed `validate` below and retry.
                Err(AeronError::IllegalState) => continue,
                Err(e) => return Err(e),
            };

            if self.receiver.validate()? {
                handler(type_id, &body);
                return Ok(true);
            }
            // Record was invalidated by the writer lapping us; retry.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUFFER_SIZE: usize = 1024 + buffer_descriptor::TRAILER_LENGTH as usize;

    fn write_record(buf: &mut Vec<u8>, capacity: IndexT, tail: i64, type_id: i32, body: &[u8]) -> i64 {
        let offset = (tail & i64::from(capacity - 1)) as IndexT;
        let record_len = record_descriptor::HEADER_LENGTH + body.len() as IndexT;

        buf.put_i32(record_descriptor::length_offset(offset), record_len).unwrap();
        buf.put_i32(record_descriptor::type_offset(offset), type_id).unwrap();
        buf.put_slice(record_descriptor::msg_offset(offset), body, 0, body.len() as IndexT)
            .unwrap();

        let aligned = crate::util::bit::align(record_len as usize, record_descriptor::ALIGNMENT as usize) as i64;
        let new_tail = tail + aligned;

        let tail_intent_index = capacity + buffer_descriptor::TAIL_INTENT_COUNTER_OFFSET;
        let tail_index = capacity + buffer_descriptor::TAIL_COUNTER_OFFSET;
        buf.put_i64_ordered(tail_intent_index, new_tail).unwrap();
        buf.put_i64_ordered(tail_index, new_tail).unwrap();

        new_tail
    }

    #[test]
    fn receive_single_message() {
        let capacity: IndexT = 1024;
        let raw = vec![0u8; BUFFER_SIZE];
        // Attach at tail 0 first, same as a reader joining before the
        // writer publishes anything, then have the writer publish after.
        let mut receiver = BroadcastReceiver::new(raw).unwrap();
        write_record(&mut receiver.buffer, capacity, 0, 7, &[1, 2, 3]);

        assert!(receiver.receive_next().unwrap());
        assert_eq!(receiver.type_id().unwrap(), 7);
        assert_eq!(receiver.message().unwrap(), &[1, 2, 3]);
        assert!(receiver.validate().unwrap());
        assert!(!receiver.receive_next().unwrap());
    }

    #[test]
    fn copy_receiver_dispatches_body() {
        let capacity: IndexT = 1024;
        let raw = vec![0u8; BUFFER_SIZE];
        let mut receiver = BroadcastReceiver::new(raw).unwrap();
        write_record(&mut receiver.buffer, capacity, 0, 3, &[9, 9]);

        let mut copy_receiver = CopyBroadcastReceiver::new(receiver);

        let mut seen = None;
        let dispatched = copy_receiver
            .receive(|type_id, body| seen = Some((type_id, body.to_vec())))
            .unwrap();

        assert!(dispatched);
        assert_eq!(seen, Some((3, vec![9, 9])));
    }

    #[test]
    fn no_message_returns_false() {
        let raw = vec![0u8; BUFFER_SIZE];
        let mut receiver = BroadcastReceiver::new(raw).unwrap();
        assert!(!receiver.receive_next().unwrap());
    }

    #[test]
    fn receive_next_recovers_when_writer_laps_the_reader() {
        let capacity: IndexT = 64;
        let raw = vec![0u8; capacity as usize + buffer_descriptor::TRAILER_LENGTH as usize];
        let mut receiver = BroadcastReceiver::new(raw).unwrap();
        assert_eq!(receiver.cursor, 0);

        // Six 16-byte records (8-byte header + 4-byte body, aligned) push the
        // tail to 96, a lap and a half past a 64-byte capacity; the reader's
        // stale cursor at 0 is now more than a buffer's worth behind.
        let mut tail = 0i64;
        for i in 0..6i32 {
            tail = write_record(&mut receiver.buffer, capacity, tail, 1, &i.to_le_bytes());
        }
        let last_record_start = tail - 16;
        receiver
            .buffer
            .put_i64_ordered(capacity + buffer_descriptor::LATEST_COUNTER_OFFSET, last_record_start)
            .unwrap();

        assert!(receiver.receive_next().unwrap());
        assert_eq!(receiver.cursor, last_record_start);
        assert!(receiver.validate().unwrap());
        assert_eq!(receiver.message().unwrap().to_vec(), 5i32.to_le_bytes().to_vec());
    }
}
