//! Primitives for safe, concurrent interaction with the memory shared by the
//! multiple clients and the media driver.

pub mod broadcast;
pub mod counters;
pub mod ringbuffer;

use crate::util::{AeronError, IndexT, Result};
use memmap::MmapMut;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr::{read_volatile, write_volatile};
use std::str;
use std::sync::atomic::{AtomicI64, Ordering};

fn bounds_check_slice(slice: &[u8], offset: IndexT, size: IndexT) -> Result<()> {
    if offset < 0 || size < 0 || slice.len() as IndexT - offset < size {
        Err(AeronError::OutOfBounds)
    } else {
        Ok(())
    }
}

/// Atomic operations on slices of memory. Implemented for both owned
/// buffers (tests, scratch space) and the memory-mapped CnC region.
pub trait AtomicBuffer: Deref<Target = [u8]> + DerefMut<Target = [u8]> {
    /// Check that there are at least `size` bytes of memory available
    /// beginning at some offset.
    ///
    /// ```rust
    /// # use aeron_client::concurrent::AtomicBuffer;
    /// let buffer = &mut [0u8; 8][..];
    /// assert!(buffer.bounds_check(0, 8).is_ok());
    /// assert!(buffer.bounds_check(1, 7).is_ok());
    /// assert!(buffer.bounds_check(1, 8).is_err());
    /// assert!(buffer.bounds_check(-1, 8).is_err());
    /// ```
    fn bounds_check(&self, offset: IndexT, size: IndexT) -> Result<()> {
        bounds_check_slice(self.deref(), offset, size)
    }

    /// Overlay a struct on a buffer.
    ///
    /// NOTE: has the potential to cause undefined behavior if alignment is
    /// incorrect.
    fn overlay<T>(&self, offset: IndexT) -> Result<&T>
    where
        T: Sized,
    {
        self.bounds_check(offset, size_of::<T>() as IndexT).map(|_| {
            let offset_ptr = unsafe { self.as_ptr().offset(offset as isize) };
            unsafe { &*(offset_ptr as *const T) }
        })
    }

    /// Overlay a mutable value on the buffer.
    fn overlay_mut<T>(&mut self, offset: IndexT) -> Result<&mut T>
    where
        T: Sized,
    {
        self.bounds_check(offset, size_of::<T>() as IndexT).map(|_| {
            let offset_ptr = unsafe { self.as_mut_ptr().offset(offset as isize) };
            unsafe { &mut *(offset_ptr as *mut T) }
        })
    }

    /// Overlay a struct on a buffer, and perform a volatile read
    fn overlay_volatile<T>(&self, offset: IndexT) -> Result<T>
    where
        T: Copy,
    {
        self.bounds_check(offset, size_of::<T>() as IndexT).map(|_| {
            let offset_ptr = unsafe { self.as_ptr().offset(offset as isize) };
            unsafe { read_volatile(offset_ptr as *const T) }
        })
    }

    /// Perform a volatile write of a value over a buffer
    fn write_volatile<T>(&mut self, offset: IndexT, val: T) -> Result<()>
    where
        T: Copy,
    {
        self.bounds_check(offset, size_of::<T>() as IndexT).map(|_| {
            let offset_ptr = unsafe { self.as_mut_ptr().offset(offset as isize) };
            unsafe { write_volatile(offset_ptr as *mut T, val) };
        })
    }

    /// Perform an atomic fetch and add of a 64-bit value
    fn get_and_add_i64(&self, offset: IndexT, value: i64) -> Result<i64> {
        self.overlay::<AtomicI64>(offset)
            .map(|a| a.fetch_add(value, Ordering::SeqCst))
    }

    /// Perform an atomic Compare-And-Swap of a 64-bit value. Returns
    /// `Ok(true)` if the update was successful, and `Ok(false)` if the
    /// update failed.
    fn compare_and_set_i64(&self, offset: IndexT, expected: i64, update: i64) -> Result<bool> {
        self.overlay::<AtomicI64>(offset).map(|a| {
            a.compare_exchange(expected, update, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        })
    }

    /// Perform a volatile read of an `i64` value
    fn get_i64_volatile(&self, offset: IndexT) -> Result<i64> {
        self.overlay_volatile::<i64>(offset)
    }

    /// Read an `i64` value from the buffer without performing any
    /// synchronization
    fn get_i64(&self, offset: IndexT) -> Result<i64> {
        self.overlay::<i64>(offset).map(|i| *i)
    }

    /// Perform a volatile write of an `i64` value
    fn put_i64_ordered(&mut self, offset: IndexT, value: i64) -> Result<()> {
        self.write_volatile::<i64>(offset, value)
    }

    /// Write an `i64` value into the buffer without performing any
    /// synchronization
    fn put_i64(&mut self, offset: IndexT, value: i64) -> Result<()> {
        self.overlay_mut::<i64>(offset).map(|i| *i = value)
    }

    /// Write the contents of a byte slice to this buffer. Does not perform
    /// any synchronization
    fn put_slice(
        &mut self,
        index: IndexT,
        source: &[u8],
        source_index: IndexT,
        len: IndexT,
    ) -> Result<()> {
        self.bounds_check(index, len)?;
        bounds_check_slice(source, source_index, len)?;

        let index = index as usize;
        let source_index = source_index as usize;
        let len = len as usize;

        self[index..index + len].copy_from_slice(&source[source_index..source_index + len]);
        Ok(())
    }

    /// Write the contents of one buffer to another. Does not perform any
    /// synchronization
    fn put_bytes<B>(&mut self, index: IndexT, source: &B, source_index: IndexT, len: IndexT) -> Result<()>
    where
        B: AtomicBuffer,
    {
        self.bounds_check(index, len)?;
        source.bounds_check(source_index, len)?;

        let index = index as usize;
        let source_index = source_index as usize;
        let len = len as usize;

        self[index..index + len].copy_from_slice(&source[source_index..source_index + len]);
        Ok(())
    }

    /// Repeatedly write a value into an atomic buffer. Guaranteed to use
    /// `memset`.
    fn set_memory(&mut self, offset: IndexT, length: usize, value: u8) -> Result<()> {
        self.bounds_check(offset, length as IndexT).map(|_| unsafe {
            self.as_mut_ptr().offset(offset as isize).write_bytes(value, length)
        })
    }

    /// Perform a volatile read of an `i32` from the buffer
    fn get_i32_volatile(&self, offset: IndexT) -> Result<i32> {
        self.overlay_volatile::<i32>(offset)
    }

    /// Read an `i32` value from the buffer without performing any
    /// synchronization
    fn get_i32(&self, offset: IndexT) -> Result<i32> {
        self.overlay::<i32>(offset).map(|i| *i)
    }

    /// Perform a volatile write of an `i32` into the buffer
    fn put_i32_ordered(&mut self, offset: IndexT, value: i32) -> Result<()> {
        self.write_volatile::<i32>(offset, value)
    }

    /// Write an `i32` value into the buffer without performing any
    /// synchronization
    fn put_i32(&mut self, offset: IndexT, value: i32) -> Result<()> {
        self.overlay_mut::<i32>(offset).map(|i| *i = value)
    }

    /// Return the total number of bytes in this buffer
    fn capacity(&self) -> IndexT {
        self.len() as IndexT
    }

    /// Read a length-prefixed UTF-8 string: a 4-byte little-endian length
    /// followed by that many bytes. Used by command flyweights to encode
    /// channel strings.
    ///
    /// Reads the length via a byte slice plus `from_le_bytes`, not
    /// [`get_i32`](Self::get_i32)'s pointer-cast overlay: a string field
    /// chained after another variable-length field (e.g. a second channel
    /// string following the first) lands at an offset with no alignment
    /// guarantee, and overlaying an `i32` there is a misaligned reference.
    fn get_string(&self, offset: IndexT) -> Result<&str> {
        self.bounds_check(offset, size_of::<i32>() as IndexT)?;
        let len_offset = offset as usize;
        let len = i32::from_le_bytes(self[len_offset..len_offset + 4].try_into().unwrap());
        if len < 0 {
            return Err(AeronError::IllegalArgument);
        }
        let start = offset
            .checked_add(size_of::<i32>() as IndexT)
            .ok_or(AeronError::OutOfBounds)?;
        self.bounds_check(start, len)?;
        let start = start as usize;
        let end = start + len as usize;
        str::from_utf8(&self[start..end]).map_err(|_| AeronError::IllegalArgument)
    }

    /// Write a length-prefixed UTF-8 string at `offset`. Returns the total
    /// number of bytes written (4-byte length prefix plus payload).
    ///
    /// Writes the length via a byte slice, the write-side counterpart of
    /// [`get_string`](Self::get_string)'s alignment-safe read.
    fn put_string(&mut self, offset: IndexT, value: &str) -> Result<i32> {
        let bytes = value.as_bytes();
        let len = bytes.len() as IndexT;
        self.bounds_check(offset, size_of::<i32>() as IndexT)?;
        let len_offset = offset as usize;
        self[len_offset..len_offset + 4].copy_from_slice(&(len as i32).to_le_bytes());
        let start = offset + size_of::<i32>() as IndexT;
        self.put_slice(start, bytes, 0, len)?;
        Ok(len + size_of::<i32>() as IndexT)
    }
}

impl AtomicBuffer for Vec<u8> {}

impl AtomicBuffer for &mut [u8] {}

impl AtomicBuffer for MmapMut {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip() {
        let mut buf = vec![0u8; 64];
        let written = buf.put_string(0, "aeron:ipc").unwrap();
        assert_eq!(written, 4 + "aeron:ipc".len() as IndexT);
        assert_eq!(buf.get_string(0).unwrap(), "aeron:ipc");
    }

    #[test]
    fn string_negative_length_rejected() {
        let mut buf = vec![0u8; 16];
        buf.put_i32(0, -1).unwrap();
        assert_eq!(buf.get_string(0), Err(AeronError::IllegalArgument));
    }

    #[test]
    fn chained_string_at_unaligned_offset_round_trips() {
        // "term-log-1" is 10 bytes, landing the second string's length
        // prefix at offset 14 -- not a multiple of 4.
        let mut buf = vec![0u8; 64];
        let first_written = buf.put_string(0, "term-log-1").unwrap();
        let second_offset = first_written;
        assert_eq!(second_offset % 4, 2);
        buf.put_string(second_offset, "source-identity").unwrap();

        assert_eq!(buf.get_string(0).unwrap(), "term-log-1");
        assert_eq!(buf.get_string(second_offset).unwrap(), "source-identity");
    }
}
