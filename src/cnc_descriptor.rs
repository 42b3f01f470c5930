//! Description of the command-and-control file used to communicate between
//! the media driver and its clients.
//!
//! File layout:
//!
//! ```text
//! +-----------------------------+
//! |          Meta Data          |
//! +-----------------------------+
//! |      to-driver Buffer       |
//! +-----------------------------+
//! |      to-clients Buffer      |
//! +-----------------------------+
//! |   Counters Metadata Buffer  |
//! +-----------------------------+
//! |    Counters Values Buffer   |
//! +-----------------------------+
//! |          Error Log          |
//! +-----------------------------+
//! ```
//!
//! This module is a pure descriptor: it computes byte offsets/lengths of the
//! sub-regions above and reads the version field. It never maps a file or
//! owns any memory; see [`crate::cnc_connector`] for that.

use crate::util::bit;
use std::mem::size_of;
use std::sync::atomic::{AtomicI32, Ordering};

/// The CnC file metadata header. Layout:
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      Aeron CnC Version                        |
/// +---------------------------------------------------------------+
/// |                   to-driver buffer length                     |
/// +---------------------------------------------------------------+
/// |                  to-clients buffer length                     |
/// +---------------------------------------------------------------+
/// |               Counters Metadata buffer length                 |
/// +---------------------------------------------------------------+
/// |                Counters Values buffer length                  |
/// +---------------------------------------------------------------+
/// |                   Error Log buffer length                     |
/// +---------------------------------------------------------------+
/// |                   Client Liveness Timeout                     |
/// |                                                                |
/// +---------------------------------------------------------------+
/// |                    Driver Start Timestamp                     |
/// |                                                                |
/// +---------------------------------------------------------------+
/// |                         Driver PID                            |
/// |                                                                |
/// +---------------------------------------------------------------+
/// ```
///
/// The version field is written by the driver with release semantics and
/// must be observed with acquire semantics by clients: it reads as `0`
/// until the driver has fully initialized the rest of the file, and is the
/// synchronization point that makes the remaining fields safe to read.
#[repr(C, align(4))]
pub struct MetaDataDefinition {
    cnc_version: AtomicI32,
    to_driver_buffer_length: i32,
    to_client_buffer_length: i32,
    counter_metadata_buffer_length: i32,
    counter_values_buffer_length: i32,
    error_log_buffer_length: i32,
    client_liveness_timeout: i64,
    start_timestamp: i64,
    pid: i64,
}

impl MetaDataDefinition {
    /// Read the CnC version field with acquire semantics. Reads as `0`
    /// before the driver has published it.
    pub fn version(&self) -> i32 {
        self.cnc_version.load(Ordering::Acquire)
    }

    /// Length in bytes of the to-driver ring buffer, trailer included.
    pub fn to_driver_buffer_length(&self) -> i32 {
        self.to_driver_buffer_length
    }

    /// Length in bytes of the to-client broadcast buffer, trailer included.
    pub fn to_client_buffer_length(&self) -> i32 {
        self.to_client_buffer_length
    }

    /// Length in bytes of the counters metadata buffer.
    pub fn counter_metadata_buffer_length(&self) -> i32 {
        self.counter_metadata_buffer_length
    }

    /// Length in bytes of the counters values buffer.
    pub fn counter_values_buffer_length(&self) -> i32 {
        self.counter_values_buffer_length
    }

    /// Length in bytes of the error log buffer.
    pub fn error_log_buffer_length(&self) -> i32 {
        self.error_log_buffer_length
    }

    /// Maximum time, in nanoseconds, the driver will wait without hearing
    /// from a client before considering it dead.
    pub fn client_liveness_timeout_ns(&self) -> i64 {
        self.client_liveness_timeout
    }

    /// Wall-clock timestamp, in milliseconds, at which the driver started.
    pub fn start_timestamp_ms(&self) -> i64 {
        self.start_timestamp
    }

    /// OS process id of the driver.
    pub fn pid(&self) -> i64 {
        self.pid
    }
}

/// Length of the metadata block in a CnC file. Note that it's not
/// equivalent to the actual struct length: it's cache-line padded so the
/// sub-regions that follow start on their own cache lines.
pub const META_DATA_LENGTH: usize =
    bit::align(size_of::<MetaDataDefinition>(), bit::CACHE_LINE_LENGTH * 2);

/// Version code for the Aeron CnC file format this client was built
/// against. A mismatch observed during handshake is fatal.
pub const CNC_VERSION: i32 = crate::semantic_version_compose(0, 0, 16);

/// Filename for the CnC file located in the Aeron directory.
pub const CNC_FILE: &str = "cnc.dat";

/// Computed byte offsets of each CnC sub-region, given the lengths recorded
/// in the metadata header. Pure arithmetic: no I/O, no mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CncOffsets {
    /// Offset of the to-driver ring buffer
    pub to_driver_offset: usize,
    /// Length of the to-driver ring buffer, trailer included
    pub to_driver_length: usize,
    /// Offset of the to-client broadcast buffer
    pub to_client_offset: usize,
    /// Length of the to-client broadcast buffer, trailer included
    pub to_client_length: usize,
    /// Offset of the counters metadata buffer
    pub counters_metadata_offset: usize,
    /// Length of the counters metadata buffer
    pub counters_metadata_length: usize,
    /// Offset of the counters values buffer
    pub counters_values_offset: usize,
    /// Length of the counters values buffer
    pub counters_values_length: usize,
    /// Offset of the error log buffer
    pub error_log_offset: usize,
    /// Length of the error log buffer
    pub error_log_length: usize,
    /// Total length of the CnC file implied by these offsets
    pub total_length: usize,
}

impl CncOffsets {
    /// Compute the sub-region offsets given a metadata header. Callers are
    /// expected to have already verified `metadata.version()` is nonzero
    /// and matches [`CNC_VERSION`] before trusting these lengths.
    pub fn from_metadata(metadata: &MetaDataDefinition) -> Self {
        let to_driver_offset = META_DATA_LENGTH;
        let to_driver_length = metadata.to_driver_buffer_length() as usize;

        let to_client_offset = to_driver_offset + to_driver_length;
        let to_client_length = metadata.to_client_buffer_length() as usize;

        let counters_metadata_offset = to_client_offset + to_client_length;
        let counters_metadata_length = metadata.counter_metadata_buffer_length() as usize;

        let counters_values_offset = counters_metadata_offset + counters_metadata_length;
        let counters_values_length = metadata.counter_values_buffer_length() as usize;

        let error_log_offset = counters_values_offset + counters_values_length;
        let error_log_length = metadata.error_log_buffer_length() as usize;

        CncOffsets {
            to_driver_offset,
            to_driver_length,
            to_client_offset,
            to_client_length,
            counters_metadata_offset,
            counters_metadata_length,
            counters_values_offset,
            counters_values_length,
            error_log_offset,
            error_log_length,
            total_length: error_log_offset + error_log_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_length_is_cache_line_padded() {
        assert_eq!(META_DATA_LENGTH % (bit::CACHE_LINE_LENGTH * 2), 0);
        assert!(META_DATA_LENGTH >= size_of::<MetaDataDefinition>());
    }

    #[test]
    fn offsets_stack_without_gaps() {
        // Build a metadata struct by hand; field order matches the C layout.
        let mut bytes = vec![0u8; size_of::<MetaDataDefinition>()];
        {
            let md = unsafe { &mut *(bytes.as_mut_ptr() as *mut MetaDataDefinition) };
            md.cnc_version.store(CNC_VERSION, Ordering::Relaxed);
            md.to_driver_buffer_length = 4096;
            md.to_client_buffer_length = 2048;
            md.counter_metadata_buffer_length = 1024;
            md.counter_values_buffer_length = 512;
            md.error_log_buffer_length = 256;
        }
        let md = unsafe { &*(bytes.as_ptr() as *const MetaDataDefinition) };
        let offsets = CncOffsets::from_metadata(md);

        assert_eq!(offsets.to_driver_offset, META_DATA_LENGTH);
        assert_eq!(offsets.to_client_offset, META_DATA_LENGTH + 4096);
        assert_eq!(offsets.counters_metadata_offset, META_DATA_LENGTH + 4096 + 2048);
        assert_eq!(
            offsets.counters_values_offset,
            META_DATA_LENGTH + 4096 + 2048 + 1024
        );
        assert_eq!(
            offsets.error_log_offset,
            META_DATA_LENGTH + 4096 + 2048 + 1024 + 512
        );
        assert_eq!(offsets.total_length, offsets.error_log_offset + 256);
    }
}
