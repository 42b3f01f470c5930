//! Given a validated, version-checked CnC mapping, constructs the typed
//! command ring, response receiver, and counters reader the rest of the
//! crate talks to.
//!
//! The three views each need their own zero-based addressing into a
//! disjoint slice of one shared mapping. Carving that mapping into
//! independent `&'static mut [u8]` windows via raw pointers lets each view
//! live in its own struct field with no lifetime parameter threading
//! through [`crate::client_conductor::ClientConductor`]. This is sound
//! only because: the windows are provably disjoint (the arithmetic comes
//! straight from [`CncOffsets`], which stacks sub-regions end to end);
//! nothing ever reads `mmap` through any path but these windows once
//! split; and `mmap` is declared last in [`IpcBindings`] so Rust drops it
//! only after every window derived from it has already been dropped.
//!
//! Because the windows claim a `'static` lifetime, the borrow checker
//! cannot itself stop one from being moved out and outliving `mmap` — so
//! the fields stay private and are reached only through accessors that
//! borrow from `&(mut) self`, tying every usage to `IpcBindings`'s own
//! lifetime the way an honest (non-`'static`) lifetime would.

use crate::cnc_descriptor::CncOffsets;
use crate::concurrent::broadcast::{BroadcastReceiver, CopyBroadcastReceiver};
use crate::concurrent::counters::CountersReader;
use crate::concurrent::ringbuffer::ManyToOneRingBuffer;
use crate::driver_proxy::DriverProxy;
use crate::util::AeronError;
use memmap::MmapMut;
use std::time::Duration;

/// Default assumed when neither an explicit inter-service timeout nor a
/// usable CnC client-liveness-timeout is available.
const DEFAULT_INTER_SERVICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bundled, typed views over one validated CnC mapping: a command ring to
/// the driver, a response receiver from it, and a counters reader.
pub struct IpcBindings {
    driver_proxy: DriverProxy<&'static mut [u8]>,
    responses: CopyBroadcastReceiver<&'static mut [u8]>,
    counters: CountersReader<&'static mut [u8], &'static mut [u8]>,
    inter_service_timeout: Duration,
    mmap: MmapMut,
}

impl IpcBindings {
    /// Split `mmap` into its sub-regions and construct the typed views over
    /// each. `explicit_inter_service_timeout` wins if given; otherwise the
    /// timeout is derived from the CnC metadata's client-liveness-timeout
    /// field (ns), itself falling back to
    /// [`DEFAULT_INTER_SERVICE_TIMEOUT`] if that field reads as zero.
    ///
    /// Returns `Err(AeronError::OutOfBounds)` if `offsets` claims sub-region
    /// lengths that don't actually fit inside `mmap` (a truncated or
    /// corrupted CnC file) rather than carving out-of-bounds windows.
    pub fn new(
        mut mmap: MmapMut,
        offsets: &CncOffsets,
        client_liveness_timeout_ns: i64,
        explicit_inter_service_timeout: Option<Duration>,
    ) -> Result<Self, AeronError> {
        if offsets.total_length > mmap.len() {
            return Err(AeronError::OutOfBounds);
        }

        // Safety: the four offset/length pairs come from one `CncOffsets`,
        // which lays sub-regions end to end with no overlap, and the check
        // above confirms they all fall within `mmap`'s actual length.
        let to_driver = unsafe { static_window(&mut mmap, offsets.to_driver_offset, offsets.to_driver_length) };
        let to_client = unsafe { static_window(&mut mmap, offsets.to_client_offset, offsets.to_client_length) };
        let counters_metadata = unsafe {
            static_window(&mut mmap, offsets.counters_metadata_offset, offsets.counters_metadata_length)
        };
        let counters_values =
            unsafe { static_window(&mut mmap, offsets.counters_values_offset, offsets.counters_values_length) };

        let ring = ManyToOneRingBuffer::new(to_driver)?;
        let broadcast = BroadcastReceiver::new(to_client)?;

        let inter_service_timeout = explicit_inter_service_timeout.unwrap_or_else(|| {
            if client_liveness_timeout_ns > 0 {
                Duration::from_nanos(client_liveness_timeout_ns as u64)
            } else {
                DEFAULT_INTER_SERVICE_TIMEOUT
            }
        });

        Ok(IpcBindings {
            driver_proxy: DriverProxy::new(ring),
            responses: CopyBroadcastReceiver::new(broadcast),
            counters: CountersReader::new(counters_metadata, counters_values),
            inter_service_timeout,
            mmap,
        })
    }

    /// The command ring to the driver.
    pub fn driver_proxy(&mut self) -> &mut DriverProxy<&'static mut [u8]> {
        &mut self.driver_proxy
    }

    /// The broadcast receiver for driver responses.
    pub fn responses(&mut self) -> &mut CopyBroadcastReceiver<&'static mut [u8]> {
        &mut self.responses
    }

    /// Read-only access to the counters metadata/values pair.
    pub fn counters(&self) -> &CountersReader<&'static mut [u8], &'static mut [u8]> {
        &self.counters
    }

    /// The resolved inter-service timeout, explicit override or CnC-derived.
    pub fn inter_service_timeout(&self) -> Duration {
        self.inter_service_timeout
    }
}

/// # Safety
/// `offset + len` must fall within `mmap`'s length, and the set of windows
/// carved from one mapping across all calls must never overlap.
unsafe fn static_window(mmap: &mut MmapMut, offset: usize, len: usize) -> &'static mut [u8] {
    let ptr = mmap.as_mut_ptr().add(offset);
    std::slice::from_raw_parts_mut(ptr, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnc_descriptor::{MetaDataDefinition, CNC_VERSION};
    use crate::concurrent::ringbuffer::buffer_descriptor;
    use crate::concurrent::AtomicBuffer;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn write_cnc_file(dir: &std::path::Path, to_driver_len: usize, to_client_len: usize) -> MmapMut {
        let counters_metadata_len = 4096usize;
        let counters_values_len = 4096usize;
        let total = std::mem::size_of::<MetaDataDefinition>()
            + to_driver_len
            + to_client_len
            + counters_metadata_len
            + counters_values_len;
        // Round up to the cache-line padded metadata length used by the
        // real descriptor so offsets line up the same way production code
        // computes them.
        let total = total + (crate::cnc_descriptor::META_DATA_LENGTH - std::mem::size_of::<MetaDataDefinition>());

        let path = dir.join("cnc.dat");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(total as u64).unwrap();
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let mut mmap = unsafe { MmapMut::map_mut(&file).unwrap() };

        mmap.put_i32(4, to_driver_len as i32).unwrap();
        mmap.put_i32(8, to_client_len as i32).unwrap();
        mmap.put_i32(12, counters_metadata_len as i32).unwrap();
        mmap.put_i32(16, counters_values_len as i32).unwrap();
        mmap.put_i32_ordered(0, CNC_VERSION).unwrap();
        mmap
    }

    #[test]
    fn splits_into_disjoint_usable_windows() {
        let dir = tempdir().unwrap();
        let to_driver_len = 4096 + buffer_descriptor::TRAILER_LENGTH as usize;
        let to_client_len = 4096 + crate::concurrent::broadcast::buffer_descriptor::TRAILER_LENGTH as usize;
        let mmap = write_cnc_file(dir.path(), to_driver_len, to_client_len);

        let metadata = mmap.overlay::<MetaDataDefinition>(0).unwrap();
        let offsets = CncOffsets::from_metadata(metadata);

        let mut bindings = IpcBindings::new(mmap, &offsets, 10_000_000_000, None).unwrap();
        assert_eq!(bindings.inter_service_timeout(), Duration::from_secs(10));

        let correlation_id = bindings.driver_proxy().add_publication("aeron:ipc", 7).unwrap();
        assert!(correlation_id >= 0);

        assert_eq!(bindings.counters().max_counter_id(), 4096 / crate::concurrent::counters::COUNTER_LENGTH);
    }

    #[test]
    fn rejects_mapping_truncated_below_declared_sub_region_lengths() {
        let dir = tempdir().unwrap();
        let to_driver_len = 4096 + buffer_descriptor::TRAILER_LENGTH as usize;
        let to_client_len = 4096 + crate::concurrent::broadcast::buffer_descriptor::TRAILER_LENGTH as usize;
        write_cnc_file(dir.path(), to_driver_len, to_client_len);

        // The header still claims the original sub-region lengths, but the
        // file backing it has since been truncated to well below what they
        // imply (e.g. a driver crash mid-write, or a corrupted CnC file).
        let path = dir.path().join("cnc.dat");
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(crate::cnc_descriptor::META_DATA_LENGTH as u64 + 4096).unwrap();

        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let truncated = unsafe { MmapMut::map_mut(&file).unwrap() };
        let metadata = truncated.overlay::<MetaDataDefinition>(0).unwrap();
        let offsets = CncOffsets::from_metadata(metadata);

        assert!(matches!(IpcBindings::new(truncated, &offsets, 0, None), Err(AeronError::OutOfBounds)));
    }

    #[test]
    fn explicit_timeout_overrides_metadata() {
        let dir = tempdir().unwrap();
        let to_driver_len = 4096 + buffer_descriptor::TRAILER_LENGTH as usize;
        let to_client_len = 4096 + crate::concurrent::broadcast::buffer_descriptor::TRAILER_LENGTH as usize;
        let mmap = write_cnc_file(dir.path(), to_driver_len, to_client_len);

        let metadata = mmap.overlay::<MetaDataDefinition>(0).unwrap();
        let offsets = CncOffsets::from_metadata(metadata);

        let bindings =
            IpcBindings::new(mmap, &offsets, 10_000_000_000, Some(Duration::from_millis(250))).unwrap();
        assert_eq!(bindings.inter_service_timeout(), Duration::from_millis(250));
    }
}
