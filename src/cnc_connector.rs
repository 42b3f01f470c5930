//! Handshake engine that establishes, within a bounded time, an attached
//! view of a running driver's CnC file.
//!
//! Every step below can fail; on any failure the partially-constructed
//! [`memmap::MmapMut`] (if one was ever created) simply falls out of scope
//! and is unmapped by its own `Drop` impl, so there is no separate guard
//! type to remember to release.

use crate::clock::EpochClock;
use crate::cnc_descriptor::{CncOffsets, MetaDataDefinition, CNC_FILE, CNC_VERSION};
use crate::concurrent::ringbuffer::ManyToOneRingBuffer;
use crate::concurrent::AtomicBuffer;
use crate::error::ClientError;
use memmap::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

type Result<T> = std::result::Result<T, ClientError>;

/// How often to poll for the CnC file's existence before it has been
/// created by the driver.
const FILE_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// How often to poll a field the driver publishes asynchronously (version,
/// first heartbeat) once the file exists.
const FIELD_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Delay before restarting the handshake after a stale CnC file is
/// detected, giving a restarted driver time to create a fresh one.
const STALE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Runs the CnC handshake to completion against a configured Aeron
/// directory.
pub struct CncConnector {
    directory: PathBuf,
    driver_timeout: Duration,
}

impl CncConnector {
    /// Build a connector that looks for the CnC file in `directory` and
    /// gives the driver up to `driver_timeout` to satisfy each handshake
    /// step.
    pub fn new(directory: PathBuf, driver_timeout: Duration) -> Self {
        CncConnector { directory, driver_timeout }
    }

    /// Run the handshake, returning the mapped CnC region and its computed
    /// sub-region offsets. Bounded by `driver_timeout` end to end, not
    /// per-step; a stale-heartbeat reconnect consumes the same budget as
    /// the original attempt.
    pub fn connect(&self, clock: &dyn EpochClock) -> Result<(MmapMut, CncOffsets)> {
        let t0 = clock.time_ms();

        loop {
            let mmap = self.await_file_and_map(t0, clock)?;
            let mut mmap = self.await_version(mmap, t0, clock)?;

            let offsets = {
                let metadata = self.metadata_of(&mmap, t0, clock)?;
                CncOffsets::from_metadata(metadata)
            };

            let heartbeat = self.await_first_heartbeat(&mut mmap, &offsets, t0, clock)?;
            let now = clock.time_ms();
            let timeout_ms = self.driver_timeout.as_millis() as i64;

            if heartbeat < now - timeout_ms {
                if now - t0 > timeout_ms {
                    return Err(self.timeout("no driver heartbeat detected", t0, clock));
                }
                log::warn!(
                    "stale CnC heartbeat ({}ms old); unmapping and retrying handshake",
                    now - heartbeat
                );
                drop(mmap);
                sleep(STALE_RETRY_DELAY);
                continue;
            }

            log::debug!("driver handshake complete after {}ms", now - t0);
            return Ok((mmap, offsets));
        }
    }

    fn await_file_and_map(&self, t0: i64, clock: &dyn EpochClock) -> Result<MmapMut> {
        let path = self.directory.join(CNC_FILE);
        while !path.exists() {
            if clock.time_ms() - t0 > self.driver_timeout.as_millis() as i64 {
                return Err(self.timeout("CnC file not found", t0, clock));
            }
            sleep(FILE_POLL_INTERVAL);
        }
        log::debug!("CnC file found at {:?}", path);

        map_file(&path).map_err(|_| self.timeout("CnC file could not be mapped", t0, clock))
    }

    fn await_version(&self, mmap: MmapMut, t0: i64, clock: &dyn EpochClock) -> Result<MmapMut> {
        loop {
            let version = self.metadata_of(&mmap, t0, clock)?.version();
            if version != 0 {
                if version != CNC_VERSION {
                    return Err(ClientError::UnsupportedCncVersion {
                        observed: version,
                        expected: CNC_VERSION,
                    });
                }
                log::debug!("CnC version {} observed after {}ms", version, clock.time_ms() - t0);
                return Ok(mmap);
            }
            if clock.time_ms() - t0 > self.driver_timeout.as_millis() as i64 {
                return Err(self.timeout("CnC file is created but not initialised", t0, clock));
            }
            sleep(FIELD_POLL_INTERVAL);
        }
    }

    fn await_first_heartbeat(
        &self,
        mmap: &mut MmapMut,
        offsets: &CncOffsets,
        t0: i64,
        clock: &dyn EpochClock,
    ) -> Result<i64> {
        loop {
            let heartbeat = self.read_heartbeat(mmap, offsets, t0, clock)?;
            if heartbeat != 0 {
                return Ok(heartbeat);
            }
            if clock.time_ms() - t0 > self.driver_timeout.as_millis() as i64 {
                return Err(self.timeout("No driver heartbeat detected", t0, clock));
            }
            sleep(FIELD_POLL_INTERVAL);
        }
    }

    fn read_heartbeat(
        &self,
        mmap: &mut MmapMut,
        offsets: &CncOffsets,
        t0: i64,
        clock: &dyn EpochClock,
    ) -> Result<i64> {
        let window = &mut mmap[offsets.to_driver_offset..offsets.to_driver_offset + offsets.to_driver_length];
        let ring = ManyToOneRingBuffer::new(window)
            .map_err(|_| self.timeout("to-driver buffer is malformed", t0, clock))?;
        Ok(ring.consumer_heartbeat_time())
    }

    fn metadata_of<'a>(&self, mmap: &'a MmapMut, t0: i64, clock: &dyn EpochClock) -> Result<&'a MetaDataDefinition> {
        mmap.overlay::<MetaDataDefinition>(0)
            .map_err(|_| self.timeout("CnC file is smaller than its own metadata header", t0, clock))
    }

    fn timeout(&self, context: &'static str, t0: i64, clock: &dyn EpochClock) -> ClientError {
        ClientError::DriverTimeout {
            context,
            elapsed: Duration::from_millis((clock.time_ms() - t0).max(0) as u64),
            limit: self.driver_timeout,
        }
    }
}

fn map_file(path: &Path) -> std::io::Result<MmapMut> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    unsafe { MmapMut::map_mut(&file) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemEpochClock;
    use crate::cnc_descriptor::META_DATA_LENGTH;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_blank_cnc(dir: &Path, total_len: usize) {
        let path = dir.join(CNC_FILE);
        let mut file = File::create(path).unwrap();
        file.write_all(&vec![0u8; total_len]).unwrap();
    }

    #[test]
    fn missing_file_times_out() {
        let dir = tempdir().unwrap();
        let connector = CncConnector::new(dir.path().to_path_buf(), Duration::from_millis(20));
        let clock = SystemEpochClock;

        let err = connector.connect(&clock).unwrap_err();
        match err {
            ClientError::DriverTimeout { context, .. } => assert_eq!(context, "CnC file not found"),
            other => panic!("expected DriverTimeout, got {:?}", other),
        }
    }

    #[test]
    fn unpublished_version_times_out() {
        let dir = tempdir().unwrap();
        write_blank_cnc(dir.path(), META_DATA_LENGTH + 4096);
        let connector = CncConnector::new(dir.path().to_path_buf(), Duration::from_millis(20));
        let clock = SystemEpochClock;

        let err = connector.connect(&clock).unwrap_err();
        match err {
            ClientError::DriverTimeout { context, .. } => {
                assert_eq!(context, "CnC file is created but not initialised")
            }
            other => panic!("expected DriverTimeout, got {:?}", other),
        }
    }

    #[test]
    fn version_mismatch_is_reported() {
        let dir = tempdir().unwrap();
        let total_len = META_DATA_LENGTH + 4096;
        write_blank_cnc(dir.path(), total_len);

        {
            let path = dir.path().join(CNC_FILE);
            let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            let mut mmap = unsafe { MmapMut::map_mut(&file).unwrap() };
            mmap.put_i32_ordered(0, CNC_VERSION + 1).unwrap();
        }

        let connector = CncConnector::new(dir.path().to_path_buf(), Duration::from_millis(50));
        let clock = SystemEpochClock;

        let err = connector.connect(&clock).unwrap_err();
        match err {
            ClientError::UnsupportedCncVersion { observed, expected } => {
                assert_eq!(observed, CNC_VERSION + 1);
                assert_eq!(expected, CNC_VERSION);
            }
            other => panic!("expected UnsupportedCncVersion, got {:?}", other),
        }
    }
}
