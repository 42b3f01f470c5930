//! `OnPublicationReady`/`OnExclusivePublicationReady` responses: unlike a
//! plain [`super::operation_succeeded::OperationSucceededDefn`]
//! acknowledgement, registering a publication hands back the driver-assigned
//! session id and the log file backing its term buffers, so it gets its own
//! wire shape rather than riding the generic success path.
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;
use crate::util::{IndexT, Result};
use std::mem::size_of;

/// `OnPublicationReady`/`OnExclusivePublicationReady`: identifies the
/// request being acknowledged, the registration and session ids the driver
/// assigned, and the log file backing the publication's term buffers.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Correlation ID                           |
/// |                                                                |
/// +----------------------------------------------------------------+
/// |                      Registration ID                           |
/// |                                                                |
/// +----------------------------------------------------------------+
/// |                        Stream ID                               |
/// +----------------------------------------------------------------+
/// |                        Session ID                              |
/// +----------------------------------------------------------------+
/// |                 Position Limit Counter ID                      |
/// +----------------------------------------------------------------+
/// |               Channel Status Indicator ID                      |
/// +----------------------------------------------------------------+
/// |                   Log File Name Length                         |
/// +----------------------------------------------------------------+
/// |                      Log File Name                           ...
/// ...                                                              |
/// +----------------------------------------------------------------+
/// ```
#[repr(C, packed(4))]
pub struct PublicationBuffersReadyDefn {
    correlation_id: i64,
    registration_id: i64,
    stream_id: i32,
    session_id: i32,
    position_limit_counter_id: i32,
    channel_status_indicator_id: i32,
}

const LOG_FILE_NAME_OFFSET: IndexT = size_of::<PublicationBuffersReadyDefn>() as IndexT;

impl<A> Flyweight<A, PublicationBuffersReadyDefn>
where
    A: AtomicBuffer,
{
    /// Correlation id of the `AddPublication`/`AddExclusivePublication`
    /// request this acknowledges.
    pub fn correlation_id(&self) -> i64 {
        self.get_struct().correlation_id
    }

    /// Set the correlation id being acknowledged.
    pub fn put_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlation_id = value;
        self
    }

    /// Registration id assigned to the publication this request created.
    pub fn registration_id(&self) -> i64 {
        self.get_struct().registration_id
    }

    /// Set the registration id of the publication this request created.
    pub fn put_registration_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().registration_id = value;
        self
    }

    /// Stream id the publication was registered on.
    pub fn stream_id(&self) -> i32 {
        self.get_struct().stream_id
    }

    /// Set the stream id the publication was registered on.
    pub fn put_stream_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().stream_id = value;
        self
    }

    /// Session id the driver assigned this publication.
    pub fn session_id(&self) -> i32 {
        self.get_struct().session_id
    }

    /// Set the session id the driver assigned this publication.
    pub fn put_session_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().session_id = value;
        self
    }

    /// Counter id tracking the publication's position limit.
    pub fn position_limit_counter_id(&self) -> i32 {
        self.get_struct().position_limit_counter_id
    }

    /// Set the counter id tracking the publication's position limit.
    pub fn put_position_limit_counter_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().position_limit_counter_id = value;
        self
    }

    /// Counter id tracking the channel's status.
    pub fn channel_status_indicator_id(&self) -> i32 {
        self.get_struct().channel_status_indicator_id
    }

    /// Set the counter id tracking the channel's status.
    pub fn put_channel_status_indicator_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().channel_status_indicator_id = value;
        self
    }

    /// Name of the memory-mapped log file backing this publication's term
    /// buffers.
    pub fn log_file_name(&self) -> Result<&str> {
        self.string_get(LOG_FILE_NAME_OFFSET)
    }

    /// Set the log file name.
    pub fn put_log_file_name(&mut self, value: &str) -> Result<&mut Self> {
        self.string_put(LOG_FILE_NAME_OFFSET, value)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publication_ready_round_trips_session_and_log_file() {
        let buffer = vec![0u8; 256];
        let mut msg = Flyweight::new::<PublicationBuffersReadyDefn>(buffer, 0).unwrap();
        msg.put_correlation_id(1)
            .put_registration_id(1)
            .put_stream_id(42)
            .put_session_id(99)
            .put_position_limit_counter_id(2)
            .put_channel_status_indicator_id(3);
        msg.put_log_file_name("ipc-term-log").unwrap();

        assert_eq!(msg.correlation_id(), 1);
        assert_eq!(msg.registration_id(), 1);
        assert_eq!(msg.stream_id(), 42);
        assert_eq!(msg.session_id(), 99);
        assert_eq!(msg.log_file_name().unwrap(), "ipc-term-log");
    }
}
