//! `OnAvailableImage`/`OnUnavailableImage` responses: asynchronous
//! notifications about a subscription's images, not responses to a
//! specific pending request. Dispatched straight to the
//! `availableImageHandler`/`unavailableImageHandler` callbacks.
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;
use crate::util::{IndexT, Result};
use std::mem::size_of;

/// `OnAvailableImage`: identifies the subscription, the image's session,
/// the log file backing it, and the position counter tracking it.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Correlation ID                           |
/// |                                                                |
/// +----------------------------------------------------------------+
/// |               Subscription Registration ID                    |
/// |                                                                |
/// +----------------------------------------------------------------+
/// |                        Stream ID                               |
/// +----------------------------------------------------------------+
/// |                        Session ID                              |
/// +----------------------------------------------------------------+
/// |                 Subscriber Position ID                         |
/// +----------------------------------------------------------------+
/// |                   Log File Name Length                         |
/// +----------------------------------------------------------------+
/// |                      Log File Name                           ...
/// ...                                                              |
/// +----------------------------------------------------------------+
/// |                 Source Identity Length                         |
/// +----------------------------------------------------------------+
/// |                     Source Identity                          ...
/// ...                                                              |
/// +----------------------------------------------------------------+
/// ```
#[repr(C, packed(4))]
pub struct ImageBuffersReadyDefn {
    correlation_id: i64,
    subscription_registration_id: i64,
    stream_id: i32,
    session_id: i32,
    subscriber_position_id: i32,
}

const LOG_FILE_NAME_OFFSET: IndexT = size_of::<ImageBuffersReadyDefn>() as IndexT;

impl<A> Flyweight<A, ImageBuffersReadyDefn>
where
    A: AtomicBuffer,
{
    /// Correlation id of the `AddSubscription` request that created the
    /// subscription this image belongs to. Not itself a pending-request
    /// key: image notifications don't resolve a request, they invoke the
    /// available-image callback directly.
    pub fn correlation_id(&self) -> i64 {
        self.get_struct().correlation_id
    }

    /// Set the originating subscription's correlation id.
    pub fn put_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlation_id = value;
        self
    }

    /// Registration id of the subscription this image belongs to.
    pub fn subscription_registration_id(&self) -> i64 {
        self.get_struct().subscription_registration_id
    }

    /// Set the registration id of the subscription this image belongs to.
    pub fn put_subscription_registration_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().subscription_registration_id = value;
        self
    }

    /// Stream id this image is publishing on.
    pub fn stream_id(&self) -> i32 {
        self.get_struct().stream_id
    }

    /// Set the stream id this image is publishing on.
    pub fn put_stream_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().stream_id = value;
        self
    }

    /// Session id of the publisher that created this image.
    pub fn session_id(&self) -> i32 {
        self.get_struct().session_id
    }

    /// Set the session id of the publisher that created this image.
    pub fn put_session_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().session_id = value;
        self
    }

    /// Counter id tracking this image's consumption position.
    pub fn subscriber_position_id(&self) -> i32 {
        self.get_struct().subscriber_position_id
    }

    /// Set the counter id tracking this image's consumption position.
    pub fn put_subscriber_position_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().subscriber_position_id = value;
        self
    }

    /// Name of the memory-mapped log file backing this image's term
    /// buffers.
    pub fn log_file_name(&self) -> Result<&str> {
        self.string_get(LOG_FILE_NAME_OFFSET)
    }

    /// Set the log file name. Must be called before
    /// [`put_source_identity`](Self::put_source_identity), since the
    /// source identity is written immediately after it.
    pub fn put_log_file_name(&mut self, value: &str) -> Result<&mut Self> {
        self.string_put(LOG_FILE_NAME_OFFSET, value)?;
        Ok(self)
    }

    /// Human-readable identity of the image's source (e.g. a UDP
    /// endpoint); empty for IPC images.
    pub fn source_identity(&self) -> Result<&str> {
        self.string_get(self.source_identity_offset()?)
    }

    /// Set the source identity, following an already-written log file
    /// name.
    pub fn put_source_identity(&mut self, value: &str) -> Result<&mut Self> {
        let offset = self.source_identity_offset()?;
        self.string_put(offset, value)?;
        Ok(self)
    }

    fn source_identity_offset(&self) -> Result<IndexT> {
        let log_file_len = self.buffer.get_i32(self.base_offset() + LOG_FILE_NAME_OFFSET)?;
        Ok(LOG_FILE_NAME_OFFSET + 4 + log_file_len)
    }
}

/// `OnUnavailableImage`: the subset of [`ImageBuffersReadyDefn`] needed to
/// identify which image went away; no log file name or position counter,
/// since the receiving client is tearing those resources down, not
/// mapping them.
#[repr(C, packed(4))]
pub struct ImageMessageDefn {
    correlation_id: i64,
    subscription_registration_id: i64,
    stream_id: i32,
}

impl<A> Flyweight<A, ImageMessageDefn>
where
    A: AtomicBuffer,
{
    /// Correlation id of the subscription this image belonged to.
    pub fn correlation_id(&self) -> i64 {
        self.get_struct().correlation_id
    }

    /// Set the originating subscription's correlation id.
    pub fn put_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlation_id = value;
        self
    }

    /// Registration id of the subscription this image belonged to.
    pub fn subscription_registration_id(&self) -> i64 {
        self.get_struct().subscription_registration_id
    }

    /// Set the registration id of the subscription this image belonged to.
    pub fn put_subscription_registration_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().subscription_registration_id = value;
        self
    }

    /// Stream id the image was publishing on.
    pub fn stream_id(&self) -> i32 {
        self.get_struct().stream_id
    }

    /// Set the stream id the image was publishing on.
    pub fn put_stream_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().stream_id = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_image_round_trips_names() {
        let buffer = vec![0u8; 512];
        let mut msg = Flyweight::new::<ImageBuffersReadyDefn>(buffer, 0).unwrap();
        msg.put_correlation_id(1)
            .put_subscription_registration_id(2)
            .put_stream_id(3)
            .put_session_id(4)
            .put_subscriber_position_id(5);
        msg.put_log_file_name("term-log-1").unwrap();
        msg.put_source_identity("127.0.0.1:40001").unwrap();

        assert_eq!(msg.log_file_name().unwrap(), "term-log-1");
        assert_eq!(msg.source_identity().unwrap(), "127.0.0.1:40001");
    }

    #[test]
    fn unavailable_image_identifies_subscription() {
        let buffer = vec![0u8; 64];
        let mut msg = Flyweight::new::<ImageMessageDefn>(buffer, 0).unwrap();
        msg.put_correlation_id(1).put_subscription_registration_id(2).put_stream_id(3);

        assert_eq!(msg.correlation_id(), 1);
        assert_eq!(msg.subscription_registration_id(), 2);
        assert_eq!(msg.stream_id(), 3);
    }
}
