//! `AddPublication` command: request the driver register a concurrent
//! publication for a channel/stream pair.
use crate::command::correlated_message::CorrelatedMessageDefn;
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;
use crate::util::{IndexT, Result};
use std::mem::size_of;

/// Wire layout for `AddPublication`/`AddExclusivePublication`:
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Client ID                              |
/// |                                                                |
/// +----------------------------------------------------------------+
/// |                       Correlation ID                           |
/// |                                                                |
/// +----------------------------------------------------------------+
/// |                         Stream ID                              |
/// +----------------------------------------------------------------+
/// |                       Channel Length                           |
/// +----------------------------------------------------------------+
/// |                          Channel                              ...
/// ...                                                              |
/// +----------------------------------------------------------------+
/// ```
#[repr(C, packed(4))]
pub struct PublicationMessageDefn {
    correlated_message: CorrelatedMessageDefn,
    stream_id: i32,
    channel_length: i32,
}

const CHANNEL_LENGTH_OFFSET: IndexT = (size_of::<CorrelatedMessageDefn>() + size_of::<i32>()) as IndexT;

impl<A> Flyweight<A, PublicationMessageDefn>
where
    A: AtomicBuffer,
{
    /// Client id of the request's originator.
    pub fn client_id(&self) -> i64 {
        self.get_struct().correlated_message.client_id
    }

    /// Set the client id of this request.
    pub fn put_client_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlated_message.client_id = value;
        self
    }

    /// Correlation id this request will be acknowledged under.
    pub fn correlation_id(&self) -> i64 {
        self.get_struct().correlated_message.correlation_id
    }

    /// Set the correlation id of this request.
    pub fn put_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlated_message.correlation_id = value;
        self
    }

    /// Stream id to publish under.
    pub fn stream_id(&self) -> i32 {
        self.get_struct().stream_id
    }

    /// Set the stream id to publish under.
    pub fn put_stream_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().stream_id = value;
        self
    }

    /// Channel URI for this publication.
    pub fn channel(&self) -> Result<&str> {
        self.string_get(CHANNEL_LENGTH_OFFSET)
    }

    /// Set the channel URI for this publication.
    pub fn put_channel(&mut self, value: &str) -> Result<&mut Self> {
        self.string_put(CHANNEL_LENGTH_OFFSET, value).map(|_| self)
    }

    /// Total encoded byte length of this command, channel included.
    pub fn length(&self) -> IndexT {
        size_of::<PublicationMessageDefn>() as IndexT + self.get_struct().channel_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::flyweight::Flyweight;

    #[test]
    fn encodes_channel_and_stream() {
        let buffer = vec![0u8; 256];
        let mut msg = Flyweight::new::<PublicationMessageDefn>(buffer, 0).unwrap();
        msg.put_client_id(7).put_correlation_id(42).put_stream_id(10);
        msg.put_channel("aeron:ipc").unwrap();

        assert_eq!(msg.client_id(), 7);
        assert_eq!(msg.correlation_id(), 42);
        assert_eq!(msg.stream_id(), 10);
        assert_eq!(msg.channel().unwrap(), "aeron:ipc");
        assert_eq!(msg.length(), size_of::<PublicationMessageDefn>() as IndexT + "aeron:ipc".len() as IndexT);
    }
}
