//! `AddSubscription` command.
use crate::command::correlated_message::CorrelatedMessageDefn;
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;
use crate::util::{IndexT, Result};
use std::mem::size_of;

/// Wire layout for `AddSubscription`:
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
/// |                 Registration Correlation ID                   |
/// |                                                                |
/// +----------------------------------------------------------------+
/// |                         Stream Id                              |
/// +----------------------------------------------------------------+
/// |                      Channel Length                            |
/// +----------------------------------------------------------------+
/// |                          Channel                              ...
/// ...                                                              |
/// +----------------------------------------------------------------+
/// ```
///
/// `registration_correlation_id` ties a subscription to a specific prior
/// publication's image set; `-1` when the subscription isn't scoped that
/// way (the common case for `add_subscription`).
#[repr(C, packed(4))]
pub struct SubscriptionMessageDefn {
    correlated_message: CorrelatedMessageDefn,
    registration_correlation_id: i64,
    stream_id: i32,
    channel_length: i32,
}

const CHANNEL_LENGTH_OFFSET: IndexT =
    (size_of::<CorrelatedMessageDefn>() + size_of::<i64>() + size_of::<i32>()) as IndexT;

impl<A> Flyweight<A, SubscriptionMessageDefn>
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

    /// Correlation id of a prior publication request this subscription is
    /// scoped to; `-1` when unused.
    pub fn registration_correlation_id(&self) -> i64 {
        self.get_struct().registration_correlation_id
    }

    /// Set the scoping correlation id. Pass `-1` for a plain subscription.
    pub fn put_registration_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().registration_correlation_id = value;
        self
    }

    /// Stream id to subscribe to.
    pub fn stream_id(&self) -> i32 {
        self.get_struct().stream_id
    }

    /// Set the stream id to subscribe to.
    pub fn put_stream_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().stream_id = value;
        self
    }

    /// Channel URI to subscribe to.
    pub fn channel(&self) -> Result<&str> {
        self.string_get(CHANNEL_LENGTH_OFFSET)
    }

    /// Set the channel URI to subscribe to.
    pub fn put_channel(&mut self, value: &str) -> Result<&mut Self> {
        self.string_put(CHANNEL_LENGTH_OFFSET, value)?;
        Ok(self)
    }

    /// Total encoded byte length of this command, channel included.
    pub fn length(&self) -> IndexT {
        size_of::<SubscriptionMessageDefn>() as IndexT + self.get_struct().channel_length
    }
}
