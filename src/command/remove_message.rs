//! `RemovePublication`/`RemoveSubscription` commands. Both reference the
//! resource to remove by its registration id, not a fresh correlation id.
use crate::command::correlated_message::CorrelatedMessageDefn;
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;

#[repr(C, packed(4))]
pub struct RemoveMessageDefn {
    correlated_message: CorrelatedMessageDefn,
    registration_id: i64,
}

impl<A> Flyweight<A, RemoveMessageDefn>
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

    /// Registration id of the publication/subscription being removed.
    pub fn registration_id(&self) -> i64 {
        self.get_struct().registration_id
    }

    /// Set the registration id of the resource being removed.
    pub fn put_registration_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().registration_id = value;
        self
    }
}
