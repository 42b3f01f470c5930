//! `OnOperationSuccess` response: acknowledges a request that has no
//! payload of its own (removes, subscription registration, counter
//! registration). Carries the registration id the driver assigned so the
//! conductor can resolve a pending request with the identity of the
//! resource it created.
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;

#[repr(C, packed(4))]
pub struct OperationSucceededDefn {
    correlation_id: i64,
    registration_id: i64,
}

impl<A> Flyweight<A, OperationSucceededDefn>
where
    A: AtomicBuffer,
{
    /// Correlation id of the request this acknowledges.
    pub fn correlation_id(&self) -> i64 {
        self.get_struct().correlation_id
    }

    /// Set the correlation id being acknowledged.
    pub fn put_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlation_id = value;
        self
    }

    /// Registration id assigned to the resource this request created.
    pub fn registration_id(&self) -> i64 {
        self.get_struct().registration_id
    }

    /// Set the registration id of the resource this request created.
    pub fn put_registration_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().registration_id = value;
        self
    }
}
