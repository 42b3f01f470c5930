//! Header shared by every command a client writes to the to-driver ring:
//! the client id and correlation id that let the driver's response be
//! paired back up with the request that caused it.
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;

/// Client id + correlation id pair prefixing every outbound command.
#[repr(C, packed(4))]
pub struct CorrelatedMessageDefn {
    pub(in crate::command) client_id: i64,
    pub(in crate::command) correlation_id: i64,
}

impl<A> Flyweight<A, CorrelatedMessageDefn>
where
    A: AtomicBuffer,
{
    /// Client id of the request's originator.
    pub fn client_id(&self) -> i64 {
        self.get_struct().client_id
    }

    /// Set the client id of this request.
    pub fn put_client_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().client_id = value;
        self
    }

    /// Correlation id uniquely identifying this request/response pair.
    pub fn correlation_id(&self) -> i64 {
        self.get_struct().correlation_id
    }

    /// Set the correlation id of this request.
    pub fn put_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlation_id = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn header_is_two_i64s() {
        assert_eq!(size_of::<CorrelatedMessageDefn>(), 16);
    }
}
