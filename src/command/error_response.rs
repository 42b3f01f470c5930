//! `OnError` response: the driver rejected a registration request.
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;
use crate::util::{IndexT, Result};
use std::mem::size_of;

#[repr(C, packed(4))]
pub struct ErrorResponseDefn {
    offending_correlation_id: i64,
    error_code: i32,
}

const ERROR_MESSAGE_OFFSET: IndexT = size_of::<ErrorResponseDefn>() as IndexT;

impl<A> Flyweight<A, ErrorResponseDefn>
where
    A: AtomicBuffer,
{
    /// Correlation id of the request the driver rejected.
    pub fn offending_correlation_id(&self) -> i64 {
        self.get_struct().offending_correlation_id
    }

    /// Set the correlation id of the rejected request.
    pub fn put_offending_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().offending_correlation_id = value;
        self
    }

    /// Driver-assigned error code.
    pub fn error_code(&self) -> i32 {
        self.get_struct().error_code
    }

    /// Set the driver-assigned error code.
    pub fn put_error_code(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().error_code = value;
        self
    }

    /// Human-readable error message from the driver.
    pub fn error_message(&self) -> Result<&str> {
        self.string_get(ERROR_MESSAGE_OFFSET)
    }

    /// Set the error message body.
    pub fn put_error_message(&mut self, value: &str) -> Result<&mut Self> {
        self.string_put(ERROR_MESSAGE_OFFSET, value).map(|_| self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_code_and_message() {
        let buffer = vec![0u8; 256];
        let mut msg = Flyweight::new::<ErrorResponseDefn>(buffer, 0).unwrap();
        msg.put_offending_correlation_id(9).put_error_code(3);
        msg.put_error_message("channel unknown").unwrap();

        assert_eq!(msg.offending_correlation_id(), 9);
        assert_eq!(msg.error_code(), 3);
        assert_eq!(msg.error_message().unwrap(), "channel unknown");
    }
}
