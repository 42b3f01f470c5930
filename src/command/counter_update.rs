//! `OnCounterReady`/`OnCounterUnavailable` responses.
use crate::command::flyweight::Flyweight;
use crate::concurrent::AtomicBuffer;

#[repr(C, packed(4))]
pub struct CounterUpdateDefn {
    correlation_id: i64,
    counter_id: i32,
}

impl<A> Flyweight<A, CounterUpdateDefn>
where
    A: AtomicBuffer,
{
    /// Correlation id of the `AddCounter` request this notification
    /// concerns.
    pub fn correlation_id(&self) -> i64 {
        self.get_struct().correlation_id
    }

    /// Set the correlation id this notification concerns.
    pub fn put_correlation_id(&mut self, value: i64) -> &mut Self {
        self.get_struct_mut().correlation_id = value;
        self
    }

    /// Id of the counter slot in the counters values buffer.
    pub fn counter_id(&self) -> i32 {
        self.get_struct().counter_id
    }

    /// Set the counter id.
    pub fn put_counter_id(&mut self, value: i32) -> &mut Self {
        self.get_struct_mut().counter_id = value;
        self
    }
}
