//! High-level interface for issuing commands to the media driver over the
//! to-driver command ring. Each method claims scratch space, encodes a
//! flyweight into it, and publishes; on backpressure it returns
//! [`AeronError::IllegalState`] rather than blocking, leaving the retry
//! decision to [`crate::client_conductor::ClientConductor`].
use crate::command::correlated_message::CorrelatedMessageDefn;
use crate::command::exclusive_publication_message::ExclusivePublicationMessageDefn;
use crate::command::flyweight::Flyweight;
use crate::command::publication_message::PublicationMessageDefn;
use crate::command::remove_message::RemoveMessageDefn;
use crate::command::subscription_message::SubscriptionMessageDefn;
use crate::concurrent::ringbuffer::ManyToOneRingBuffer;
use crate::concurrent::AtomicBuffer;
use crate::control_protocol::ClientCommand;
use crate::util::{AeronError, IndexT, Result};

/// Fixed-size scratch buffer a single command is encoded into before being
/// copied onto the ring. Large enough for any command this proxy issues,
/// channel strings included.
const COMMAND_BUFFER_SIZE: usize = 1024;

/// No prior subscription scoping; the common value for
/// [`DriverProxy::add_subscription`].
const NULL_REGISTRATION_ID: i64 = -1;

/// Keepalives are fire-and-forget: there is no response to correlate, so
/// the correlation id field is set to this sentinel.
const KEEPALIVE_CORRELATION_ID: i64 = -1;

/// Thin command encoder wrapping the to-driver ring. Constructing one
/// claims this client's id from the ring's shared correlation counter.
pub struct DriverProxy<A>
where
    A: AtomicBuffer,
{
    to_driver: ManyToOneRingBuffer<A>,
    client_id: i64,
}

impl<A> DriverProxy<A>
where
    A: AtomicBuffer,
{
    /// Wrap the to-driver ring buffer, claiming a client id from it.
    pub fn new(to_driver: ManyToOneRingBuffer<A>) -> Self {
        let client_id = to_driver.next_correlation_id();
        DriverProxy { to_driver, client_id }
    }

    /// Client id embedded in every command this proxy issues.
    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// Allocate the next correlation id from the shared ring counter.
    pub fn next_correlation_id(&self) -> i64 {
        self.to_driver.next_correlation_id()
    }

    /// Timestamp of the driver's last heartbeat, ms since the Unix epoch.
    /// `0` until the first heartbeat is observed.
    pub fn time_of_last_driver_keepalive(&self) -> i64 {
        self.to_driver.consumer_heartbeat_time()
    }

    /// Request the driver register a concurrent publication. Returns the
    /// correlation id the eventual `OnPublicationReady`/`OnError` response
    /// will carry.
    pub fn add_publication(&mut self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let client_id = self.client_id;
        self.write_command(ClientCommand::AddPublication, |buffer| {
            let mut msg = Flyweight::new::<PublicationMessageDefn>(buffer, 0)?;
            msg.put_client_id(client_id)
                .put_correlation_id(correlation_id)
                .put_stream_id(stream_id);
            msg.put_channel(channel)?;
            Ok(msg.length())
        })?;
        Ok(correlation_id)
    }

    /// Request the driver register an exclusive (single producer)
    /// publication.
    pub fn add_exclusive_publication(&mut self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let client_id = self.client_id;
        self.write_command(ClientCommand::AddExclusivePublication, |buffer| {
            let mut msg = Flyweight::new::<ExclusivePublicationMessageDefn>(buffer, 0)?;
            msg.put_client_id(client_id)
                .put_correlation_id(correlation_id)
                .put_stream_id(stream_id);
            msg.put_channel(channel)?;
            Ok(msg.length())
        })?;
        Ok(correlation_id)
    }

    /// Request the driver remove a previously registered publication.
    pub fn remove_publication(&mut self, registration_id: i64) -> Result<i64> {
        self.remove(ClientCommand::RemovePublication, registration_id)
    }

    /// Request the driver register a subscription, optionally scoped to a
    /// specific prior publication's image set via
    /// `registration_correlation_id`.
    pub fn add_subscription(
        &mut self,
        channel: &str,
        stream_id: i32,
        registration_correlation_id: Option<i64>,
    ) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let client_id = self.client_id;
        let scoping_id = registration_correlation_id.unwrap_or(NULL_REGISTRATION_ID);
        self.write_command(ClientCommand::AddSubscription, |buffer| {
            let mut msg = Flyweight::new::<SubscriptionMessageDefn>(buffer, 0)?;
            msg.put_client_id(client_id)
                .put_correlation_id(correlation_id)
                .put_registration_correlation_id(scoping_id)
                .put_stream_id(stream_id);
            msg.put_channel(channel)?;
            Ok(msg.length())
        })?;
        Ok(correlation_id)
    }

    /// Request the driver remove a previously registered subscription.
    pub fn remove_subscription(&mut self, registration_id: i64) -> Result<i64> {
        self.remove(ClientCommand::RemoveSubscription, registration_id)
    }

    /// Send a keepalive, proving this client is still alive to the
    /// driver. Fire-and-forget: no response is expected.
    pub fn client_keepalive(&mut self) -> Result<()> {
        let client_id = self.client_id;
        self.write_command(ClientCommand::ClientKeepalive, |buffer| {
            let mut msg = Flyweight::new::<CorrelatedMessageDefn>(buffer, 0)?;
            msg.put_client_id(client_id).put_correlation_id(KEEPALIVE_CORRELATION_ID);
            Ok(std::mem::size_of::<CorrelatedMessageDefn>() as IndexT)
        })
    }

    fn remove(&mut self, command: ClientCommand, registration_id: i64) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let client_id = self.client_id;
        self.write_command(command, |buffer| {
            let mut msg = Flyweight::new::<RemoveMessageDefn>(buffer, 0)?;
            msg.put_client_id(client_id)
                .put_correlation_id(correlation_id)
                .put_registration_id(registration_id);
            Ok(std::mem::size_of::<RemoveMessageDefn>() as IndexT)
        })?;
        Ok(correlation_id)
    }

    fn write_command<F>(&mut self, command: ClientCommand, filler: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]) -> Result<IndexT>,
    {
        let mut scratch = [0u8; COMMAND_BUFFER_SIZE];
        let mut source: &mut [u8] = &mut scratch[..];
        let length = filler(&mut *source)?;

        if self.to_driver.write(command as i32, &source, 0, length)? {
            Ok(())
        } else {
            Err(AeronError::IllegalState)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrent::ringbuffer::buffer_descriptor;

    const BUFFER_SIZE: usize = 4096 + buffer_descriptor::TRAILER_LENGTH as usize;

    fn new_proxy() -> DriverProxy<Vec<u8>> {
        let ring = ManyToOneRingBuffer::new(vec![0u8; BUFFER_SIZE]).unwrap();
        DriverProxy::new(ring)
    }

    #[test]
    fn add_publication_writes_expected_command() {
        let mut proxy = new_proxy();
        let client_id = proxy.client_id();
        let correlation_id = proxy.add_publication("aeron:ipc", 42).unwrap();

        let mut seen = None;
        proxy
            .to_driver
            .read(|msg_type, body| {
                let msg = Flyweight::new::<PublicationMessageDefn>(body.to_vec(), 0).unwrap();
                seen = Some((msg_type, msg.client_id(), msg.correlation_id(), msg.stream_id(), msg.channel().unwrap().to_string()));
            })
            .unwrap();

        let (msg_type, seen_client, seen_correlation, stream_id, channel) = seen.unwrap();
        assert_eq!(msg_type, ClientCommand::AddPublication as i32);
        assert_eq!(seen_client, client_id);
        assert_eq!(seen_correlation, correlation_id);
        assert_eq!(stream_id, 42);
        assert_eq!(channel, "aeron:ipc");
    }

    #[test]
    fn remove_publication_carries_registration_id() {
        let mut proxy = new_proxy();
        proxy.remove_publication(777).unwrap();

        let mut seen = None;
        proxy
            .to_driver
            .read(|msg_type, body| {
                let msg = Flyweight::new::<RemoveMessageDefn>(body.to_vec(), 0).unwrap();
                seen = Some((msg_type, msg.registration_id()));
            })
            .unwrap();

        assert_eq!(seen, Some((ClientCommand::RemovePublication as i32, 777)));
    }

    #[test]
    fn keepalive_uses_sentinel_correlation_id() {
        let mut proxy = new_proxy();
        proxy.client_keepalive().unwrap();

        let mut seen = None;
        proxy
            .to_driver
            .read(|msg_type, body| {
                let msg = Flyweight::new::<CorrelatedMessageDefn>(body.to_vec(), 0).unwrap();
                seen = Some((msg_type, msg.correlation_id()));
            })
            .unwrap();

        assert_eq!(seen, Some((ClientCommand::ClientKeepalive as i32, KEEPALIVE_CORRELATION_ID)));
    }

    #[test]
    fn successive_correlation_ids_increase() {
        let mut proxy = new_proxy();
        let a = proxy.add_publication("aeron:ipc", 1).unwrap();
        let b = proxy.add_publication("aeron:ipc", 2).unwrap();
        assert!(b > a);
    }
}
