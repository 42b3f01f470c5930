//! Top-level entry point: [`Aeron::connect`] bootstraps a
//! [`ClientConductor`] from a [`Context`] and hands back a handle safe to
//! call from any thread.

use crate::agent::{Agent, AgentInvoker, AgentRunner, BoxedThreadFactory};
use crate::client_conductor::ClientConductor;
use crate::client_lock::{ClientLock, Exclusive, ReentrantClientLock};
use crate::context::Context;
use crate::error::ClientError;
use crate::idle_strategy::IdleStrategy;
use crate::registration::{ExclusivePublication, Publication, RegistrationResult, Subscription};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const POLL_QUANTUM: Duration = Duration::from_millis(1);

/// Adapts a shared, lock-guarded [`ClientConductor`] to the [`Agent`]
/// contract so either harness in [`crate::agent`] can drive it without
/// knowing anything about the client lock.
struct ConductorAgent<L: ClientLock + 'static> {
    shared: Arc<Exclusive<L, ClientConductor>>,
}

impl<L: ClientLock + 'static> Agent for ConductorAgent<L> {
    fn on_start(&mut self) {
        log::debug!("client conductor starting");
    }

    fn do_work(&mut self) -> Result<usize, ClientError> {
        self.shared.with_lock(|conductor| conductor.do_work())
    }

    fn on_close(&mut self) {
        log::debug!("client conductor closing");
        self.shared.with_lock(|conductor| conductor.close());
    }

    fn role_name(&self) -> &str {
        "client-conductor"
    }
}

/// Which harness is driving the conductor's duty cycle. Wrapped in a
/// [`Mutex`] purely as internal plumbing to let [`Aeron`]'s public methods
/// take `&self`; contention on it is nonexistent in `Runner` mode (one
/// `close()` call) and expected-single-threaded in `Invoker` mode.
enum Harness<L: ClientLock + 'static> {
    Runner(Mutex<AgentRunner<ConductorAgent<L>, Box<dyn IdleStrategy>, BoxedThreadFactory>>),
    Invoker(Mutex<AgentInvoker<ConductorAgent<L>>>),
}

impl<L: ClientLock + 'static> Harness<L> {
    fn close(&self) {
        match self {
            Harness::Runner(runner) => runner.lock().unwrap().close(),
            Harness::Invoker(invoker) => invoker.lock().unwrap().close(),
        }
    }
}

/// A connected client. Every public operation locks the context's
/// configured [`ClientLock`] for only as long as it takes to enqueue a
/// command or read conductor state; registration calls release it between
/// polls so the harness (or, under the invoker, this same call) can make
/// progress.
pub struct Aeron<L: ClientLock + 'static = ReentrantClientLock> {
    shared: Arc<Exclusive<L, ClientConductor>>,
    harness: Harness<L>,
    driver_timeout: Duration,
    publication_connection_timeout: Duration,
}

impl<L: ClientLock + 'static> Aeron<L> {
    /// Conclude `ctx`, construct the conductor, and start the configured
    /// harness. On failure during any of those steps the partially
    /// constructed state (including the CnC mapping `conclude` produced)
    /// simply drops, unmapping the region, and the error propagates.
    pub fn connect(mut ctx: Context<L>) -> Result<Self, ClientError> {
        ctx.conclude()?;

        let bindings = ctx.bindings.take().expect("Context::conclude populates bindings");
        let driver_timeout = ctx.driver_timeout;
        let publication_connection_timeout = ctx.publication_connection_timeout;

        let conductor = ClientConductor::new(
            bindings,
            ctx.epoch_clock,
            ctx.nano_clock,
            driver_timeout,
            ctx.keep_alive_interval,
            ctx.error_handler,
            ctx.available_image_handler,
            ctx.unavailable_image_handler,
        );

        let shared = Arc::new(Exclusive::new(ctx.client_lock, conductor));
        let agent = ConductorAgent { shared: Arc::clone(&shared) };

        let harness = if ctx.use_conductor_agent_invoker {
            Harness::Invoker(Mutex::new(AgentInvoker::new(agent)))
        } else {
            let mut runner = AgentRunner::with_thread_factory(agent, ctx.idle_strategy, ctx.thread_factory);
            runner.start();
            Harness::Runner(Mutex::new(runner))
        };

        Ok(Aeron { shared, harness, driver_timeout, publication_connection_timeout })
    }

    /// Register a concurrent publication and block until the driver
    /// acknowledges it or [`Context::publication_connection_timeout`]
    /// elapses.
    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<Publication, ClientError> {
        let correlation_id = self.shared.with_lock(|c| c.begin_add_publication(channel, stream_id))?;
        self.await_registration(correlation_id, self.publication_connection_timeout, |result| match result {
            RegistrationResult::Publication(publication) => Ok(publication),
            RegistrationResult::Error { code, message } => Err(ClientError::Registration { code, message }),
            other => unreachable!("add_publication resolved to unexpected result: {other:?}"),
        })
    }

    /// Register an exclusive (single-producer) publication.
    pub fn add_exclusive_publication(
        &self,
        channel: &str,
        stream_id: i32,
    ) -> Result<ExclusivePublication, ClientError> {
        let correlation_id = self.shared.with_lock(|c| c.begin_add_exclusive_publication(channel, stream_id))?;
        self.await_registration(correlation_id, self.publication_connection_timeout, |result| match result {
            RegistrationResult::ExclusivePublication(publication) => Ok(publication),
            RegistrationResult::Error { code, message } => Err(ClientError::Registration { code, message }),
            other => unreachable!("add_exclusive_publication resolved to unexpected result: {other:?}"),
        })
    }

    /// Register a subscription.
    pub fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<Subscription, ClientError> {
        self.add_subscription_with_registration(channel, stream_id, None)
    }

    /// Register a subscription, tying it to a prior registration (used by
    /// multi-destination subscriptions that share a single registration
    /// id across several `AddDestination` calls).
    pub fn add_subscription_with_registration(
        &self,
        channel: &str,
        stream_id: i32,
        registration_correlation_id: Option<i64>,
    ) -> Result<Subscription, ClientError> {
        let correlation_id = self
            .shared
            .with_lock(|c| c.begin_add_subscription(channel, stream_id, registration_correlation_id))?;
        self.await_registration(correlation_id, self.publication_connection_timeout, |result| match result {
            RegistrationResult::Subscription(subscription) => Ok(subscription),
            RegistrationResult::Error { code, message } => Err(ClientError::Registration { code, message }),
            other => unreachable!("add_subscription resolved to unexpected result: {other:?}"),
        })
    }

    /// Release a publication by its registration id.
    pub fn release_publication(&self, registration_id: i64) -> Result<(), ClientError> {
        let correlation_id = self.shared.with_lock(|c| c.begin_release_publication(registration_id))?;
        self.await_registration(correlation_id, self.driver_timeout, |result| match result {
            RegistrationResult::Released => Ok(()),
            RegistrationResult::Error { code, message } => Err(ClientError::Registration { code, message }),
            other => unreachable!("release_publication resolved to unexpected result: {other:?}"),
        })
    }

    /// Release a subscription by its registration id.
    pub fn release_subscription(&self, registration_id: i64) -> Result<(), ClientError> {
        let correlation_id = self.shared.with_lock(|c| c.begin_release_subscription(registration_id))?;
        self.await_registration(correlation_id, self.driver_timeout, |result| match result {
            RegistrationResult::Released => Ok(()),
            RegistrationResult::Error { code, message } => Err(ClientError::Registration { code, message }),
            other => unreachable!("release_subscription resolved to unexpected result: {other:?}"),
        })
    }

    /// Whether the conductor has transitioned to `Closed` (either via
    /// [`Self::close`] or an inter-service timeout).
    pub fn is_closed(&self) -> bool {
        self.shared.with_lock(|c| c.is_closed())
    }

    fn await_registration<T>(
        &self,
        correlation_id: i64,
        timeout: Duration,
        extract: impl Fn(RegistrationResult) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let start = Instant::now();
        loop {
            if let Some(result) = self.shared.with_lock(|c| c.poll_pending(correlation_id)) {
                return extract(result);
            }
            if self.shared.with_lock(|c| c.is_closed()) {
                return Err(ClientError::ClientClosed);
            }

            let elapsed = start.elapsed();
            if elapsed > timeout {
                // One last check before giving up: a response may have
                // resolved this correlation id in the window between the
                // poll above and this timeout decision.
                if let Some(result) = self.shared.with_lock(|c| c.poll_pending(correlation_id)) {
                    return extract(result);
                }
                self.shared.with_lock(|c| c.cancel_pending(correlation_id));
                return Err(ClientError::DriverTimeout { context: "awaiting registration response", elapsed, limit: timeout });
            }

            match &self.harness {
                // Under the invoker, nothing else drains the broadcast
                // buffer; driving one tick here is what makes progress.
                Harness::Invoker(invoker) => {
                    invoker.lock().unwrap().invoke()?;
                }
                Harness::Runner(_) => std::thread::sleep(POLL_QUANTUM),
            }
        }
    }

    /// Stop the harness. Safe to call more than once; also runs on
    /// [`Drop`].
    pub fn close(&self) {
        self.harness.close();
    }
}

impl<L: ClientLock + 'static> Drop for Aeron<L> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnc_descriptor::CNC_VERSION;
    use crate::client_lock::NoOpLock;
    use crate::concurrent::ringbuffer::buffer_descriptor;
    use crate::concurrent::AtomicBuffer;
    use memmap::MmapMut;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn write_cnc_file(dir: &std::path::Path) {
        let to_driver_capacity = 4096usize;
        let to_driver_len = to_driver_capacity + buffer_descriptor::TRAILER_LENGTH as usize;
        let to_client_len = 4096 + crate::concurrent::broadcast::buffer_descriptor::TRAILER_LENGTH as usize;
        let counters_len = 4096usize;
        let total = crate::cnc_descriptor::META_DATA_LENGTH + to_driver_len + to_client_len + counters_len * 2;

        let path = dir.join(crate::cnc_descriptor::CNC_FILE);
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(total as u64).unwrap();
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let mut mmap = unsafe { MmapMut::map_mut(&file).unwrap() };

        mmap.put_i32(4, to_driver_len as i32).unwrap();
        mmap.put_i32(8, to_client_len as i32).unwrap();
        mmap.put_i32(12, counters_len as i32).unwrap();
        mmap.put_i32(16, counters_len as i32).unwrap();

        // A fresh heartbeat, or `Aeron::connect`'s handshake (driven by the
        // real system clock here) treats the CnC file as stale and times out
        // waiting for the driver to "publish" one.
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        let heartbeat_offset = crate::cnc_descriptor::META_DATA_LENGTH
            + to_driver_capacity
            + buffer_descriptor::CONSUMER_HEARTBEAT_OFFSET as usize;
        mmap.put_i64_ordered(heartbeat_offset, now_ms).unwrap();

        mmap.put_i32_ordered(0, CNC_VERSION).unwrap();
    }

    #[test]
    fn connect_with_invoker_harness_starts_and_closes() {
        let dir = tempdir().unwrap();
        write_cnc_file(dir.path());

        let ctx = Context::default()
            .aeron_directory_name(dir.path())
            .driver_timeout_ms(Duration::from_millis(200))
            .use_conductor_agent_invoker(true)
            .with_lock(NoOpLock);

        let client = Aeron::connect(ctx).unwrap();
        assert!(!client.is_closed());

        client.close();
        assert!(client.is_closed());
        // Idempotent.
        client.close();
    }

    #[test]
    fn add_publication_times_out_without_a_driver_response() {
        let dir = tempdir().unwrap();
        write_cnc_file(dir.path());

        let ctx = Context::default()
            .aeron_directory_name(dir.path())
            .driver_timeout_ms(Duration::from_millis(200))
            .publication_connection_timeout(Duration::from_millis(50))
            .use_conductor_agent_invoker(true)
            .with_lock(NoOpLock);

        let client = Aeron::connect(ctx).unwrap();
        let result = client.add_publication("aeron:ipc", 10);
        assert!(matches!(result, Err(ClientError::DriverTimeout { .. })));
    }
}
