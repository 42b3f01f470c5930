//! Fluent configuration record for [`crate::client::Aeron::connect`].
//!
//! Every field has a documented default; [`Context::conclude`] is the
//! explicit finalize step that fills in whatever the caller left unset,
//! runs the CnC handshake, and makes the record immutable in spirit (a
//! second `conclude` is a no-op rather than a re-handshake).

use crate::clock::{EpochClock, NanoClock, SystemEpochClock, SystemNanoClock};
use crate::client_lock::{ClientLock, ReentrantClientLock};
use crate::cnc_connector::CncConnector;
use crate::cnc_descriptor::MetaDataDefinition;
use crate::concurrent::AtomicBuffer;
use crate::error::ClientError;
use crate::idle_strategy::{IdleStrategy, SleepingIdleStrategy};
use crate::agent::BoxedThreadFactory;
use crate::ipc_bindings::IpcBindings;
use crate::registration::Image;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DRIVER_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RESOURCE_LINGER_MS: u64 = 5_000;
const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 500;
const DEFAULT_PUBLICATION_CONNECTION_TIMEOUT_MS: u64 = 5_000;

/// Whether image log buffers are mapped read-only or read-write. Carried
/// through as configuration; this crate never itself maps an image's log
/// file (that's the data-plane collaborator's job), so the setting has no
/// effect inside this crate beyond being available to that collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMapMode {
    ReadOnly,
    ReadWrite,
}

impl Default for ImageMapMode {
    fn default() -> Self {
        ImageMapMode::ReadOnly
    }
}

/// Configuration for [`crate::client::Aeron::connect`]. Generic over the
/// client-wide lock so callers can swap in [`crate::client_lock::NoOpLock`]
/// without paying for a trait object; [`ReentrantClientLock`] is the
/// default.
pub struct Context<L: ClientLock = ReentrantClientLock> {
    pub(crate) aeron_dir: PathBuf,
    pub(crate) driver_timeout: Duration,
    pub(crate) resource_linger_timeout: Duration,
    pub(crate) use_conductor_agent_invoker: bool,
    pub(crate) pre_touch_mapped_memory: bool,
    pub(crate) image_map_mode: ImageMapMode,
    pub(crate) client_lock: L,
    pub(crate) epoch_clock: Box<dyn EpochClock>,
    pub(crate) nano_clock: Box<dyn NanoClock>,
    pub(crate) idle_strategy: Box<dyn IdleStrategy>,
    pub(crate) keep_alive_interval: Duration,
    pub(crate) inter_service_timeout: Option<Duration>,
    pub(crate) publication_connection_timeout: Duration,
    pub(crate) thread_factory: BoxedThreadFactory,
    pub(crate) error_handler: Arc<dyn Fn(&ClientError) + Send + Sync>,
    pub(crate) available_image_handler: Option<Arc<dyn Fn(&Image) + Send + Sync>>,
    pub(crate) unavailable_image_handler: Option<Arc<dyn Fn(&Image) + Send + Sync>>,
    pub(crate) bindings: Option<IpcBindings>,
    pub(crate) concluded: bool,
}

impl Context<ReentrantClientLock> {
    /// User running the current process, used to namespace
    /// [`Context::default_aeron_path`]. Falls back to `"default"` when
    /// neither `USER` nor `USERNAME` is set.
    pub fn get_user_name() -> String {
        env::var("USER").or_else(|_| env::var("USERNAME")).unwrap_or_else(|_| "default".to_string())
    }

    /// Default CnC directory: `/dev/shm/aeron-<user>` on Linux (matching
    /// the driver's own default), `$TMPDIR/aeron-<user>` elsewhere.
    pub fn default_aeron_path() -> PathBuf {
        let base_path =
            if cfg!(target_os = "linux") { PathBuf::from("/dev/shm") } else { env::temp_dir() };
        base_path.join(format!("aeron-{}", Context::get_user_name()))
    }
}

// `Default` is implemented only for the concrete `ReentrantClientLock`
// instantiation, not generically over `L: ClientLock + Default` — a generic
// impl would make a bare `Context::default()` call ambiguous whenever more
// than one `ClientLock + Default` type is in scope (e.g. `NoOpLock`), since
// a struct's default type parameter isn't used as an inference fallback.
// Callers wanting a different lock start from this and call `with_lock`.
impl Default for Context<ReentrantClientLock> {
    fn default() -> Self {
        Context {
            aeron_dir: Context::default_aeron_path(),
            driver_timeout: Duration::from_millis(DEFAULT_DRIVER_TIMEOUT_MS),
            resource_linger_timeout: Duration::from_millis(DEFAULT_RESOURCE_LINGER_MS),
            use_conductor_agent_invoker: false,
            pre_touch_mapped_memory: false,
            image_map_mode: ImageMapMode::default(),
            client_lock: ReentrantClientLock::default(),
            epoch_clock: Box::new(SystemEpochClock),
            nano_clock: Box::new(SystemNanoClock),
            idle_strategy: Box::new(SleepingIdleStrategy::default()),
            keep_alive_interval: Duration::from_millis(DEFAULT_KEEP_ALIVE_INTERVAL_MS),
            inter_service_timeout: None,
            publication_connection_timeout: Duration::from_millis(DEFAULT_PUBLICATION_CONNECTION_TIMEOUT_MS),
            thread_factory: BoxedThreadFactory::default(),
            error_handler: Arc::new(crate::agent::default_error_handler),
            available_image_handler: None,
            unavailable_image_handler: None,
            bindings: None,
            concluded: false,
        }
    }
}

impl<L: ClientLock> Context<L> {
    /// Directory containing the driver's `cnc.dat` file.
    pub fn aeron_directory_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.aeron_dir = path.into();
        self
    }

    pub fn aeron_dir(&self) -> &std::path::Path {
        &self.aeron_dir
    }

    /// Bound on how long the CnC handshake waits for the driver to publish
    /// a compatible CnC file. Vendor-defined default of 10 seconds.
    pub fn driver_timeout_ms(mut self, timeout: Duration) -> Self {
        self.driver_timeout = timeout;
        self
    }

    pub fn driver_timeout(&self) -> Duration {
        self.driver_timeout
    }

    /// How long a released publication/subscription's resources linger
    /// before the data-plane collaborator reclaims them. Stored for that
    /// collaborator; this crate's own release path is immediate.
    pub fn resource_linger_timeout_ms(mut self, timeout: Duration) -> Self {
        self.resource_linger_timeout = timeout;
        self
    }

    pub fn resource_linger_timeout(&self) -> Duration {
        self.resource_linger_timeout
    }

    /// Run the conductor on an [`crate::agent::AgentInvoker`] the
    /// embedding application ticks itself, instead of a dedicated
    /// [`crate::agent::AgentRunner`] thread.
    pub fn use_conductor_agent_invoker(mut self, value: bool) -> Self {
        self.use_conductor_agent_invoker = value;
        self
    }

    pub fn is_conductor_agent_invoker(&self) -> bool {
        self.use_conductor_agent_invoker
    }

    pub fn pre_touch_mapped_memory(mut self, value: bool) -> Self {
        self.pre_touch_mapped_memory = value;
        self
    }

    pub fn is_pre_touch_mapped_memory(&self) -> bool {
        self.pre_touch_mapped_memory
    }

    pub fn image_map_mode(mut self, mode: ImageMapMode) -> Self {
        self.image_map_mode = mode;
        self
    }

    pub fn get_image_map_mode(&self) -> ImageMapMode {
        self.image_map_mode
    }

    pub fn epoch_clock(mut self, clock: impl EpochClock + 'static) -> Self {
        self.epoch_clock = Box::new(clock);
        self
    }

    pub fn nano_clock(mut self, clock: impl NanoClock + 'static) -> Self {
        self.nano_clock = Box::new(clock);
        self
    }

    pub fn idle_strategy(mut self, strategy: impl IdleStrategy + 'static) -> Self {
        self.idle_strategy = Box::new(strategy);
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn keep_alive_interval_value(&self) -> Duration {
        self.keep_alive_interval
    }

    /// Override the inter-service timeout instead of deriving it from the
    /// CnC metadata's `client-liveness-timeout` field. An explicit value
    /// set here always wins over the metadata-derived one, regardless of
    /// call order relative to [`Context::conclude`].
    pub fn inter_service_timeout(mut self, timeout: Duration) -> Self {
        self.inter_service_timeout = Some(timeout);
        self
    }

    pub fn publication_connection_timeout(mut self, timeout: Duration) -> Self {
        self.publication_connection_timeout = timeout;
        self
    }

    pub fn publication_connection_timeout_value(&self) -> Duration {
        self.publication_connection_timeout
    }

    pub fn thread_factory(mut self, factory: BoxedThreadFactory) -> Self {
        self.thread_factory = factory;
        self
    }

    pub fn error_handler(mut self, handler: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn available_image_handler(mut self, handler: impl Fn(&Image) + Send + Sync + 'static) -> Self {
        self.available_image_handler = Some(Arc::new(handler));
        self
    }

    pub fn unavailable_image_handler(mut self, handler: impl Fn(&Image) + Send + Sync + 'static) -> Self {
        self.unavailable_image_handler = Some(Arc::new(handler));
        self
    }

    /// Replace the client-wide lock, changing which [`ClientLock`]
    /// implementation this context (and the facade built from it) uses.
    pub fn with_lock<L2: ClientLock>(self, lock: L2) -> Context<L2> {
        Context {
            aeron_dir: self.aeron_dir,
            driver_timeout: self.driver_timeout,
            resource_linger_timeout: self.resource_linger_timeout,
            use_conductor_agent_invoker: self.use_conductor_agent_invoker,
            pre_touch_mapped_memory: self.pre_touch_mapped_memory,
            image_map_mode: self.image_map_mode,
            client_lock: lock,
            epoch_clock: self.epoch_clock,
            nano_clock: self.nano_clock,
            idle_strategy: self.idle_strategy,
            keep_alive_interval: self.keep_alive_interval,
            inter_service_timeout: self.inter_service_timeout,
            publication_connection_timeout: self.publication_connection_timeout,
            thread_factory: self.thread_factory,
            error_handler: self.error_handler,
            available_image_handler: self.available_image_handler,
            unavailable_image_handler: self.unavailable_image_handler,
            bindings: self.bindings,
            concluded: self.concluded,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded
    }

    /// Fill defaults, perform the CnC handshake, and resolve the final
    /// inter-service timeout. Idempotent: a second call is a no-op.
    pub fn conclude(&mut self) -> Result<(), ClientError> {
        if self.concluded {
            return Ok(());
        }

        let connector = CncConnector::new(self.aeron_dir.clone(), self.driver_timeout);
        let (mmap, offsets) = connector.connect(self.epoch_clock.as_ref())?;

        let client_liveness_timeout_ns =
            mmap.overlay::<MetaDataDefinition>(0).map(|metadata| metadata.client_liveness_timeout_ns()).unwrap_or(0);

        let bindings = IpcBindings::new(mmap, &offsets, client_liveness_timeout_ns, self.inter_service_timeout)?;

        self.bindings = Some(bindings);
        self.concluded = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_lock::NoOpLock;

    #[test]
    fn default_context_uses_reentrant_lock_and_stock_defaults() {
        let ctx = Context::default();
        assert!(!ctx.is_concluded());
        assert!(!ctx.is_conductor_agent_invoker());
        assert_eq!(ctx.driver_timeout(), Duration::from_millis(DEFAULT_DRIVER_TIMEOUT_MS));
        assert_eq!(ctx.get_image_map_mode(), ImageMapMode::ReadOnly);
    }

    #[test]
    fn with_lock_swaps_the_lock_type_and_preserves_other_fields() {
        let ctx = Context::default().aeron_directory_name("/tmp/aeron-test").with_lock(NoOpLock);
        assert_eq!(ctx.aeron_dir(), std::path::Path::new("/tmp/aeron-test"));
    }

    #[test]
    fn explicit_inter_service_timeout_is_remembered_before_conclude() {
        let ctx = Context::default().inter_service_timeout(Duration::from_millis(250));
        assert_eq!(ctx.inter_service_timeout, Some(Duration::from_millis(250)));
    }
}
