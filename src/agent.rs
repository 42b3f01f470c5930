//! Execution harnesses for a duty-cycle [`Agent`]: a dedicated background
//! thread ([`AgentRunner`]) or an embeddable tick-driven harness
//! ([`AgentInvoker`]) the application drives itself.
//!
//! [`crate::client_conductor::ClientConductor`] implements [`Agent`]; which
//! harness wraps it is chosen by
//! [`crate::context::Context::use_conductor_agent_invoker`].

use crate::error::ClientError;
use crate::idle_strategy::IdleStrategy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// One duty-cycle agent. The conductor is the only implementer in this
/// crate, but the contract is generic so the harnesses below don't know
/// anything conductor-specific.
pub trait Agent: Send {
    /// Called once, before the first `do_work`.
    fn on_start(&mut self) {}

    /// Perform one unit of the duty cycle. Returns the number of units of
    /// work actually performed, so the harness can decide whether to
    /// consult its idle strategy.
    fn do_work(&mut self) -> Result<usize, ClientError>;

    /// Called once, exactly once, when the harness is closing.
    fn on_close(&mut self) {}

    /// Name used in diagnostic log records and as the thread name under
    /// [`AgentRunner`].
    fn role_name(&self) -> &str;
}

/// Creates the thread an [`AgentRunner`] runs its agent on. Injectable so
/// an embedding application's own thread-naming, priority, or affinity
/// conventions apply instead of [`std::thread::Builder`]'s defaults.
pub trait ThreadFactory: Send + Sync {
    /// Spawn `f` as a new thread named `name`.
    fn spawn<F>(&self, name: String, f: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static;
}

/// [`ThreadFactory`] backed by [`std::thread::Builder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdThreadFactory;

impl ThreadFactory for StdThreadFactory {
    fn spawn<F>(&self, name: String, f: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        std::thread::Builder::new().name(name).spawn(f)
    }
}

/// [`ThreadFactory`] backed by a type-erased closure, so
/// [`crate::context::Context::thread_factory`] can be configured at
/// runtime without threading a generic thread-factory type parameter
/// through [`crate::client::Aeron`].
#[derive(Clone)]
pub struct BoxedThreadFactory {
    spawn: Arc<dyn Fn(String, Box<dyn FnOnce() + Send>) -> std::io::Result<JoinHandle<()>> + Send + Sync>,
}

impl BoxedThreadFactory {
    pub fn new(
        spawn: impl Fn(String, Box<dyn FnOnce() + Send>) -> std::io::Result<JoinHandle<()>> + Send + Sync + 'static,
    ) -> Self {
        BoxedThreadFactory { spawn: Arc::new(spawn) }
    }
}

impl Default for BoxedThreadFactory {
    fn default() -> Self {
        BoxedThreadFactory::new(|name, f| std::thread::Builder::new().name(name).spawn(f))
    }
}

impl ThreadFactory for BoxedThreadFactory {
    fn spawn<F>(&self, name: String, f: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        (self.spawn)(name, Box::new(f))
    }
}

/// Prints a diagnostic and, for the error kinds [`ClientError::is_fatal`]
/// considers terminal, aborts the process. Matches the spec's stated
/// default; embedding applications are expected to override this when
/// they want different process-exit behavior.
pub fn default_error_handler(error: &ClientError) {
    log::error!("client error: {}", error);
    if error.is_fatal() {
        std::process::exit(-1);
    }
}

/// Runs an [`Agent`] on a dedicated background thread.
pub struct AgentRunner<A, I, T = StdThreadFactory>
where
    A: Agent + 'static,
    I: IdleStrategy + 'static,
    T: ThreadFactory,
{
    agent: Option<A>,
    idle_strategy: Option<I>,
    thread_factory: T,
    role_name: String,
    error_handler: Arc<dyn Fn(&ClientError) + Send + Sync>,
    stop: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<A, I> AgentRunner<A, I, StdThreadFactory>
where
    A: Agent + 'static,
    I: IdleStrategy + 'static,
{
    /// Build a runner with the default thread factory and error handler.
    pub fn new(agent: A, idle_strategy: I) -> Self {
        AgentRunner::with_thread_factory(agent, idle_strategy, StdThreadFactory)
    }
}

impl<A, I, T> AgentRunner<A, I, T>
where
    A: Agent + 'static,
    I: IdleStrategy + 'static,
    T: ThreadFactory,
{
    /// Build a runner with an explicit thread factory and the default
    /// error handler ([`default_error_handler`]).
    pub fn with_thread_factory(agent: A, idle_strategy: I, thread_factory: T) -> Self {
        let role_name = agent.role_name().to_string();
        AgentRunner {
            agent: Some(agent),
            idle_strategy: Some(idle_strategy),
            thread_factory,
            role_name,
            error_handler: Arc::new(default_error_handler),
            stop: Arc::new(AtomicBool::new(false)),
            started: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Override the error handler invoked when `do_work` returns an
    /// error.
    pub fn with_error_handler(mut self, handler: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Spawn the agent's thread. The loop calls `do_work` repeatedly,
    /// consulting the idle strategy whenever a tick reports no work; on
    /// any error it reports to the error handler and, for a
    /// [`ClientError::DriverTimeout`], stops the loop. Does not wait for
    /// the thread to reach `on_start`; poll [`Self::is_started`] if a test
    /// needs that.
    pub fn start(&mut self) {
        let mut agent = self.agent.take().expect("AgentRunner already started");
        let mut idle_strategy = self.idle_strategy.take().expect("AgentRunner already started");
        let stop = Arc::clone(&self.stop);
        let started = Arc::clone(&self.started);
        let error_handler = Arc::clone(&self.error_handler);

        let handle = self
            .thread_factory
            .spawn(self.role_name.clone(), move || {
                agent.on_start();
                started.store(true, Ordering::Release);

                while !stop.load(Ordering::Acquire) {
                    match agent.do_work() {
                        Ok(count) => idle_strategy.idle(count),
                        Err(error) => {
                            let fatal = matches!(error, ClientError::DriverTimeout { .. });
                            error_handler(&error);
                            if fatal {
                                break;
                            }
                        }
                    }
                }

                agent.on_close();
            })
            .expect("failed to spawn agent thread");

        self.handle = Some(handle);
    }

    /// Whether the agent's thread has reached `on_start`.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Signal the loop to stop and join the thread; `on_close` runs on
    /// the agent's own thread before this returns. Safe to call more than
    /// once.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Drives an [`Agent`] one tick at a time, with no background thread.
/// Used when `useConductorAgentInvoker` is set: the embedding application
/// calls [`Self::invoke`] itself, typically from its own event loop.
pub struct AgentInvoker<A>
where
    A: Agent,
{
    agent: A,
    started: bool,
    closed: bool,
}

impl<A> AgentInvoker<A>
where
    A: Agent,
{
    /// Wrap an agent. `on_start` is deferred to the first
    /// [`Self::invoke`] (or an explicit [`Self::start`]).
    pub fn new(agent: A) -> Self {
        AgentInvoker { agent, started: false, closed: false }
    }

    /// Run `on_start`, if it hasn't already run. Idempotent.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.agent.on_start();
        }
    }

    /// Run one `do_work` tick. Starts the agent first if this is the
    /// first call. Fails fast with [`ClientError::ClientClosed`] once
    /// [`Self::close`] has run.
    pub fn invoke(&mut self) -> Result<usize, ClientError> {
        if self.closed {
            return Err(ClientError::ClientClosed);
        }
        self.start();
        self.agent.do_work()
    }

    /// Run `on_close`, if it hasn't already run. Idempotent: a second
    /// call is a no-op.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.agent.on_close();
        }
    }

    /// Whether [`Self::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shared access to the wrapped agent.
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// Exclusive access to the wrapped agent.
    pub fn agent_mut(&mut self) -> &mut A {
        &mut self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idle_strategy::BusySpinIdleStrategy;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingAgent {
        ticks: Arc<AtomicUsize>,
        fail_after: Option<usize>,
    }

    impl Agent for CountingAgent {
        fn do_work(&mut self) -> Result<usize, ClientError> {
            let seen = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_after == Some(seen) {
                return Err(ClientError::DriverTimeout {
                    context: "test",
                    elapsed: Duration::from_millis(1),
                    limit: Duration::from_millis(1),
                });
            }
            Ok(1)
        }

        fn role_name(&self) -> &str {
            "counting-agent"
        }
    }

    #[test]
    fn runner_ticks_until_closed() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let agent = CountingAgent { ticks: Arc::clone(&ticks), fail_after: None };
        let mut runner = AgentRunner::new(agent, BusySpinIdleStrategy);
        runner.start();

        while !runner.is_started() {
            std::thread::yield_now();
        }
        std::thread::sleep(Duration::from_millis(5));
        runner.close();

        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn runner_stops_on_driver_timeout() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let agent = CountingAgent { ticks: Arc::clone(&ticks), fail_after: Some(3) };
        let mut runner = AgentRunner::new(agent, BusySpinIdleStrategy).with_error_handler(|_| {});
        runner.start();
        runner.close();

        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn default_error_handler_logs_non_fatal_errors() {
        let _ = env_logger::builder().is_test(true).try_init();
        default_error_handler(&ClientError::InterServiceTimeout {
            gap: Duration::from_millis(5),
            limit: Duration::from_millis(1),
        });
    }

    #[test]
    fn invoker_starts_on_first_invoke_and_closes_once() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let agent = CountingAgent { ticks: Arc::clone(&ticks), fail_after: None };
        let mut invoker = AgentInvoker::new(agent);

        assert!(!invoker.is_closed());
        invoker.invoke().unwrap();
        invoker.invoke().unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        invoker.close();
        invoker.close();
        assert!(invoker.is_closed());
        assert!(matches!(invoker.invoke(), Err(ClientError::ClientClosed)));
    }

    #[test]
    fn boxed_thread_factory_runs_the_wrapped_spawn_fn() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let factory = BoxedThreadFactory::new(move |name, f| {
            assert_eq!(name, "test-role");
            std::thread::Builder::new().name(name).spawn(f)
        });

        let handle = factory.spawn("test-role".to_string(), move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        handle.unwrap().join().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
