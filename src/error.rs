//! Top-level error taxonomy for the client bootstrap and lifecycle protocol.
//!
//! [`AeronError`](crate::util::AeronError) covers bounds/layout failures
//! inside the concurrent primitives; [`ClientError`] covers the
//! protocol-level failure kinds a caller of this crate actually needs to
//! branch on.
use crate::util::AeronError;
use std::time::Duration;

/// Error kind surfaced by the client bootstrap/lifecycle protocol.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A bounded wait on some driver-observable condition (CnC file
    /// appearing, version publishing, heartbeat appearing or refreshing)
    /// exceeded the configured driver timeout. Fatal in the default error
    /// handler.
    #[error("driver timeout after {elapsed:?} (limit {limit:?}): {context}")]
    DriverTimeout {
        /// What we were waiting for when the timeout fired
        context: &'static str,
        /// How long we had actually waited
        elapsed: Duration,
        /// The configured driver timeout
        limit: Duration,
    },

    /// The CnC file's version field did not match the version this client
    /// was built against. Fatal; the client never retries a version
    /// mismatch.
    #[error("unsupported CnC version: observed {observed}, expected {expected}")]
    UnsupportedCncVersion {
        /// Version actually read from the CnC file
        observed: i32,
        /// Version this client was compiled against
        expected: i32,
    },

    /// An operation was attempted after the conductor transitioned to
    /// `Closed`.
    #[error("client is closed")]
    ClientClosed,

    /// The driver rejected a registration request (add publication/
    /// subscription/counter) with an explicit error code and message.
    /// Surfaced only to the caller that issued the request.
    #[error("registration failed (driver error {code}): {message}")]
    Registration {
        /// Driver-reported error code
        code: i32,
        /// Driver-reported human readable message
        message: String,
    },

    /// The conductor's own duty cycle was starved for longer than
    /// `interServiceTimeout`. Reported via the error handler; all
    /// outstanding publications/subscriptions are closed as a side effect.
    #[error("inter-service timeout: {gap:?} since last doWork (limit {limit:?})")]
    InterServiceTimeout {
        /// Observed gap between successive `doWork` invocations
        gap: Duration,
        /// Configured inter-service timeout
        limit: Duration,
    },

    /// A transient failure writing to the command ring (full, or claim
    /// failed). Recovered locally by retrying on the next conductor tick;
    /// never surfaced to the error handler.
    #[error("transport backpressure: {0}")]
    Transport(#[from] AeronError),
}

impl ClientError {
    /// True for error kinds the default error handler treats as fatal
    /// (prints a diagnostic and terminates the process).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::DriverTimeout { .. } | ClientError::UnsupportedCncVersion { .. }
        )
    }
}
