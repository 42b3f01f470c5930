//! Client-side bootstrap and lifecycle manager for the Aeron media-driver
//! protocol.
//!
//! This crate covers exactly the handshake with a running media driver over
//! its memory-mapped command-and-control (CnC) file, the cooperative
//! single-threaded conductor that runs the client half of the wire
//! protocol, and the harnesses that drive it. The on-the-wire formats of
//! publications, subscriptions, and images, and the driver itself, are
//! external collaborators this crate does not implement.
//!
//! The entry point is [`client::Aeron::connect`], configured through a
//! [`context::Context`].

pub mod agent;
pub mod client;
pub mod client_conductor;
pub mod client_lock;
pub mod clock;
pub mod cnc_connector;
pub mod cnc_descriptor;
pub mod command;
pub mod concurrent;
pub mod context;
pub mod control_protocol;
pub mod driver_proxy;
pub mod error;
pub mod idle_strategy;
pub mod ipc_bindings;
pub mod registration;
pub mod util;

pub use client::Aeron;
pub use cnc_descriptor::CNC_VERSION;
pub use context::Context;
pub use error::ClientError;
pub use registration::{ExclusivePublication, Publication, Subscription};
pub use util::AeronError;

/// Packs a major/minor/patch triple into the `i32` layout Aeron's CnC file
/// version field and wire protocol version fields use.
pub(crate) const fn semantic_version_compose(major: u8, minor: u8, patch: u8) -> i32 {
    (major as i32) << 16 | (minor as i32) << 8 | (patch as i32)
}

#[cfg(test)]
mod tests {
    use super::semantic_version_compose;

    #[test]
    fn version_compose_matches_cnc_version() {
        assert_eq!(semantic_version_compose(0, 0, 16), 16);
    }
}
