//! Handles returned by registration operations, and the bookkeeping the
//! conductor uses to resolve them once the driver responds.
//!
//! The handles here carry only the identity fields bootstrap produces
//! (registration id, channel, stream id, session id); the data-plane
//! behavior behind a registration id (term log layout, frame encoding) is
//! an opaque collaborator concern this crate never touches.

use std::time::Instant;

/// A concurrent (many-producer) publication registered with the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    registration_id: i64,
    channel: String,
    stream_id: i32,
    session_id: i32,
}

impl Publication {
    pub(crate) fn new(registration_id: i64, channel: String, stream_id: i32, session_id: i32) -> Self {
        Publication { registration_id, channel, stream_id, session_id }
    }

    /// Identity this publication was registered under; equals the
    /// correlation id of the `AddPublication` request that created it.
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Channel URI this publication was registered on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stream id this publication was registered on.
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Session id the driver assigned this publication.
    pub fn session_id(&self) -> i32 {
        self.session_id
    }
}

/// A single-producer, exclusive publication registered with the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusivePublication {
    registration_id: i64,
    channel: String,
    stream_id: i32,
    session_id: i32,
}

impl ExclusivePublication {
    pub(crate) fn new(registration_id: i64, channel: String, stream_id: i32, session_id: i32) -> Self {
        ExclusivePublication { registration_id, channel, stream_id, session_id }
    }

    /// Identity this publication was registered under.
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Channel URI this publication was registered on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stream id this publication was registered on.
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Session id the driver assigned this publication.
    pub fn session_id(&self) -> i32 {
        self.session_id
    }
}

/// A subscription registered with the driver. Gains and loses [`Image`]s
/// over its lifetime as publishers come and go; those arrive via the
/// available/unavailable image callbacks, not through this handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    registration_id: i64,
    channel: String,
    stream_id: i32,
}

impl Subscription {
    pub(crate) fn new(registration_id: i64, channel: String, stream_id: i32) -> Self {
        Subscription { registration_id, channel, stream_id }
    }

    /// Identity this subscription was registered under.
    pub fn registration_id(&self) -> i64 {
        self.registration_id
    }

    /// Channel URI this subscription was registered on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stream id this subscription was registered on.
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }
}

/// An image backing one publisher's contribution to a subscription.
/// Handed to `availableImageHandler`/`unavailableImageHandler`; becomes
/// invalid the moment the unavailable callback fires for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    correlation_id: i64,
    subscription_registration_id: i64,
    stream_id: i32,
    session_id: i32,
    source_identity: String,
}

impl Image {
    pub(crate) fn new(
        correlation_id: i64,
        subscription_registration_id: i64,
        stream_id: i32,
        session_id: i32,
        source_identity: String,
    ) -> Self {
        Image { correlation_id, subscription_registration_id, stream_id, session_id, source_identity }
    }

    /// Correlation id of the `AddSubscription` request this image belongs
    /// to.
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    /// Registration id of the subscription this image belongs to.
    pub fn subscription_registration_id(&self) -> i64 {
        self.subscription_registration_id
    }

    /// Stream id this image is publishing on.
    pub fn stream_id(&self) -> i32 {
        self.stream_id
    }

    /// Session id of the publisher backing this image.
    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Human-readable identity (e.g. address) of the image's source.
    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }
}

/// Outcome of a pending request, once the driver (or the conductor itself,
/// on timeout) resolves it.
#[derive(Debug, Clone)]
pub enum RegistrationResult {
    /// A publication finished registering.
    Publication(Publication),
    /// An exclusive publication finished registering.
    ExclusivePublication(ExclusivePublication),
    /// A subscription finished registering.
    Subscription(Subscription),
    /// A publication or subscription was released.
    Released,
    /// The driver rejected the request.
    Error { code: i32, message: String },
}

/// What kind of request a [`PendingRequest`] is waiting on a response for;
/// needed because the three success kinds all arrive as the same
/// `OnOperationSuccess`-shaped wire record and the conductor otherwise has
/// no way to tell them apart.
#[derive(Debug, Clone)]
pub(crate) enum PendingKind {
    AddPublication { channel: String, stream_id: i32 },
    AddExclusivePublication { channel: String, stream_id: i32 },
    AddSubscription { channel: String, stream_id: i32 },
    Release,
}

/// Tracks one in-flight request/response round trip between an application
/// thread and the driver, keyed by correlation id.
pub(crate) struct PendingRequest {
    pub(crate) kind: PendingKind,
    pub(crate) submitted_at: Instant,
    pub(crate) result: Option<RegistrationResult>,
}

impl PendingRequest {
    pub(crate) fn new(kind: PendingKind, submitted_at: Instant) -> Self {
        PendingRequest { kind, submitted_at, result: None }
    }
}
