//! Message type identifiers exchanged with the media driver over the
//! command ring buffer (client to driver) and broadcast buffer (driver to
//! client). These values are part of the wire protocol and must match the
//! driver's own definitions exactly; they are not derived from any local
//! enum numbering scheme.

/// Message type identifiers a client writes to the to-driver command ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ClientCommand {
    /// Add a concurrent publication.
    AddPublication = 0x01,
    /// Remove a previously added publication.
    RemovePublication = 0x02,
    /// Add an exclusive (single producer) publication.
    AddExclusivePublication = 0x03,
    /// Add a subscription.
    AddSubscription = 0x04,
    /// Remove a previously added subscription.
    RemoveSubscription = 0x05,
    /// Heartbeat from a client to the driver proving liveness.
    ClientKeepalive = 0x06,
    /// Add a destination to a multi-destination publication.
    AddDestination = 0x07,
    /// Remove a destination from a multi-destination publication.
    RemoveDestination = 0x08,
    /// Add a user-defined counter.
    AddCounter = 0x09,
    /// Remove a previously added counter.
    RemoveCounter = 0x0A,
    /// Notify the driver a client is closing cleanly.
    ClientClose = 0x0B,
    /// Add a receive destination to a multi-destination subscription.
    AddRcvDestination = 0x0C,
    /// Remove a receive destination from a multi-destination subscription.
    RemoveRcvDestination = 0x0D,
    /// Request the driver terminate itself.
    TerminateDriver = 0x0E,
}

impl ClientCommand {
    /// Recover a command kind from its raw wire value, if recognized.
    pub fn from_i32(value: i32) -> Option<Self> {
        use ClientCommand::*;
        Some(match value {
            0x01 => AddPublication,
            0x02 => RemovePublication,
            0x03 => AddExclusivePublication,
            0x04 => AddSubscription,
            0x05 => RemoveSubscription,
            0x06 => ClientKeepalive,
            0x07 => AddDestination,
            0x08 => RemoveDestination,
            0x09 => AddCounter,
            0x0A => RemoveCounter,
            0x0B => ClientClose,
            0x0C => AddRcvDestination,
            0x0D => RemoveRcvDestination,
            0x0E => TerminateDriver,
            _ => return None,
        })
    }
}

/// Message type identifiers the driver broadcasts to clients in response
/// to requests, or as asynchronous notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DriverResponse {
    /// A registration request failed.
    OnError = 0x0F01,
    /// An image became available to a subscription.
    OnAvailableImage = 0x0F02,
    /// A concurrent publication finished registering.
    OnPublicationReady = 0x0F03,
    /// A registration request that has no payload of its own succeeded
    /// (e.g. remove operations).
    OnOperationSuccess = 0x0F04,
    /// An image backing a subscription became unavailable.
    OnUnavailableImage = 0x0F05,
    /// An exclusive publication finished registering.
    OnExclusivePublicationReady = 0x0F06,
    /// A subscription finished registering.
    OnSubscriptionReady = 0x0F07,
    /// A counter finished registering.
    OnCounterReady = 0x0F08,
    /// A previously ready counter became unavailable.
    OnUnavailableCounter = 0x0F09,
    /// The driver has not heard from this client in too long and is about
    /// to consider it dead.
    OnClientTimeout = 0x0F0A,
}

impl DriverResponse {
    /// Recover a response kind from its raw wire value, if recognized.
    pub fn from_i32(value: i32) -> Option<Self> {
        use DriverResponse::*;
        Some(match value {
            0x0F01 => OnError,
            0x0F02 => OnAvailableImage,
            0x0F03 => OnPublicationReady,
            0x0F04 => OnOperationSuccess,
            0x0F05 => OnUnavailableImage,
            0x0F06 => OnExclusivePublicationReady,
            0x0F07 => OnSubscriptionReady,
            0x0F08 => OnCounterReady,
            0x0F09 => OnUnavailableCounter,
            0x0F0A => OnClientTimeout,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_command_round_trips() {
        assert_eq!(
            ClientCommand::from_i32(ClientCommand::AddPublication as i32),
            Some(ClientCommand::AddPublication)
        );
        assert_eq!(ClientCommand::from_i32(0x99), None);
    }

    #[test]
    fn driver_response_round_trips() {
        assert_eq!(
            DriverResponse::from_i32(DriverResponse::OnOperationSuccess as i32),
            Some(DriverResponse::OnOperationSuccess)
        );
        assert_eq!(DriverResponse::from_i32(0), None);
    }
}
