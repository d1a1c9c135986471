//! The master's consolidated error type.
//!
//! Each kind carries a fixed propagation policy that the rest of the crate honors (surfaced from
//! `tick`, aggregated per-domain, retried per-slave with back-off, or returned synchronously to
//! the caller — see the call sites in `cyclic`, `acyclic` and `slave::lifecycle`).

use fieldring_wire::WireError;

/// Top-level error type returned by fallible master operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The network interface is not available (unplugged, driver not loaded, etc).
    #[error("link down")]
    LinkDown,

    /// No response was received within the allotted budget.
    #[error("timed out waiting for a response")]
    Timeout,

    /// A received frame's index doesn't match what was dispatched; the ring topology likely
    /// changed underneath the master.
    #[error("topology changed: expected index {expected}, got {got}")]
    TopologyChanged {
        /// Index the dispatcher expected to see.
        expected: u8,
        /// Index actually observed.
        got: u8,
    },

    /// Fewer slaves processed a sub-command than expected.
    #[error("working counter short: expected {expected}, got {got}")]
    WorkingCounterShort {
        /// Working counter increment required for every addressed slave to have responded.
        expected: u16,
        /// Working counter increment actually observed.
        got: u16,
    },

    /// A received frame was structurally invalid.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A slave refused a requested lifecycle transition or parameter-object configuration.
    #[error("configuration rejected by slave")]
    ConfigurationRejected,

    /// A slave lacks a feature the master needed to use (e.g. mailbox CoE).
    #[error("slave is missing required capability: {0}")]
    CapabilityMissing(&'static str),

    /// Caller-supplied argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The frame pool or another bounded resource is exhausted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// Error packing or unpacking a wire type.
    #[error("wire codec error: {0}")]
    Wire(#[from] WireError),

    /// Error loading the device-description directory or a master config file.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Error from the TCP/UDP mailbox gateway.
    #[error("gateway error: {0}")]
    Gateway(#[from] crate::gateway::GatewayError),
}

impl Error {
    /// True for the kinds that must surface from `tick` itself rather than being aggregated into
    /// a per-domain or per-slave status.
    pub fn surfaces_from_tick(&self) -> bool {
        matches!(
            self,
            Error::LinkDown | Error::ResourceExhausted(_) | Error::InvalidArgument(_)
        )
    }
}
