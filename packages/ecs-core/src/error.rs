//! ECS error types.

use thiserror::Error;

/// Entity-component-store operation errors.
#[derive(Error, Debug, Clone)]
pub enum EcsError {
    /// A reservation, commit, or decommit was asked to touch zero or
    /// negative bytes, or a null pointer where one is forbidden.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Component type was never registered.
    #[error("component type '{0}' is not registered")]
    NotRegistered(String),

    /// A managed component registration violated its contract (e.g. a
    /// mutable reference type without the transient marker).
    #[error("misconfiguration for component '{type_id}': {guidance}")]
    MisconfigurationError { type_id: String, guidance: String },

    /// Entity handle refers to a destroyed or stale generation.
    #[error("entity {index}#{generation} is not alive")]
    DeadEntity { index: u32, generation: u16 },

    /// Entity is alive but lacks the requested component.
    #[error("entity {index}#{generation} has no component '{type_id}'")]
    NoSuchComponent {
        index: u32,
        generation: u16,
        type_id: String,
    },

    /// Access denied by the current phase/authority configuration.
    #[error(
        "phase violation: {access} access to '{type_id}' denied in phase '{phase}' (authority={authority})"
    )]
    PhaseViolation {
        access: &'static str,
        type_id: String,
        phase: String,
        authority: bool,
    },

    /// `set_phase` attempted a transition not present in `valid_transitions`.
    #[error("cannot transition from phase '{from}' to '{to}'")]
    WrongPhaseTransition { from: String, to: String },

    /// Frame header or section failed to parse (magic mismatch, truncated
    /// payload, checksum mismatch). Returned, never thrown, from
    /// `read_next_frame` per the flight recorder's failure policy.
    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    /// Virtual address space exhausted. Fatal.
    #[error("out of address space: {0}")]
    OutOfAddressSpace(String),

    /// Underlying OS call failed.
    #[error("platform error: {0}")]
    PlatformError(String),

    /// Capacity arithmetic would overflow.
    #[error("capacity overflow during {operation}")]
    CapacityOverflow { operation: &'static str },

    /// I/O error during recording or replay.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Transient I/O error that may succeed on retry.
    #[error("transient I/O error: {0}")]
    TransientIoError(String),
}

pub type EcsResult<T> = Result<T, EcsError>;
