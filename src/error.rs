//! Error types shared across the runtime.

use thiserror::Error;

/// Errors produced by lifecycle operations on a [`ComponentHost`](crate::lifecycle::ComponentHost).
///
/// Precondition violations are fatal to the calling operation and are
/// reported before any part of the live tree is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// `mount` was called while a previous `mount` is still in flight.
    #[error("mount is already in progress")]
    AlreadyMounting,
    /// `mount` was called on a host that has already completed mounting.
    #[error("component is already mounted")]
    AlreadyMounted,
    /// A mounted-only operation was called before `mount` completed.
    #[error("component is not mounted")]
    NotMounted,
    /// The host has been unmounted; the state machine is terminal.
    #[error("component has been unmounted")]
    Unmounted,
    /// The container did not hold exactly one non-auxiliary root.
    #[error("container must hold exactly one root element, found {0}")]
    RootCount(usize),
    /// A lifecycle operation was re-entered while another one was running.
    #[error("lifecycle operation re-entered while another is still running")]
    Reentrant,
}

/// Errors produced by the style provider collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    /// The stylesheet text could not be fetched from its source.
    #[error("failed to fetch stylesheet `{reference}`: {message}")]
    Fetch {
        /// The reference that was being resolved.
        reference: String,
        /// Source-specific description of the failure.
        message: String,
    },
}
