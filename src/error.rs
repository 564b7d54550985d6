//! Crate error type.
//!
//! Every error here is a caller bug, not a runtime condition: the fallible
//! `try_*` APIs return these so callers can surface them their own way, while
//! the unprefixed convenience methods panic at the call site. Resource
//! transience (a host surface losing its contents) is recovered internally
//! and never reaches this type.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Attempted to attach a view that already has a parent.
    #[error("the view already has a parent")]
    AlreadyParented,

    /// Attempted to install a view as root while it is parented or already
    /// part of a context.
    #[error("the view already belongs to a view hierarchy")]
    AlreadyInContext,

    /// Attempted to detach a view that has no parent.
    #[error("the view does not have a parent")]
    NoParent,

    /// A child index outside `0..=len`.
    #[error("invalid view index {index} (len {len})")]
    InvalidIndex { index: usize, len: usize },

    /// A stale or foreign [`crate::view::ViewId`].
    #[error("unknown view id")]
    UnknownView,

    /// The supplied affine transform has no inverse.
    #[error("transform is not invertible")]
    NonInvertibleTransform,

    /// `commit` on an animation that is already running.
    #[error("animation is already committed")]
    AnimationRunning,

    /// An event key name registered twice.
    #[error("duplicate event key: {0}")]
    DuplicateEventKey(String),
}
