#![forbid(unsafe_code)]

//! Render pipeline errors.
//!
//! Two classes, per the error model: **fatal invariant violations** abort
//! the operation with no retry (hook order/count drift, commit without a
//! lane, re-entrant render, missing host parent), while **component
//! errors** abort only the current pass; the work-in-progress cursor is
//! discarded and the next scheduling pass restarts from the root.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("hook order violation at index {index}: expected {expected}, found {found}")]
    HookOrder {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("hook count violation: component used more hooks than its previous render")]
    HookCountExceeded,

    #[error("hook count violation: component used fewer hooks than its previous render")]
    HookCountShortfall,

    #[error("state type mismatch at hook index {index}")]
    StateType { index: usize },

    #[error("context value type mismatch")]
    ContextType,

    #[error("no host parent found above fiber {fiber}")]
    MissingHostParent { fiber: u32 },

    #[error("commit attempted with no pending lane")]
    CommitWithoutLane,

    #[error("re-entrant render or commit")]
    Reentrant,

    #[error("{0}")]
    Component(String),
}

impl RenderError {
    /// Wrap a component-produced failure. These abort only the current
    /// render pass; everything else in this enum is fatal.
    #[must_use]
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component(message.into())
    }

    /// Whether this error must abort the operation outright rather than
    /// letting the next scheduling pass retry.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Component(_))
    }
}
