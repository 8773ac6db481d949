#![forbid(unsafe_code)]

//! Incremental, priority-aware recomputation of a tree-shaped UI
//! description.
//!
//! Given the previously committed tree and a new declarative description,
//! the reconciler computes the minimal set of structural changes, applies
//! them atomically through a host backend, and lets the computation itself
//! be paused, resumed, or preempted by higher-priority work without
//! corrupting the visible tree.
//!
//! # Architecture
//!
//! - [`lanes`]: update urgency as a bitmask; pure functions, no state.
//! - [`fiber`]: the persistent node arena and its paired
//!   work-in-progress allocation (double buffering).
//! - [`update_queue`] / [`hooks`]: per-cell pending state transitions
//!   with priority skip/preserve, and per-component hook/effect lists.
//! - `child_reconciler`: the keyed single-pass diff producing the next
//!   child list.
//! - `work_loop`: the interruptible begin/complete traversal.
//! - [`root`]: scheduling decisions and the two-phase commit
//!   (synchronous mutation, asynchronous passive-effect flush).
//!
//! The host (instance creation and mutation) and the cooperative priority
//! scheduler are consumed as collaborators through the `weft-host` and
//! `weft-sched` traits; this crate never owns a thread or an event loop.

pub mod element;
pub mod error;
pub mod fiber;
pub mod flags;
pub mod hooks;
pub mod lanes;
pub mod root;
pub mod update_queue;

mod begin_work;
mod child_reconciler;
mod commit;
mod complete_work;
mod work_loop;

pub use element::{ComponentFn, Context, ContextId, ContextValue, Element, ElementKind, Node, Props};
pub use error::{RenderError, Result};
pub use flags::{EffectTag, FiberFlags};
pub use hooks::{Dispatch, EffectCleanup, EffectCreate, HookCx, HookDep, TransitionStarter};
pub use lanes::Lanes;
pub use root::WeftRoot;
