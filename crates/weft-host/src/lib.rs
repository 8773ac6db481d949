#![forbid(unsafe_code)]

//! Host-renderer seam for the weft reconciler.
//!
//! The reconciler decides *what* must change; a [`HostBackend`] applies
//! those changes to real instances (DOM nodes, terminal cells, native
//! views). This crate defines the trait plus [`MemoryHost`], an in-memory
//! implementation that records every mutation so tests can assert the exact
//! operation set a commit produced.

pub mod backend;
pub mod memory;
pub mod props;

pub use backend::{HostBackend, InstanceId, Microtask};
pub use memory::{HostOp, MemoryHost, run_microtasks};
pub use props::{PropMap, PropValue};
