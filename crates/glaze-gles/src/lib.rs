//! `glaze-gles` is the translation/runtime backend that executes a fixed
//! GLES-2.0-era graphics API on top of an explicit, command-buffer-oriented
//! native GPU interface.
//!
//! The front end (out of scope here) validates call arguments, owns handle
//! allocation, and forwards semantically checked requests through the
//! [`GlesBackend`] operation table. This crate owns everything below that
//! boundary: GPU memory regions, frame/fence scheduling, resource uploads,
//! fixed-function state translation, draw assembly, shader/program binding,
//! and pixel readback.
//!
//! There is exactly one native target; [`GlesRuntime`] is its implementation.

mod config;
mod error;
mod handle;
mod ops;
mod runtime;
mod types;

pub use config::{MemoryConfig, RuntimeConfig, TableConfig};
pub use error::RuntimeError;
pub use handle::{Handle, HandleTable, NONE_HANDLE};
pub use ops::GlesBackend;
pub use runtime::{GlesRuntime, SlotState};
pub use types::*;
