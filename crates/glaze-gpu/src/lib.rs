//! `glaze-gpu` contains the GPU-side utilities shared by the glaze runtime.
//!
//! Currently this crate provides:
//! - Monotonic bump arenas and descriptor slot budgets for the fixed memory
//!   regions (see [`BumpArena`] and [`SlotBudget`]).
//! - Copy-layout math for staged texture uploads (see [`layout`]).
//! - CPU-side row reconciliation: aligned repacking, vertical flips, channel
//!   expansion and index widening (see [`rows`]).
//! - A snapshot of the device limits relevant for sub-allocation (see
//!   [`DeviceCaps`]).

mod arena;
mod caps;

pub mod layout;
pub mod rows;

pub use arena::{align_up, BumpArena, SlotBudget};
pub use caps::DeviceCaps;
