//! # Vox VM Garbage Collector
//!
//! Object heap and semispace copying collector.
//!
//! ## Design
//!
//! - **Object model**: every heap value is a variant of one closed enum that
//!   reports its own tag and byte size
//! - **Allocation**: bump allocation into from-space; a full from-space
//!   triggers a collection and one retry
//! - **Collection**: stop-the-world Cheney copy of everything reachable from
//!   the caller's roots into to-space, leaving forwarding markers behind,
//!   then the spaces swap
//! - **References**: `(index, epoch)` handles; a handle from before the last
//!   collection is rejected as stale
//!
//! Every allocating call is a safepoint. Callers pass their roots with each
//! allocation and re-read references from those roots afterwards.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub(crate) mod allocator;
pub mod collector;
pub mod error;
pub mod heap;
pub mod object;
pub mod table;
pub mod value;

pub use collector::{GcStats, RootProvider};
pub use error::{HeapError, Result};
pub use heap::{Heap, HeapConfig};
pub use object::ObjTag;
pub use value::{ObjRef, Value};
