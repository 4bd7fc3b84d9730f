//! A conservative mark and sweep collector for untyped heap blocks.
//!
//! Blocks are requested from a [`Collector`] instead of the system allocator.
//! Nothing about their contents is known, so when the collector runs it
//! treats every word on the current stack, at every byte offset, as a
//! possible pointer. A block named by such a word is live, and so is every
//! block named by a word inside a live block. Everything else is returned to
//! the system allocator.
//!
//! ```rust
//! use sweepstack::Collector;
//!
//! let mut gc = Collector::new();
//! let block = gc.alloc(16).unwrap();
//!
//! assert!(gc.contains(block.as_ptr()));
//! assert_eq!(gc.block_size(block.as_ptr()), Some(16));
//!
//! unsafe { gc.free(block.as_ptr()) };
//!
//! assert_eq!(gc.live_count(), 0);
//! assert_eq!(gc.collected_total(), 1);
//! ```
//!
//! Collections run on their own once the number of tracked blocks passes a
//! threshold derived from the tracking table's capacity, and can be forced
//! with [`Collector::collect`]. Memory that is only reachable through
//! something other than the stack (a global, another thread, a disguised
//! pointer) is invisible to the collector unless it is scanned explicitly
//! with [`Collector::mark_region`].
//!
//! ```rust
//! use sweepstack::{Collector, GcConfig};
//!
//! let mut gc = Collector::with_config(GcConfig {
//!     initial_capacity: 64,
//!     ..GcConfig::default()
//! });
//! let roots = vec![gc.alloc_zeroed(1, 32).unwrap().as_ptr() as usize];
//! let _garbage = gc.alloc(32).unwrap();
//!
//! unsafe { gc.mark_region(roots.as_ptr().cast(), std::mem::size_of_val(&roots[..])) };
//! gc.sweep();
//!
//! assert_eq!(gc.live_count(), 1);
//! assert!(gc.contains(roots[0] as *const u8));
//! ```
//!
//! A default collector per thread is available through [`global`].

mod collector;
mod config;
mod error;
mod mark;
mod metrics;
mod raw;
mod record;
mod sweep;
mod table;

pub mod global;
pub mod stack;

pub use collector::Collector;
pub use config::{
    GcConfig, GC_CONFIG_DEFAULT_INITIAL_CAPACITY, GC_CONFIG_DEFAULT_LOAD_FACTOR,
    GC_CONFIG_DEFAULT_SWEEP_FACTOR, GC_CONFIG_MIN_CAPACITY, GC_CONFIG_MIN_FACTOR,
};
pub use error::GcError;
pub use metrics::GcMetrics;
pub use raw::{RawAlloc, SystemAlloc};
pub use record::ALLOC_ALIGN;

#[cfg(test)]
mod test;
