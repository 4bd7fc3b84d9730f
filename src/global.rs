//! A default collector per thread, for callers that want plain allocation
//! functions instead of carrying a [`Collector`] around.
//!
//! [`init`] must run before anything else on the thread, from a frame that
//! encloses every later call. Calling back into this module while one of its
//! functions is running (for instance from a logger) is refused with a panic
//! rather than corrupting the tracking table.

use super::collector::Collector;
use super::config::GcConfig;
use super::error::GcError;
use super::metrics::GcMetrics;

use std::cell::RefCell;
use std::ptr::NonNull;

thread_local! {
    static COLLECTOR: RefCell<Option<Collector>> = const { RefCell::new(None) };
}

pub fn init() -> Result<(), GcError> {
    init_with_config(GcConfig::default())
}

pub fn init_with_config(config: GcConfig) -> Result<(), GcError> {
    COLLECTOR.with(|cell| {
        let mut slot = cell.borrow_mut();

        if slot.is_some() {
            return Err(GcError::AlreadyInitialized);
        }

        *slot = Some(Collector::with_config(config));
        Ok(())
    })
}

pub fn is_initialized() -> bool {
    COLLECTOR.with(|cell| cell.borrow().is_some())
}

/// Drops this thread's collector, releasing every block it still tracks.
/// Returns whether there was one.
pub fn shutdown() -> bool {
    let collector = COLLECTOR.with(|cell| cell.borrow_mut().take());

    collector.is_some()
}

pub fn alloc(size: usize) -> Result<NonNull<u8>, GcError> {
    with_collector(|gc| gc.alloc(size))?
}

pub fn alloc_zeroed(count: usize, size: usize) -> Result<NonNull<u8>, GcError> {
    with_collector(|gc| gc.alloc_zeroed(count, size))?
}

/// # Safety
///
/// Same contract as [`Collector::realloc`].
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> Result<NonNull<u8>, GcError> {
    with_collector(|gc| gc.realloc(ptr, size))?
}

/// # Safety
///
/// Same contract as [`Collector::free`].
pub unsafe fn free(ptr: *mut u8) -> Result<(), GcError> {
    with_collector(|gc| gc.free(ptr))
}

pub fn collect() -> Result<usize, GcError> {
    with_collector(|gc| gc.collect())
}

pub fn collected_total() -> Result<u64, GcError> {
    with_collector(|gc| gc.collected_total())
}

pub fn metrics() -> Result<GcMetrics, GcError> {
    with_collector(|gc| gc.metrics())
}

fn with_collector<R>(f: impl FnOnce(&mut Collector) -> R) -> Result<R, GcError> {
    COLLECTOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        let collector = slot.as_mut().ok_or(GcError::Uninitialized)?;

        Ok(f(collector))
    })
}
