use thiserror::Error;

/// Reasons an allocation request produced no block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum GcError {
    #[error("zero sized allocation request")]
    ZeroSize,
    #[error("allocation size overflows usize")]
    SizeOverflow,
    #[error("underlying allocator is out of memory")]
    OutOfMemory,
    #[error("collector has not been initialized on this thread")]
    Uninitialized,
    #[error("collector is already initialized on this thread")]
    AlreadyInitialized,
}

/// Reports an internal consistency violation and aborts the process. Only
/// reachable if the tracking table has been corrupted.
#[cold]
pub(crate) fn fatal(args: std::fmt::Arguments<'_>) -> ! {
    log::error!("{}", args);
    std::process::abort()
}
