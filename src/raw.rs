/// The system heap the collector hands out and reclaims blocks from.
///
/// Implementations follow C allocator semantics: `free` does not need the
/// block size, `free(null)` does nothing, and `realloc` may move the block.
///
/// # Safety
///
/// `alloc`, `alloc_zeroed` and `realloc` must return either null or a block
/// of at least the requested size, aligned to 8, that stays valid until it is
/// passed to `realloc` or `free` of the same allocator.
pub unsafe trait RawAlloc {
    unsafe fn alloc(&self, size: usize) -> *mut u8;
    unsafe fn alloc_zeroed(&self, size: usize) -> *mut u8;
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8;
    unsafe fn free(&self, ptr: *mut u8);
}

/// The C heap, via `malloc` and friends.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemAlloc;

unsafe impl RawAlloc for SystemAlloc {
    unsafe fn alloc(&self, size: usize) -> *mut u8 {
        libc::malloc(size).cast()
    }

    unsafe fn alloc_zeroed(&self, size: usize) -> *mut u8 {
        libc::calloc(1, size).cast()
    }

    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        libc::realloc(ptr.cast(), size).cast()
    }

    unsafe fn free(&self, ptr: *mut u8) {
        libc::free(ptr.cast())
    }
}

unsafe impl<T: RawAlloc + ?Sized> RawAlloc for &T {
    unsafe fn alloc(&self, size: usize) -> *mut u8 {
        (**self).alloc(size)
    }

    unsafe fn alloc_zeroed(&self, size: usize) -> *mut u8 {
        (**self).alloc_zeroed(size)
    }

    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        (**self).realloc(ptr, size)
    }

    unsafe fn free(&self, ptr: *mut u8) {
        (**self).free(ptr)
    }
}
