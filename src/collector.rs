use super::config::GcConfig;
use super::error::GcError;
use super::metrics::GcMetrics;
use super::raw::{RawAlloc, SystemAlloc};
use super::record::{round_up, AllocRecord};
use super::stack;
use super::table::AllocTable;

use log::{debug, warn};
use std::marker::PhantomData;
use std::ptr::NonNull;

/// A conservative mark and sweep collector over blocks from a [`RawAlloc`].
///
/// Every block handed out is tracked by address. A collection treats every
/// word between the current stack top and the stack base captured at
/// construction as a possible pointer, marks the blocks those words name
/// (and, transitively, the blocks named by words inside them), then returns
/// every unmarked block to the underlying allocator.
///
/// A collector only scans the stack of the thread that created it, and is
/// therefore neither `Send` nor `Sync`.
pub struct Collector<A: RawAlloc = SystemAlloc> {
    pub(crate) stack_base: usize,
    pub(crate) table: AllocTable,
    pub(crate) sweep_threshold: usize,
    pub(crate) collected_total: u64,
    pub(crate) collections: u64,
    pub(crate) live_bytes: usize,
    // set by a mark phase, consumed by the sweep that follows it
    pub(crate) marked: bool,
    pub(crate) config: GcConfig,
    pub(crate) raw: A,
    _not_send: PhantomData<*mut ()>,
}

impl Collector<SystemAlloc> {
    /// Creates a collector over the C heap whose roots are the current
    /// thread's stack.
    #[inline(always)]
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    #[inline(always)]
    pub fn with_config(config: GcConfig) -> Self {
        Self::with_allocator(SystemAlloc, config)
    }
}

impl Default for Collector<SystemAlloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAlloc> Collector<A> {
    #[inline(always)]
    pub fn with_allocator(raw: A, config: GcConfig) -> Self {
        Self::with_stack_base(stack::current_stack_base(), raw, config)
    }

    /// Creates a collector that scans from the stack top up to, but not
    /// including, `stack_base`. The frame holding `stack_base` must enclose
    /// every later call into this collector.
    pub fn with_stack_base(stack_base: usize, raw: A, config: GcConfig) -> Self {
        let capacity = config.table_capacity();

        debug!(
            "collector init, stack base {:#x}, {} buckets",
            stack_base, capacity
        );

        Self {
            stack_base,
            table: AllocTable::with_capacity(capacity),
            sweep_threshold: config.sweep_threshold(capacity),
            collected_total: 0,
            collections: 0,
            live_bytes: 0,
            marked: false,
            config,
            raw,
            _not_send: PhantomData,
        }
    }

    /// Allocates `size` bytes, rounded up to a multiple of 8. Runs a
    /// collection first if the live count is above the sweep threshold.
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, GcError> {
        if size == 0 {
            return Err(GcError::ZeroSize);
        }

        let rounded = round_up(size).ok_or(GcError::SizeOverflow)?;

        self.collect_if_needed();

        let ptr = NonNull::new(unsafe { self.raw.alloc(rounded) }).ok_or(GcError::OutOfMemory)?;

        self.track(ptr, rounded);
        Ok(ptr)
    }

    /// Allocates `count` zeroed elements of `size` bytes each. Each element is
    /// rounded up to a multiple of 8; a total that overflows is refused with
    /// [`GcError::SizeOverflow`].
    pub fn alloc_zeroed(&mut self, count: usize, size: usize) -> Result<NonNull<u8>, GcError> {
        if count == 0 || size == 0 {
            return Err(GcError::ZeroSize);
        }

        let total = round_up(size)
            .and_then(|rounded| rounded.checked_mul(count))
            .ok_or(GcError::SizeOverflow)?;

        self.collect_if_needed();

        let ptr =
            NonNull::new(unsafe { self.raw.alloc_zeroed(total) }).ok_or(GcError::OutOfMemory)?;

        self.track(ptr, total);
        Ok(ptr)
    }

    /// Resizes the block at `ptr`, which may move. A null `ptr` behaves like
    /// [`Collector::alloc`].
    ///
    /// A zero `size` is refused with [`GcError::ZeroSize`] and leaves the
    /// original block allocated and tracked; it is reclaimed by a later
    /// collection once unreachable. On any other error the original block is
    /// untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must be null, tracked by this collector, or a live block from the
    /// same underlying allocator.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> Result<NonNull<u8>, GcError> {
        if ptr.is_null() {
            return self.alloc(size);
        }

        if size == 0 {
            warn!("zero sized realloc of {:p}, the block stays allocated", ptr);
            return Err(GcError::ZeroSize);
        }

        let rounded = round_up(size).ok_or(GcError::SizeOverflow)?;

        self.collect_if_needed();

        let existing = self.table.find(ptr as usize);

        if existing.is_none() {
            warn!("reallocating unknown pointer {:p}, tracking the result", ptr);
        }

        let new_ptr = NonNull::new(self.raw.realloc(ptr, rounded)).ok_or(GcError::OutOfMemory)?;

        if let Some(id) = existing {
            let record = self.table.remove(id);

            self.live_bytes -= record.size();
        }

        self.track(new_ptr, rounded);
        Ok(new_ptr)
    }

    /// Releases a block now. Tracked blocks are reclaimed exactly as a sweep
    /// would. Unknown pointers are logged and handed to the underlying
    /// allocator anyway.
    ///
    /// # Safety
    ///
    /// `ptr` must be null, tracked by this collector, or a live block from the
    /// same underlying allocator, and must not be used afterwards.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        match self.table.find(ptr as usize) {
            Some(id) => self.reclaim(id),
            None => {
                warn!("freeing unknown pointer {:p}", ptr);
                self.raw.free(ptr);
            }
        }
    }

    /// Runs a full mark and sweep over the current stack. Returns the number
    /// of blocks reclaimed.
    #[inline(never)]
    pub fn collect(&mut self) -> usize {
        self.mark_stack();
        self.sweep()
    }

    pub fn need_collect(&self) -> bool {
        self.table.len() > self.sweep_threshold
    }

    pub fn need_resize(&self) -> bool {
        self.table.len() > self.config.resize_threshold(self.table.capacity())
    }

    /// Total number of blocks reclaimed over this collector's lifetime.
    pub fn collected_total(&self) -> u64 {
        self.collected_total
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub fn live_count(&self) -> usize {
        self.table.len()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn sweep_threshold(&self) -> usize {
        self.sweep_threshold
    }

    pub fn stack_base(&self) -> usize {
        self.stack_base
    }

    pub fn config(&self) -> GcConfig {
        self.config
    }

    /// Whether `ptr` is the start of a tracked block.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.table.find(ptr as usize).is_some()
    }

    /// The rounded size of the tracked block starting at `ptr`.
    pub fn block_size(&self, ptr: *const u8) -> Option<usize> {
        let id = self.table.find(ptr as usize)?;

        self.table.get(id).map(AllocRecord::size)
    }

    pub fn metrics(&self) -> GcMetrics {
        GcMetrics {
            collections: self.collections,
            collected_total: self.collected_total,
            live_count: self.table.len(),
            live_bytes: self.live_bytes,
            capacity: self.table.capacity(),
            sweep_threshold: self.sweep_threshold,
        }
    }

    fn collect_if_needed(&mut self) {
        if self.need_collect() {
            self.collect();
        }
    }

    fn track(&mut self, ptr: NonNull<u8>, size: usize) {
        let address = ptr.as_ptr() as usize;

        debug_assert!(
            self.table.find(address).is_none(),
            "allocator returned tracked block {:#x}",
            address
        );

        self.table.insert(AllocRecord::new(address, size));
        self.live_bytes += size;
    }
}

impl<A: RawAlloc> Drop for Collector<A> {
    fn drop(&mut self) {
        let addresses: Vec<usize> = self.table.records().map(AllocRecord::address).collect();

        debug!("collector teardown, releasing {} blocks", addresses.len());

        for address in addresses {
            unsafe { self.raw.free(address as *mut u8) };
        }
    }
}
