use super::collector::Collector;
use super::raw::RawAlloc;
use super::record::RecordId;
use super::stack::{self, read_word, WORD};
use super::table::AllocTable;
use log::{debug, warn};

/// Marks every record reachable from the ranges it is asked to scan.
///
/// Every byte offset of a scanned range that has a full word behind it is a
/// candidate address, aligned or not. A candidate naming a tracked block marks
/// that block, and the block's interior is then scanned the same way.
pub struct Marker<'t> {
    table: &'t mut AllocTable,
    work: Vec<RecordId>,
    marked: usize,
}

impl<'t> Marker<'t> {
    pub fn new(table: &'t mut AllocTable) -> Self {
        Self {
            table,
            work: vec![],
            marked: 0,
        }
    }

    /// Number of records this marker has newly marked.
    pub fn marked(&self) -> usize {
        self.marked
    }

    /// Marks everything reachable from `[start, end)`.
    ///
    /// # Safety
    ///
    /// The whole range must be readable, as must every tracked block.
    pub unsafe fn mark_range(&mut self, start: usize, end: usize) {
        self.scan(start, end);
        self.trace();
    }

    unsafe fn scan(&mut self, start: usize, end: usize) {
        let mut p = start;

        while end >= WORD && p <= end - WORD {
            self.visit(read_word(p));
            p += 1;
        }
    }

    // Depth first over the blocks found so far. The mark is set before a
    // block is queued, so each block is scanned at most once and cycles end.
    unsafe fn trace(&mut self) {
        while let Some(id) = self.work.pop() {
            let Some(record) = self.table.get(id) else {
                continue;
            };
            let start = record.address();
            let end = start + record.size();

            self.scan(start, end);
        }
    }

    fn visit(&mut self, candidate: usize) {
        let Some(id) = self.table.find(candidate) else {
            return;
        };

        if let Some(record) = self.table.get_mut(id) {
            if !record.is_marked() {
                record.set_mark();
                self.marked += 1;
                self.work.push(id);
            }
        }
    }
}

impl<A: RawAlloc> Collector<A> {
    /// Marks every block reachable from the current stack, including values
    /// only held in callee saved registers.
    #[inline(never)]
    pub(crate) fn mark_stack(&mut self) -> usize {
        debug!("start mark phase, {} tracked blocks", self.table.len());

        let stack_base = self.stack_base;
        let table = &mut self.table;
        let marked = stack::with_spilled_registers(|top| {
            let mut marker = Marker::new(table);

            if top < stack_base {
                unsafe { marker.mark_range(top, stack_base) };
            } else {
                warn!(
                    "stack top {:#x} is not below the stack base {:#x}, no stack roots scanned",
                    top, stack_base
                );
            }

            marker.marked()
        });

        self.marked = true;
        debug!("marked {} blocks from the stack", marked);
        marked
    }

    /// Marks every block reachable from `len` bytes at `start`, such as a
    /// global root array. Marks accumulate until the next sweep.
    ///
    /// # Safety
    ///
    /// `[start, start + len)` must be readable.
    pub unsafe fn mark_region(&mut self, start: *const u8, len: usize) -> usize {
        let start = start as usize;
        let mut marker = Marker::new(&mut self.table);

        marker.mark_range(start, start.saturating_add(len));
        self.marked = true;

        let marked = marker.marked();

        debug!("marked {} blocks from region {:#x}+{}", marked, start, len);
        marked
    }
}
