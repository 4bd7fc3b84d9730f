use super::collector::Collector;
use super::error::fatal;
use super::raw::RawAlloc;
use super::record::RecordId;
use log::debug;

impl<A: RawAlloc> Collector<A> {
    /// Reclaims every block left unmarked by the preceding mark phase and
    /// clears the marks of the survivors. Returns the number of blocks
    /// reclaimed.
    ///
    /// A sweep only acts on the marks of a mark phase that ran since the last
    /// sweep, so sweeping twice in a row reclaims nothing the second time.
    pub fn sweep(&mut self) -> usize {
        if !std::mem::take(&mut self.marked) {
            debug!("no mark phase since the last sweep, skipping");
            return 0;
        }

        self.collections += 1;

        if self.table.is_empty() {
            return 0;
        }

        let mut reclaimed = 0;

        for bucket in 0..self.table.capacity() {
            let mut cursor = self.table.head(bucket);

            while let Some(id) = cursor {
                let Some(record) = self.table.get_mut(id) else {
                    fatal(format_args!("bucket {} chains vacant slot {:?}", bucket, id));
                };

                cursor = record.next;

                if record.is_marked() {
                    record.clear_mark();
                } else {
                    self.reclaim(id);
                    reclaimed += 1;
                }
            }
        }

        debug!(
            "sweep reclaimed {} blocks, {} still tracked",
            reclaimed,
            self.table.len()
        );

        self.grow_if_needed();

        reclaimed
    }

    /// Unlinks a record and returns its block to the underlying allocator.
    pub(crate) fn reclaim(&mut self, id: RecordId) {
        let record = self.table.remove(id);

        unsafe { self.raw.free(record.address() as *mut u8) };

        self.live_bytes -= record.size();
        self.collected_total += 1;
    }

    // Growth only ever doubles, and at most once per sweep.
    fn grow_if_needed(&mut self) {
        if !(self.need_collect() || self.need_resize()) {
            return;
        }

        let Some(new_capacity) = self.table.capacity().checked_mul(2) else {
            return;
        };

        self.table.resize(new_capacity);
        self.sweep_threshold = self.config.sweep_threshold(new_capacity);

        debug!(
            "tracking table grown to {} buckets, sweep threshold {}",
            new_capacity, self.sweep_threshold
        );
    }
}
