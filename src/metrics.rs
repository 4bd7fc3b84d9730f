/// A 'snapshot' of the metrics relevant to the collector's internal triggers.
///
/// Obtained by calling [`crate::Collector::metrics`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GcMetrics {
    /// Number of completed mark and sweep cycles.
    pub collections: u64,

    /// Running total of blocks that have been reclaimed, by a sweep or by an
    /// explicit free.
    pub collected_total: u64,

    /// Number of blocks currently tracked.
    pub live_count: usize,

    /// Bytes held by the tracked blocks, after rounding.
    pub live_bytes: usize,

    /// Number of buckets in the tracking table.
    pub capacity: usize,

    /// Once the live count surpasses this number, the next allocation will
    /// trigger a collection.
    pub sweep_threshold: usize,
}
