/// This structure contains the configuration settings for a collector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GcConfig {
    /// The number of buckets the tracking table starts with. Rounded up to a
    /// power of two, and never less than [`GC_CONFIG_MIN_CAPACITY`].
    pub initial_capacity: usize,

    /// Once the number of tracked blocks surpasses `capacity * sweep_factor`
    /// the next allocation will run a full collection before proceeding.
    /// Clamped to `GC_CONFIG_MIN_FACTOR..=1.0`.
    pub sweep_factor: f32,

    /// If after a sweep the number of tracked blocks is still above
    /// `capacity * load_factor` the tracking table doubles in size.
    /// Clamped like `sweep_factor`.
    pub load_factor: f32,
}

pub const GC_CONFIG_DEFAULT_INITIAL_CAPACITY: usize = 1024;
pub const GC_CONFIG_DEFAULT_SWEEP_FACTOR: f32 = 0.75;
pub const GC_CONFIG_DEFAULT_LOAD_FACTOR: f32 = 0.75;
pub const GC_CONFIG_MIN_CAPACITY: usize = 8;
pub const GC_CONFIG_MIN_FACTOR: f32 = 0.125;

// All the heuristic constants used by the collector are collected here.
// Changing them trades collection frequency against table memory, nothing
// else depends on their exact values.
impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            initial_capacity: GC_CONFIG_DEFAULT_INITIAL_CAPACITY,
            sweep_factor: GC_CONFIG_DEFAULT_SWEEP_FACTOR,
            load_factor: GC_CONFIG_DEFAULT_LOAD_FACTOR,
        }
    }
}

impl GcConfig {
    /// The bucket count the tracking table is actually created with.
    pub fn table_capacity(&self) -> usize {
        self.initial_capacity
            .max(GC_CONFIG_MIN_CAPACITY)
            .checked_next_power_of_two()
            .unwrap_or(GC_CONFIG_DEFAULT_INITIAL_CAPACITY)
    }

    pub(crate) fn sweep_threshold(&self, capacity: usize) -> usize {
        scale(capacity, self.sweep_factor)
    }

    pub(crate) fn resize_threshold(&self, capacity: usize) -> usize {
        scale(capacity, self.load_factor)
    }
}

// Thresholds must grow with capacity, so factors are floored at
// GC_CONFIG_MIN_FACTOR.
fn scale(capacity: usize, factor: f32) -> usize {
    let factor = if factor.is_nan() {
        GC_CONFIG_MIN_FACTOR
    } else {
        factor.clamp(GC_CONFIG_MIN_FACTOR, 1.0)
    };

    (capacity as f64 * factor as f64) as usize
}
