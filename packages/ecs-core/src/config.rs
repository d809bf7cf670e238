//! ECS configuration.

/// Tuning knobs for the entity index, chunk allocator, and recorder.
#[derive(Debug, Clone)]
pub struct EcsConfig {
    /// Bytes per chunk for every component column.
    pub chunk_size_bytes: usize,
    /// Bytes reserved (not committed) up front per component type.
    pub initial_reservation_bytes: usize,
    /// Width of `component_mask` / `authority_mask`; bounds registrable types.
    pub max_component_types: usize,
    /// Bounded queue depth between capture and the recorder's writer thread.
    pub recorder_queue_depth: usize,
    /// Whether `capture_keyframe`/`capture_frame` block by default until the
    /// writer thread has flushed the frame.
    pub recorder_blocking_default: bool,
    /// Extra precondition assertions (chunk-version monotonicity, doubled
    /// bounds checks) too expensive to always run.
    pub paranoid_mode: bool,
    /// Maximum retry attempts for transient recorder I/O errors.
    pub recorder_max_retries: u32,
    /// Delay between recorder retry attempts in milliseconds.
    pub recorder_retry_delay_ms: u64,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: 65536,
            initial_reservation_bytes: 1 << 30,
            max_component_types: 256,
            recorder_queue_depth: 16,
            recorder_blocking_default: false,
            paranoid_mode: false,
            recorder_max_retries: 3,
            recorder_retry_delay_ms: 100,
        }
    }
}
