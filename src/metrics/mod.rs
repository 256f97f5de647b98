/// Per-kernel timing and behavior metrics.
///
/// The aggregator keeps, per view, a bounded FIFO window of raw samples and
/// an exponentially-weighted aggregate, and can mirror every emitted sample
/// to a CSV sink. Kernels emit from the invocation path; the scheduler reads
/// windowed aggregates on frame boundaries.
pub mod aggregator;

pub use aggregator::{FrameAgg, MetricsHub, Sample};
