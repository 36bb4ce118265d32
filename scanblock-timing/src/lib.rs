pub mod estimator;
pub mod timer;

pub use estimator::TimingEstimator;
pub use timer::{FrameStats, HighPrecisionTimer, Timer};
