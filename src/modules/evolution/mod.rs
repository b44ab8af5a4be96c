pub mod performance;

pub use performance::PerformanceTracker;
