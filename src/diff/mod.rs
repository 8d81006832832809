pub mod summary;
pub mod tracker;

pub use summary::{DiffStats, calculate_diff_stats, format_diff_summary};
pub use tracker::{DiffTracker, FileChange};
