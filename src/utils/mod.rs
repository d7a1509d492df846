pub mod image_ops;
pub mod metrics;
pub mod natural_order;

// Re-export commonly used items
pub use image_ops::{crop_to_bbox, gray_to_mat, mat_to_gray, mat_to_rgb, rgb_to_mat};
pub use metrics::{Metrics, MetricsSnapshot, Stage};
pub use natural_order::{natural_cmp, natural_path_cmp};
