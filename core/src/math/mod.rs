pub mod geodesy;
pub mod matrix;
pub mod stats;

pub use geodesy::{ArcInterpolator, GeoPosition};
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
