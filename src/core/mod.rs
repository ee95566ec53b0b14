//! Core geocoding modules

pub mod geocoding;
pub mod grid;
pub mod meridian;
pub mod distance;
pub mod quad_tree;
pub mod local_window;
pub mod pixel_geocoding;

// Re-export main types
pub use geocoding::{GeoCoding, AffineGeoCoding};
pub use grid::GeoGrid;
pub use meridian::{detect_meridian_crossing, lon_diff};
pub use distance::weighted_sq_distance;
pub use quad_tree::{QuadTreeSearch, Located, Nearest};
pub use local_window::LocalWindowSearch;
pub use pixel_geocoding::PixelGeoCoding;
