use serde::{Deserialize, Serialize};

/// Default half-width of the local search window, in pixels
pub const DEFAULT_SEARCH_RADIUS: usize = 5;

/// Default margin added to quad-tree bounding boxes, in degrees
pub const DEFAULT_BBOX_EPSILON: f64 = 0.04;

/// Degrees to radians
pub const D2R: f64 = std::f64::consts::PI / 180.0;

/// Position in image space (column, row).
///
/// The centre of cell `(i, j)` lies at `(i + 0.5, j + 0.5)`. A position is
/// invalid when either coordinate is not finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: f64,
    pub y: f64,
}

impl PixelPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The invalid sentinel
    pub fn invalid() -> Self {
        Self { x: f64::NAN, y: f64::NAN }
    }

    /// Centre of the integer cell `(x, y)`
    pub fn cell_center(x: usize, y: usize) -> Self {
        Self::new(x as f64 + 0.5, y as f64 + 0.5)
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Geographic position in degrees. Invalid when either coordinate is not finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// The invalid sentinel
    pub fn invalid() -> Self {
        Self { lat: f64::NAN, lon: f64::NAN }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl std::fmt::Display for PixelPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.3}, {:.3}]", self.x, self.y)
    }
}

impl std::fmt::Display for GeoPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.lat, self.lon)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl From<[f64; 6]> for GeoTransform {
    fn from(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// Tunables of the pixel geocoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingParams {
    /// Half-width of the estimator-guided search window (pixels, > 0)
    pub search_radius: usize,
    /// Margin added to every quad-tree node bounding box (degrees)
    pub bbox_epsilon: f64,
    /// Refine results below pixel resolution
    pub fractional_accuracy: bool,
}

impl Default for GeocodingParams {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_SEARCH_RADIUS,
            bbox_epsilon: DEFAULT_BBOX_EPSILON,
            fractional_accuracy: false,
        }
    }
}

impl GeocodingParams {
    pub fn validate(&self) -> GeoResult<()> {
        if self.search_radius == 0 {
            return Err(GeoError::InvalidParameter(
                "search radius must be at least one pixel".to_string(),
            ));
        }
        if !self.bbox_epsilon.is_finite() || self.bbox_epsilon < 0.0 {
            return Err(GeoError::InvalidParameter(format!(
                "bounding box epsilon must be finite and non-negative, got {}",
                self.bbox_epsilon
            )));
        }
        Ok(())
    }
}

/// Error types for pixel geocoding
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Pixel geocoding has been disposed")]
    Disposed,

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for geocoding operations
pub type GeoResult<T> = Result<T, GeoError>;
