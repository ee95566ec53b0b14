use crate::types::{GeoPos, GeoResult, GeoTransform, PixelPos};

/// Conversion between image and geographic coordinates of one scene.
///
/// Conversions that cannot be answered return the NaN sentinel
/// (`PixelPos::invalid()`, `GeoPos::invalid()`) rather than an error; errors
/// are reserved for failures of the geocoding itself (I/O, disposal).
pub trait GeoCoding: Send + Sync {
    /// Inverse conversion: geographic position to pixel position
    fn pixel_pos(&self, geo: &GeoPos) -> GeoResult<PixelPos>;

    /// Forward conversion: pixel position to geographic position
    fn geo_pos(&self, pixel: &PixelPos) -> GeoResult<GeoPos>;

    /// Whether the scene's longitudes wrap across ±180°
    fn is_crossing_meridian(&self) -> GeoResult<bool>;
}

/// Analytic affine geocoding from a GDAL geotransform.
///
/// `lon = top_left_x + x * pixel_width + y * rotation_x`
/// `lat = top_left_y + x * rotation_y + y * pixel_height`
#[derive(Debug, Clone)]
pub struct AffineGeoCoding {
    transform: GeoTransform,
    determinant: f64,
}

impl AffineGeoCoding {
    pub fn new(transform: GeoTransform) -> Self {
        let determinant = transform.pixel_width * transform.pixel_height
            - transform.rotation_x * transform.rotation_y;
        Self { transform, determinant }
    }

    fn is_invertible(&self) -> bool {
        self.determinant.is_finite() && self.determinant.abs() > f64::EPSILON
    }
}

impl GeoCoding for AffineGeoCoding {
    fn pixel_pos(&self, geo: &GeoPos) -> GeoResult<PixelPos> {
        if !geo.is_valid() || !self.is_invertible() {
            return Ok(PixelPos::invalid());
        }
        let t = &self.transform;
        let dlon = geo.lon - t.top_left_x;
        let dlat = geo.lat - t.top_left_y;

        let x = (t.pixel_height * dlon - t.rotation_x * dlat) / self.determinant;
        let y = (t.pixel_width * dlat - t.rotation_y * dlon) / self.determinant;
        Ok(PixelPos::new(x, y))
    }

    fn geo_pos(&self, pixel: &PixelPos) -> GeoResult<GeoPos> {
        if !pixel.is_valid() {
            return Ok(GeoPos::invalid());
        }
        let t = &self.transform;
        let lon = t.top_left_x + pixel.x * t.pixel_width + pixel.y * t.rotation_x;
        let lat = t.top_left_y + pixel.x * t.rotation_y + pixel.y * t.pixel_height;
        Ok(GeoPos::new(lat, lon))
    }

    fn is_crossing_meridian(&self) -> GeoResult<bool> {
        Ok(false)
    }
}
