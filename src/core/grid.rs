use crate::core::geocoding::GeoCoding;
use crate::core::meridian::{detect_meridian_crossing, unwrap_lon};
use crate::io::mask::ValidityMask;
use crate::io::raster::{Band, RasterSource};
use crate::types::{BoundingBox, GeoError, GeoPos, GeoResult, PixelPos};
use ndarray::Array2;
use std::sync::OnceLock;

/// Dense per-pixel geolocation of a scene.
///
/// Latitude and longitude are stored as two `(height, width)` arrays of equal
/// shape. The meridian-crossing flag is evaluated on first use and cached.
#[derive(Debug)]
pub struct GeoGrid {
    lat: Array2<f32>,
    lon: Array2<f32>,
    crossing: OnceLock<bool>,
}

impl GeoGrid {
    /// Create a grid from latitude and longitude arrays of identical shape
    pub fn new(lat: Array2<f32>, lon: Array2<f32>) -> GeoResult<Self> {
        if lat.dim() != lon.dim() {
            return Err(GeoError::DimensionMismatch(format!(
                "latitude grid is {:?} but longitude grid is {:?}",
                lat.dim(),
                lon.dim()
            )));
        }
        if lat.is_empty() {
            return Err(GeoError::InvalidGrid("geolocation grid has no pixels".to_string()));
        }
        Ok(Self {
            lat,
            lon,
            crossing: OnceLock::new(),
        })
    }

    /// Read both geolocation bands of `source` in full.
    ///
    /// Nothing is returned unless both reads succeed and match the source size.
    pub fn materialize(source: &dyn RasterSource) -> GeoResult<Self> {
        let (width, height) = (source.width(), source.height());
        log::info!("Materializing {}x{} geolocation grid", width, height);

        let lat = source.read_all(Band::Latitude)?;
        let lon = source.read_all(Band::Longitude)?;

        for (band, array) in [(Band::Latitude, &lat), (Band::Longitude, &lon)] {
            if array.dim() != (height, width) {
                return Err(GeoError::DimensionMismatch(format!(
                    "{} band is {:?}, expected ({}, {})",
                    band,
                    array.dim(),
                    height,
                    width
                )));
            }
        }

        Self::new(lat, lon)
    }

    /// Replace the geolocation of every pixel the mask flags invalid with the
    /// estimator's position of the pixel centre.
    ///
    /// The mask must cover exactly the grid's pixels. Without an estimator the
    /// invalid pixels keep their values. Returns the number of pixels
    /// overwritten.
    pub fn fill_gaps(
        &mut self,
        mask: &dyn ValidityMask,
        estimator: Option<&dyn GeoCoding>,
    ) -> GeoResult<usize> {
        let shape_matches = mask.shape().map_or(true, |shape| shape == self.lat.dim());
        if mask.len() != self.lat.len() || !shape_matches {
            return Err(GeoError::DimensionMismatch(format!(
                "validity mask covers {} pixels{}, grid is {:?}",
                mask.len(),
                mask.shape().map(|s| format!(" as {:?}", s)).unwrap_or_default(),
                self.lat.dim()
            )));
        }

        let width = self.width();
        let invalid: Vec<usize> = (0..self.lat.len()).filter(|&i| !mask.is_valid(i)).collect();

        if invalid.is_empty() {
            return Ok(0);
        }

        let estimator = match estimator {
            Some(estimator) => estimator,
            None => {
                log::warn!(
                    "{} invalid geolocation pixels left unfilled, no estimator available",
                    invalid.len()
                );
                return Ok(0);
            }
        };

        let filled = estimate_positions(&invalid, width, estimator)?;
        for (index, geo) in filled {
            let (y, x) = (index / width, index % width);
            self.lat[[y, x]] = geo.lat as f32;
            self.lon[[y, x]] = geo.lon as f32;
        }

        log::info!("Filled {} invalid geolocation pixels from estimator", invalid.len());
        Ok(invalid.len())
    }

    pub fn width(&self) -> usize {
        self.lat.ncols()
    }

    pub fn height(&self) -> usize {
        self.lat.nrows()
    }

    #[inline]
    pub fn lat_at(&self, x: usize, y: usize) -> f64 {
        self.lat[[y, x]] as f64
    }

    #[inline]
    pub fn lon_at(&self, x: usize, y: usize) -> f64 {
        self.lon[[y, x]] as f64
    }

    /// Stored geolocation of cell `(x, y)`
    pub fn geo_at(&self, x: usize, y: usize) -> GeoPos {
        GeoPos::new(self.lat_at(x, y), self.lon_at(x, y))
    }

    /// Integer cell containing `pixel`, if inside the grid
    pub fn cell_of(&self, pixel: &PixelPos) -> Option<(usize, usize)> {
        if !pixel.is_valid() || pixel.x < 0.0 || pixel.y < 0.0 {
            return None;
        }
        let (x, y) = (pixel.x.floor(), pixel.y.floor());
        if x < self.width() as f64 && y < self.height() as f64 {
            Some((x as usize, y as usize))
        } else {
            None
        }
    }

    /// Whether the longitudes wrap across ±180°
    pub fn is_crossing_meridian(&self) -> bool {
        *self.crossing.get_or_init(|| {
            let crossing = detect_meridian_crossing(&self.lon);
            log::debug!("Meridian crossing: {}", crossing);
            crossing
        })
    }

    /// Signed longitude offset `to - from`, taking the short way when crossing
    #[inline]
    pub fn lon_offset(&self, from: f64, to: f64) -> f64 {
        if self.is_crossing_meridian() {
            unwrap_lon(to, from) - from
        } else {
            to - from
        }
    }

    /// Geographic extent of all finite samples.
    ///
    /// For meridian-crossing scenes the box wraps and `min_lon > max_lon`.
    pub fn bounds(&self) -> Option<BoundingBox> {
        let crossing = self.is_crossing_meridian();
        let mut bbox: Option<BoundingBox> = None;

        for (&lat, &lon) in self.lat.iter().zip(self.lon.iter()) {
            if !lat.is_finite() || !lon.is_finite() {
                continue;
            }
            let (lat, mut lon) = (lat as f64, lon as f64);
            if crossing && lon < 0.0 {
                lon += 360.0;
            }
            let b = bbox.get_or_insert(BoundingBox {
                min_lon: lon,
                max_lon: lon,
                min_lat: lat,
                max_lat: lat,
            });
            b.min_lat = b.min_lat.min(lat);
            b.max_lat = b.max_lat.max(lat);
            b.min_lon = b.min_lon.min(lon);
            b.max_lon = b.max_lon.max(lon);
        }

        if crossing {
            if let Some(b) = bbox.as_mut() {
                if b.min_lon > 180.0 {
                    b.min_lon -= 360.0;
                }
                if b.max_lon > 180.0 {
                    b.max_lon -= 360.0;
                }
            }
        }
        bbox
    }

    /// Bilinear interpolation between pixel centres.
    ///
    /// Positions outside the outermost centres are clamped to the border.
    /// Falls back to the containing cell when a neighbour is not finite.
    pub fn interpolate(&self, pixel: &PixelPos) -> Option<GeoPos> {
        let (cx, cy) = self.cell_of(pixel)?;
        let (width, height) = (self.width(), self.height());

        let fx = (pixel.x - 0.5).clamp(0.0, (width - 1) as f64);
        let fy = (pixel.y - 0.5).clamp(0.0, (height - 1) as f64);
        let x0 = (fx.floor() as usize).min(width.saturating_sub(2));
        let y0 = (fy.floor() as usize).min(height.saturating_sub(2));
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let (tx, ty) = (fx - x0 as f64, fy - y0 as f64);

        let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)];
        let weights = [
            (1.0 - tx) * (1.0 - ty),
            tx * (1.0 - ty),
            (1.0 - tx) * ty,
            tx * ty,
        ];

        let lon_ref = self.lon_at(x0, y0);
        let mut lat = 0.0;
        let mut lon = 0.0;
        for (&(x, y), &w) in corners.iter().zip(weights.iter()) {
            let (clat, clon) = (self.lat_at(x, y), self.lon_at(x, y));
            if !clat.is_finite() || !clon.is_finite() || !lon_ref.is_finite() {
                return Some(self.geo_at(cx, cy));
            }
            lat += w * clat;
            lon += w * (lon_ref + self.lon_offset(lon_ref, clon));
        }

        if lon >= 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }
        Some(GeoPos::new(lat, lon))
    }

    /// Sub-pixel position of `geo` near cell `(x, y)`.
    ///
    /// Linearizes the grid around the cell with central differences and solves
    /// for the offset from the cell centre, clamped to half a pixel. Returns the
    /// cell centre when the local Jacobian is degenerate.
    pub fn refine(&self, x: usize, y: usize, geo: &GeoPos) -> PixelPos {
        let center = PixelPos::cell_center(x, y);
        let (lat0, lon0) = (self.lat_at(x, y), self.lon_at(x, y));
        if !lat0.is_finite() || !lon0.is_finite() {
            return center;
        }

        let (lat_x, lon_x) = self.derivative(x, y, true);
        let (lat_y, lon_y) = self.derivative(x, y, false);
        let det = lat_x * lon_y - lat_y * lon_x;
        if !det.is_finite() || det.abs() < 1e-18 {
            return center;
        }

        let dlat = geo.lat - lat0;
        let dlon = self.lon_offset(lon0, geo.lon);
        let dx = (lon_y * dlat - lat_y * dlon) / det;
        let dy = (lat_x * dlon - lon_x * dlat) / det;
        if !dx.is_finite() || !dy.is_finite() {
            return center;
        }

        PixelPos::new(center.x + dx.clamp(-0.5, 0.5), center.y + dy.clamp(-0.5, 0.5))
    }

    /// Per-pixel change of (lat, lon) along x (`along_x`) or y
    fn derivative(&self, x: usize, y: usize, along_x: bool) -> (f64, f64) {
        let (pos, len) = if along_x { (x, self.width()) } else { (y, self.height()) };
        if len < 2 {
            return (0.0, 0.0);
        }
        let lo = pos.saturating_sub(1);
        let hi = (pos + 1).min(len - 1);
        let at = |p: usize| if along_x { (p, y) } else { (x, p) };

        let (xa, ya) = at(lo);
        let (xb, yb) = at(hi);
        let span = (hi - lo) as f64;
        let dlat = (self.lat_at(xb, yb) - self.lat_at(xa, ya)) / span;
        let dlon = self.lon_offset(self.lon_at(xa, ya), self.lon_at(xb, yb)) / span;
        (dlat, dlon)
    }
}

#[cfg(feature = "parallel")]
fn estimate_positions(
    indices: &[usize],
    width: usize,
    estimator: &dyn GeoCoding,
) -> GeoResult<Vec<(usize, GeoPos)>> {
    use rayon::prelude::*;

    indices
        .par_iter()
        .map(|&index| {
            let pixel = PixelPos::cell_center(index % width, index / width);
            estimator.geo_pos(&pixel).map(|geo| (index, geo))
        })
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn estimate_positions(
    indices: &[usize],
    width: usize,
    estimator: &dyn GeoCoding,
) -> GeoResult<Vec<(usize, GeoPos)>> {
    indices
        .iter()
        .map(|&index| {
            let pixel = PixelPos::cell_center(index % width, index / width);
            estimator.geo_pos(&pixel).map(|geo| (index, geo))
        })
        .collect()
}
