use crate::core::distance::{lon_weight, weighted_sq_distance};
use crate::core::geocoding::GeoCoding;
use crate::core::grid::GeoGrid;
use crate::core::quad_tree::{Located, QuadTreeSearch};
use crate::types::{GeoPos, GeoResult, PixelPos};

/// Estimator-guided nearest-pixel search.
///
/// The estimator's pixel position seeds a `(2 * radius + 1)`-wide window that
/// is scanned exhaustively. The longitude weight is taken once from the
/// window centre. The result is the nearest pixel within the window, not
/// necessarily in the whole image.
pub struct LocalWindowSearch<'a> {
    grid: &'a GeoGrid,
    estimator: &'a dyn GeoCoding,
    radius: usize,
    epsilon: f64,
}

impl<'a> LocalWindowSearch<'a> {
    /// `epsilon` is handed to the quad-tree search when the estimator fails
    pub fn new(
        grid: &'a GeoGrid,
        estimator: &'a dyn GeoCoding,
        radius: usize,
        epsilon: f64,
    ) -> Self {
        Self {
            grid,
            estimator,
            radius,
            epsilon,
        }
    }

    pub fn locate(&self, geo: &GeoPos) -> GeoResult<Located> {
        if !geo.is_valid() {
            return Ok(Located::Unresolved);
        }

        let estimate = self.estimator.pixel_pos(geo)?;
        if !estimate.is_valid() {
            log::trace!("Estimator has no pixel for {}, falling back to quad-tree search", geo);
            return Ok(QuadTreeSearch::new(self.grid, self.epsilon).locate(geo));
        }

        let (x0, y0) = match self.grid.cell_of(&estimate) {
            Some(cell) => cell,
            None => return Ok(Located::Estimate(estimate)),
        };

        let crossing = self.grid.is_crossing_meridian();
        let x1 = x0.saturating_sub(self.radius);
        let y1 = y0.saturating_sub(self.radius);
        let x2 = (x0 + self.radius).min(self.grid.width() - 1);
        let y2 = (y0 + self.radius).min(self.grid.height() - 1);

        let lat0 = self.grid.lat_at(x0, y0);
        let weight = if lat0.is_finite() { lon_weight(lat0) } else { lon_weight(geo.lat) };

        let distance = |x: usize, y: usize| {
            weighted_sq_distance(
                geo.lat,
                geo.lon,
                self.grid.lat_at(x, y),
                self.grid.lon_at(x, y),
                weight,
                crossing,
            )
        };

        let mut best = (x0, y0);
        let mut min_distance = distance(x0, y0);
        if min_distance.is_nan() {
            min_distance = f64::INFINITY;
        }

        for y in y1..=y2 {
            for x in x1..=x2 {
                if x == x0 && y == y0 {
                    continue;
                }
                let d = distance(x, y);
                if d < min_distance {
                    min_distance = d;
                    best = (x, y);
                }
            }
        }

        Ok(Located::Cell { x: best.0, y: best.1 })
    }

    /// Centre of the nearest cell in the window, or the unrefined estimate
    pub fn pixel_pos(&self, geo: &GeoPos) -> GeoResult<PixelPos> {
        Ok(self.locate(geo)?.into_pixel(self.grid, geo, false))
    }
}
