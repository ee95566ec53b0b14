use crate::core::distance::{lon_weight, weighted_sq_distance};
use crate::core::grid::GeoGrid;
use crate::core::meridian::unwrap_lon;
use crate::types::{GeoPos, PixelPos};

/// Outcome of an inverse search
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Located {
    /// Grid cell whose stored position is nearest the query
    Cell { x: usize, y: usize },
    /// Unrefined estimator position (outside the dense grid)
    Estimate(PixelPos),
    /// No cell could be associated with the query
    Unresolved,
}

impl Located {
    /// Convert to an image position.
    ///
    /// Cells map to their centre, or to a sub-pixel position when `fractional`.
    pub fn into_pixel(self, grid: &GeoGrid, geo: &GeoPos, fractional: bool) -> PixelPos {
        match self {
            Located::Cell { x, y } if fractional => grid.refine(x, y, geo),
            Located::Cell { x, y } => PixelPos::cell_center(x, y),
            Located::Estimate(pixel) => pixel,
            Located::Unresolved => PixelPos::invalid(),
        }
    }
}

/// Best cell found so far during one top-level search
#[derive(Debug, Clone, Copy)]
pub struct Nearest {
    pub x: usize,
    pub y: usize,
    pub sq_distance: f64,
}

impl Default for Nearest {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            sq_distance: f64::INFINITY,
        }
    }
}

/// Recursive bounding-box search over the whole grid, used when no estimator
/// is available.
///
/// Every node reads its four corner cells, inflates their geographic bounding
/// box by `epsilon` degrees and is discarded when the query lies outside.
/// Nodes are split into halves sharing their middle row/column until 2x2
/// leaves remain, whose cells are scored with the weighted squared distance.
pub struct QuadTreeSearch<'a> {
    grid: &'a GeoGrid,
    epsilon: f64,
    crossing: bool,
}

impl<'a> QuadTreeSearch<'a> {
    pub fn new(grid: &'a GeoGrid, epsilon: f64) -> Self {
        Self {
            grid,
            epsilon,
            crossing: grid.is_crossing_meridian(),
        }
    }

    /// Nearest cell to `geo`, or `Unresolved` when every node was pruned
    pub fn locate(&self, geo: &GeoPos) -> Located {
        if !geo.is_valid() {
            return Located::Unresolved;
        }
        let mut nearest = Nearest::default();
        if self.search(geo, 0, 0, self.grid.width(), self.grid.height(), &mut nearest) {
            Located::Cell { x: nearest.x, y: nearest.y }
        } else {
            log::trace!("Quad-tree search found no pixel for {}", geo);
            Located::Unresolved
        }
    }

    /// Centre of the nearest cell, or an invalid position
    pub fn pixel_pos(&self, geo: &GeoPos) -> PixelPos {
        self.locate(geo).into_pixel(self.grid, geo, false)
    }

    /// Search the window `[x, x + w) x [y, y + h)`, updating `nearest`.
    ///
    /// Returns true when a cell of this window became the nearest.
    pub fn search(
        &self,
        geo: &GeoPos,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        nearest: &mut Nearest,
    ) -> bool {
        if w < 2 || h < 2 {
            return false;
        }

        let corners = [(x, y), (x + w - 1, y), (x, y + h - 1), (x + w - 1, y + h - 1)];
        if !self.may_contain(geo, &corners) {
            return false;
        }

        if w == 2 && h == 2 {
            let mut found = false;
            for &(cx, cy) in &corners {
                found |= self.test_cell(geo, cx, cy, nearest);
            }
            return found;
        }

        let mut found = false;
        for &(sx, sw) in split(x, w).iter().flatten() {
            for &(sy, sh) in split(y, h).iter().flatten() {
                found |= self.search(geo, sx, sy, sw, sh, nearest);
            }
        }
        found
    }

    /// Whether the inflated corner bounding box may contain `geo`.
    ///
    /// Nodes with a non-finite corner cannot be bounded and are never pruned.
    fn may_contain(&self, geo: &GeoPos, corners: &[(usize, usize); 4]) -> bool {
        let mut lat_min = f64::INFINITY;
        let mut lat_max = f64::NEG_INFINITY;
        let mut lon_min = f64::INFINITY;
        let mut lon_max = f64::NEG_INFINITY;

        for &(cx, cy) in corners {
            let lat = self.grid.lat_at(cx, cy);
            let mut lon = self.grid.lon_at(cx, cy);
            if !lat.is_finite() || !lon.is_finite() {
                return true;
            }
            if self.crossing {
                lon = unwrap_lon(lon, geo.lon);
            }
            lat_min = lat_min.min(lat);
            lat_max = lat_max.max(lat);
            lon_min = lon_min.min(lon);
            lon_max = lon_max.max(lon);
        }

        let eps = self.epsilon;
        !(geo.lat < lat_min - eps
            || geo.lat > lat_max + eps
            || geo.lon < lon_min - eps
            || geo.lon > lon_max + eps)
    }

    fn test_cell(&self, geo: &GeoPos, x: usize, y: usize, nearest: &mut Nearest) -> bool {
        let lat = self.grid.lat_at(x, y);
        let lon = self.grid.lon_at(x, y);
        let d = weighted_sq_distance(geo.lat, geo.lon, lat, lon, lon_weight(lat), self.crossing);
        if d < nearest.sq_distance {
            *nearest = Nearest { x, y, sq_distance: d };
            true
        } else {
            false
        }
    }
}

/// Halve `[start, start + len)` into two ranges sharing their middle index.
///
/// Both halves are at least 2 long; ranges of length 2 are not split.
fn split(start: usize, len: usize) -> [Option<(usize, usize)>; 2] {
    if len <= 2 {
        return [Some((start, len)), None];
    }
    let mid = (len - 1) / 2;
    [Some((start, mid + 1)), Some((start + mid, len - mid))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raster::ArrayRasterSource;

    fn grid_from<F: Fn(usize, usize) -> (f32, f32)>(width: usize, height: usize, f: F) -> GeoGrid {
        GeoGrid::materialize(&ArrayRasterSource::from_fn(width, height, f)).unwrap()
    }

    #[test]
    fn test_split_shares_middle() {
        assert_eq!(split(0, 2), [Some((0, 2)), None]);
        assert_eq!(split(0, 3), [Some((0, 2)), Some((1, 2))]);
        assert_eq!(split(4, 4), [Some((4, 2)), Some((5, 3))]);
        assert_eq!(split(0, 9), [Some((0, 5)), Some((4, 5))]);
    }

    #[test]
    fn test_four_by_four_scenario() {
        let grid = grid_from(4, 4, |x, y| (y as f32, x as f32));
        let search = QuadTreeSearch::new(&grid, 0.04);

        assert_eq!(search.pixel_pos(&GeoPos::new(2.0, 2.0)), PixelPos::new(2.5, 2.5));
        assert!(!search.pixel_pos(&GeoPos::new(10.0, 10.0)).is_valid());
    }

    #[test]
    fn test_odd_sized_grid_reaches_every_cell() {
        let grid = grid_from(7, 5, |x, y| (y as f32, x as f32));
        let search = QuadTreeSearch::new(&grid, 0.04);
        for y in 0..5 {
            for x in 0..7 {
                let located = search.locate(&GeoPos::new(y as f64, x as f64));
                assert_eq!(located, Located::Cell { x, y });
            }
        }
    }

    #[test]
    fn test_too_small_grid_is_unresolved() {
        let grid = grid_from(1, 5, |_, y| (y as f32, 0.0));
        let search = QuadTreeSearch::new(&grid, 0.04);
        assert_eq!(search.locate(&GeoPos::new(2.0, 0.0)), Located::Unresolved);
    }

    #[test]
    fn test_tie_keeps_first_cell() {
        let grid = grid_from(2, 2, |x, _| (0.0, x as f32));
        let search = QuadTreeSearch::new(&grid, 0.04);
        // (0,0) and (0,1) share the same position; the first visited wins
        assert_eq!(search.locate(&GeoPos::new(0.0, 0.0)), Located::Cell { x: 0, y: 0 });
    }

    #[test]
    fn test_accumulator_tracks_global_minimum() {
        let grid = grid_from(6, 6, |x, y| (y as f32 * 0.5, x as f32 * 0.5));
        let search = QuadTreeSearch::new(&grid, 0.5);
        let mut nearest = Nearest::default();
        let found = search.search(&GeoPos::new(1.1, 1.9), 0, 0, 6, 6, &mut nearest);
        assert!(found);
        assert_eq!((nearest.x, nearest.y), (4, 2));
        assert!(nearest.sq_distance < 0.021);
    }

    #[test]
    fn test_nan_corners_do_not_prune() {
        let grid = grid_from(5, 5, |x, y| {
            if x == 0 && y == 0 {
                (f32::NAN, f32::NAN)
            } else {
                (y as f32, x as f32)
            }
        });
        let search = QuadTreeSearch::new(&grid, 0.04);
        assert_eq!(search.locate(&GeoPos::new(1.0, 1.0)), Located::Cell { x: 1, y: 1 });
        assert_eq!(search.locate(&GeoPos::new(0.0, 0.2)), Located::Cell { x: 1, y: 0 });
    }
}
