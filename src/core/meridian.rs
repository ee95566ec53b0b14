use ndarray::Array2;

/// Absolute longitude difference in degrees.
///
/// Scenes crossing the anti-meridian use the shorter way round the globe.
#[inline]
pub fn lon_diff(a: f64, b: f64, crossing: bool) -> f64 {
    let d = (a - b).abs();
    if crossing && d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Shift `lon` by ±360° into `[reference - 180, reference + 180)`
#[inline]
pub fn unwrap_lon(lon: f64, reference: f64) -> f64 {
    reference + (lon - reference + 180.0).rem_euclid(360.0) - 180.0
}

/// Pixel indices `(x, y)` along the image boundary, clockwise from the
/// top-left corner and closed back onto it.
pub fn boundary_path(width: usize, height: usize) -> Vec<(usize, usize)> {
    if width < 2 || height < 2 {
        return Vec::new();
    }
    let mut path = Vec::with_capacity(2 * (width + height));
    for x in 0..width {
        path.push((x, 0));
    }
    for y in 1..height {
        path.push((width - 1, y));
    }
    for x in (0..width - 1).rev() {
        path.push((x, height - 1));
    }
    for y in (0..height - 1).rev() {
        path.push((0, y));
    }
    path
}

/// Detect whether the longitude grid wraps across ±180°.
///
/// Consecutive boundary samples more than 180° apart mark a crossing. Grids one
/// pixel wide or high have no boundary polygon and report `false`.
pub fn detect_meridian_crossing(lon: &Array2<f32>) -> bool {
    let (height, width) = lon.dim();
    if width < 2 || height < 2 {
        log::warn!(
            "Meridian crossing cannot be evaluated on a {}x{} grid, assuming none",
            width,
            height
        );
        return false;
    }

    let mut previous: Option<f64> = None;
    for (x, y) in boundary_path(width, height) {
        let current = lon[[y, x]] as f64;
        if !current.is_finite() {
            continue;
        }
        if let Some(prev) = previous {
            if (current - prev).abs() > 180.0 {
                log::debug!("Meridian crossing detected at boundary pixel [{}, {}]", x, y);
                return true;
            }
        }
        previous = Some(current);
    }
    false
}
