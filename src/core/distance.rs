use crate::core::meridian::lon_diff;
use crate::types::D2R;

/// Longitude weight `cos(lat)` of the equirectangular approximation
#[inline]
pub fn lon_weight(lat_deg: f64) -> f64 {
    (lat_deg * D2R).cos()
}

/// Weighted squared distance `dlat² + (weight · dlon)²` in squared degrees.
///
/// NaN samples yield NaN, which never compares less than a finite distance.
#[inline]
pub fn weighted_sq_distance(
    lat: f64,
    lon: f64,
    cell_lat: f64,
    cell_lon: f64,
    weight: f64,
    crossing: bool,
) -> f64 {
    let dlat = lat - cell_lat;
    let dlon = weight * lon_diff(lon, cell_lon, crossing);
    dlat * dlat + dlon * dlon
}
