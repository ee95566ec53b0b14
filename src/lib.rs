//! pixgeo: Pixel Geocoding for Satellite Scenes
//!
//! Resolves image positions to geographic positions and back for scenes whose
//! geolocation is only known through per-pixel latitude/longitude rasters,
//! such as orthorectified or swath products without an analytic model.

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use numpy::PyReadonlyArray2;

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use crate::types::{
    PixelPos, GeoPos, BoundingBox, GeoTransform, GeocodingParams, GeoError, GeoResult,
    DEFAULT_SEARCH_RADIUS, DEFAULT_BBOX_EPSILON,
};

pub use crate::io::{RasterSource, ArrayRasterSource, GdalRasterSource, ValidityMask, BitMask};
pub use crate::core::{GeoCoding, AffineGeoCoding, GeoGrid, PixelGeoCoding};

/// Python module definition
#[cfg(feature = "python")]
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyPixelGeoCoding>()?;
    Ok(())
}

#[cfg(feature = "python")]
fn to_py_err(e: GeoError) -> PyErr {
    PyErr::new::<PyRuntimeError, _>(format!("{}", e))
}

/// Python wrapper for PixelGeoCoding
#[cfg(feature = "python")]
#[pyclass(name = "PixelGeoCoding")]
struct PyPixelGeoCoding {
    inner: PixelGeoCoding,
}

#[cfg(feature = "python")]
#[pymethods]
impl PyPixelGeoCoding {
    #[new]
    #[pyo3(signature = (
        latitude,
        longitude,
        search_radius = DEFAULT_SEARCH_RADIUS,
        valid_mask = None
    ))]
    fn new(
        latitude: PyReadonlyArray2<f32>,
        longitude: PyReadonlyArray2<f32>,
        search_radius: usize,
        valid_mask: Option<PyReadonlyArray2<bool>>,
    ) -> PyResult<Self> {
        let source = ArrayRasterSource::new(
            latitude.as_array().to_owned(),
            longitude.as_array().to_owned(),
        )
        .map_err(|e| PyValueError::new_err(format!("{}", e)))?;

        let params = GeocodingParams {
            search_radius,
            ..Default::default()
        };

        let mut inner = PixelGeoCoding::new(source, params)
            .map_err(|e| PyValueError::new_err(format!("{}", e)))?;

        if let Some(mask) = valid_mask {
            let mask = mask.as_array().to_owned();
            if mask.dim() != (inner.height(), inner.width()) {
                return Err(PyValueError::new_err(format!(
                    "valid_mask is {:?}, expected ({}, {})",
                    mask.dim(),
                    inner.height(),
                    inner.width()
                )));
            }
            inner = inner.with_valid_mask(mask);
        }

        Ok(PyPixelGeoCoding { inner })
    }

    /// (x, y) of the pixel nearest (lat, lon); NaN when not found
    fn pixel_pos(&self, lat: f64, lon: f64) -> PyResult<(f64, f64)> {
        let pixel = self.inner.resolve_pixel(&GeoPos::new(lat, lon)).map_err(to_py_err)?;
        Ok((pixel.x, pixel.y))
    }

    /// (lat, lon) of pixel (x, y); NaN outside the scene
    fn geo_pos(&self, x: f64, y: f64) -> PyResult<(f64, f64)> {
        let geo = self.inner.resolve_geo(&PixelPos::new(x, y)).map_err(to_py_err)?;
        Ok((geo.lat, geo.lon))
    }

    fn is_crossing_meridian(&self) -> PyResult<bool> {
        self.inner.is_meridian_crossing().map_err(to_py_err)
    }

    #[getter]
    fn width(&self) -> usize {
        self.inner.width()
    }

    #[getter]
    fn height(&self) -> usize {
        self.inner.height()
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    fn __repr__(&self) -> String {
        format!(
            "PixelGeoCoding(width={}, height={}, search_radius={})",
            self.inner.width(),
            self.inner.height(),
            self.inner.params().search_radius
        )
    }
}
