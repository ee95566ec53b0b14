use crate::io::mask::BitMask;
use crate::types::{GeoError, GeoResult};
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Geolocation band of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Latitude,
    Longitude,
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Latitude => write!(f, "latitude"),
            Band::Longitude => write!(f, "longitude"),
        }
    }
}

/// Source of the per-pixel latitude and longitude rasters of one scene.
///
/// Both bands share the scene's `width` x `height`; `read_all` returns an
/// array of shape `(height, width)`.
pub trait RasterSource: Send + Sync {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn read_all(&self, band: Band) -> GeoResult<Array2<f32>>;
}

/// Latitude/longitude rasters already held in memory
#[derive(Debug, Clone)]
pub struct ArrayRasterSource {
    latitude: Array2<f32>,
    longitude: Array2<f32>,
}

impl ArrayRasterSource {
    pub fn new(latitude: Array2<f32>, longitude: Array2<f32>) -> GeoResult<Self> {
        if latitude.dim() != longitude.dim() {
            return Err(GeoError::DimensionMismatch(format!(
                "latitude raster is {:?} but longitude raster is {:?}",
                latitude.dim(),
                longitude.dim()
            )));
        }
        Ok(Self { latitude, longitude })
    }

    /// Build both rasters by evaluating `f(x, y) -> (lat, lon)` for every pixel
    pub fn from_fn<F>(width: usize, height: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> (f32, f32),
    {
        let mut latitude = Array2::<f32>::zeros((height, width));
        let mut longitude = Array2::<f32>::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let (lat, lon) = f(x, y);
                latitude[[y, x]] = lat;
                longitude[[y, x]] = lon;
            }
        }
        Self { latitude, longitude }
    }
}

impl RasterSource for ArrayRasterSource {
    fn width(&self) -> usize {
        self.latitude.ncols()
    }

    fn height(&self) -> usize {
        self.latitude.nrows()
    }

    fn read_all(&self, band: Band) -> GeoResult<Array2<f32>> {
        Ok(match band {
            Band::Latitude => self.latitude.clone(),
            Band::Longitude => self.longitude.clone(),
        })
    }
}

/// Latitude/longitude bands stored in a GDAL-readable file.
///
/// The dataset is re-opened for every read so the source stays `Sync`.
#[derive(Debug, Clone)]
pub struct GdalRasterSource {
    path: PathBuf,
    lat_band: isize,
    lon_band: isize,
    width: usize,
    height: usize,
}

impl GdalRasterSource {
    /// Open a dataset whose `lat_band` and `lon_band` (1-based) hold the geolocation
    pub fn open<P: AsRef<Path>>(path: P, lat_band: isize, lon_band: isize) -> GeoResult<Self> {
        log::info!("Opening geolocation raster: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();

        for band in [lat_band, lon_band] {
            if band < 1 || band > band_count {
                return Err(GeoError::InvalidParameter(format!(
                    "band {} not present, dataset has {} bands",
                    band, band_count
                )));
            }
        }

        log::debug!("Geolocation raster size: {}x{}, {} bands", width, height, band_count);

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            lat_band,
            lon_band,
            width,
            height,
        })
    }

    fn band_index(&self, band: Band) -> isize {
        match band {
            Band::Latitude => self.lat_band,
            Band::Longitude => self.lon_band,
        }
    }

    fn read_band(&self, dataset: &Dataset, band: Band) -> GeoResult<(Array2<f32>, Option<f64>)> {
        let rasterband = dataset.rasterband(self.band_index(band))?;
        let nodata = rasterband.no_data_value();
        let buffer = rasterband.read_as::<f32>(
            (0, 0),
            (self.width, self.height),
            (self.width, self.height),
            None,
        )?;

        let array = Array2::from_shape_vec((self.height, self.width), buffer.data)
            .map_err(|e| GeoError::Processing(format!("Failed to reshape {} band: {}", band, e)))?;

        Ok((array, nodata))
    }

    /// Validity mask from the bands' no-data values: a pixel is valid when both
    /// samples are finite and differ from their band's no-data value.
    pub fn no_data_mask(&self) -> GeoResult<BitMask> {
        let dataset = Dataset::open(&self.path)?;
        let (lat, lat_nodata) = self.read_band(&dataset, Band::Latitude)?;
        let (lon, lon_nodata) = self.read_band(&dataset, Band::Longitude)?;

        let usable = |value: f32, nodata: Option<f64>| {
            value.is_finite() && nodata.map_or(true, |nd| value as f64 != nd)
        };

        let width = self.width;
        let mask = BitMask::from_fn(width * self.height, |index| {
            let (y, x) = (index / width, index % width);
            usable(lat[[y, x]], lat_nodata) && usable(lon[[y, x]], lon_nodata)
        });

        log::debug!(
            "No-data mask: {}/{} valid pixels",
            mask.count_valid(),
            mask.len()
        );

        Ok(mask)
    }
}

impl RasterSource for GdalRasterSource {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn read_all(&self, band: Band) -> GeoResult<Array2<f32>> {
        log::debug!("Reading {} band from {}", band, self.path.display());
        let dataset = Dataset::open(&self.path)?;
        let (array, _) = self.read_band(&dataset, band)?;
        Ok(array)
    }
}
