use crate::core::geocoding::GeoCoding;
use crate::core::grid::GeoGrid;
use crate::core::local_window::LocalWindowSearch;
use crate::core::quad_tree::{Located, QuadTreeSearch};
use crate::io::mask::ValidityMask;
use crate::io::raster::RasterSource;
use crate::types::{BoundingBox, GeoError, GeoPos, GeoResult, GeocodingParams, PixelPos};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Inputs consumed by the one-time initialization
#[derive(Clone, Default)]
struct Inputs {
    estimator: Option<Arc<dyn GeoCoding>>,
    mask: Option<Arc<dyn ValidityMask>>,
}

/// Everything a query needs once the grid is materialized
struct Prepared {
    grid: GeoGrid,
    estimator: Option<Arc<dyn GeoCoding>>,
}

enum Lifecycle {
    Uninitialized(Inputs),
    /// Held while one thread materializes the grid; keeps the inputs so a
    /// failed or aborted initialization can be retried.
    Initializing(Inputs),
    Ready(Arc<Prepared>),
    Disposed,
}

/// Geocoding backed by per-pixel latitude/longitude rasters.
///
/// Construction is cheap: the rasters are read on the first query, exactly
/// once even when several threads query concurrently. Once ready, queries
/// share the immutable grid without locking.
///
/// Inverse queries use the estimator-guided local-window search when an
/// estimator is attached, and the quad-tree search otherwise.
///
/// `dispose` must not be called while queries are still running; later
/// queries fail with [`GeoError::Disposed`].
pub struct PixelGeoCoding {
    source: Box<dyn RasterSource>,
    params: GeocodingParams,
    state: RwLock<Lifecycle>,
    init_lock: Mutex<()>,
}

impl PixelGeoCoding {
    /// Create a pixel geocoding over `source`. No raster data is read.
    pub fn new<S: RasterSource + 'static>(source: S, params: GeocodingParams) -> GeoResult<Self> {
        params.validate()?;
        if source.width() == 0 || source.height() == 0 {
            return Err(GeoError::InvalidGrid(format!(
                "geolocation raster is {}x{}",
                source.width(),
                source.height()
            )));
        }

        log::debug!(
            "Created pixel geocoding for {}x{} scene (search radius {})",
            source.width(),
            source.height(),
            params.search_radius
        );

        Ok(Self {
            source: Box::new(source),
            params,
            state: RwLock::new(Lifecycle::Uninitialized(Inputs::default())),
            init_lock: Mutex::new(()),
        })
    }

    /// Attach an approximate geocoding of the same scene.
    ///
    /// It seeds inverse searches and fills masked pixels; it is shared, never
    /// disposed by this geocoding.
    pub fn with_estimator(mut self, estimator: Arc<dyn GeoCoding>) -> Self {
        if let Lifecycle::Uninitialized(inputs) = self.state_mut() {
            inputs.estimator = Some(estimator);
        }
        self
    }

    /// Attach a validity mask; pixels flagged invalid are filled from the
    /// estimator during initialization. The mask is dropped afterwards.
    pub fn with_valid_mask<M: ValidityMask + 'static>(mut self, mask: M) -> Self {
        if let Lifecycle::Uninitialized(inputs) = self.state_mut() {
            inputs.mask = Some(Arc::new(mask));
        }
        self
    }

    pub fn width(&self) -> usize {
        self.source.width()
    }

    pub fn height(&self) -> usize {
        self.source.height()
    }

    pub fn params(&self) -> &GeocodingParams {
        &self.params
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.read_state(), Lifecycle::Ready(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(*self.read_state(), Lifecycle::Disposed)
    }

    /// Nearest pixel to `geo`, or an invalid position when none is found
    pub fn resolve_pixel(&self, geo: &GeoPos) -> GeoResult<PixelPos> {
        if !geo.is_valid() {
            return Ok(PixelPos::invalid());
        }
        let prepared = self.prepared()?;
        self.resolve_with(&prepared, geo)
    }

    /// Resolve many geographic positions at once
    pub fn resolve_pixels(&self, geos: &[GeoPos]) -> GeoResult<Vec<PixelPos>> {
        let prepared = self.prepared()?;
        self.resolve_batch(&prepared, geos)
    }

    /// Geographic position of `pixel`.
    ///
    /// Inside the grid this is the stored position of the containing cell
    /// (interpolated between centres with fractional accuracy). Outside it the
    /// estimator answers, if there is one.
    pub fn resolve_geo(&self, pixel: &PixelPos) -> GeoResult<GeoPos> {
        if !pixel.is_valid() {
            return Ok(GeoPos::invalid());
        }
        let prepared = self.prepared()?;
        let grid = &prepared.grid;

        match grid.cell_of(pixel) {
            Some((x, y)) if self.params.fractional_accuracy => {
                Ok(grid.interpolate(pixel).unwrap_or_else(|| grid.geo_at(x, y)))
            }
            Some((x, y)) => Ok(grid.geo_at(x, y)),
            None => match &prepared.estimator {
                Some(estimator) => estimator.geo_pos(pixel),
                None => Ok(GeoPos::invalid()),
            },
        }
    }

    /// Whether the scene's longitudes wrap across ±180°
    pub fn is_meridian_crossing(&self) -> GeoResult<bool> {
        Ok(self.prepared()?.grid.is_crossing_meridian())
    }

    /// Geographic extent of the scene
    pub fn bounds(&self) -> GeoResult<Option<BoundingBox>> {
        Ok(self.prepared()?.grid.bounds())
    }

    /// Release the grids and the estimator reference.
    ///
    /// No query may be in flight. Any later query fails with `Disposed`.
    pub fn dispose(&self) {
        let mut state = self.write_state();
        if !matches!(*state, Lifecycle::Disposed) {
            log::debug!("Disposing pixel geocoding");
        }
        *state = Lifecycle::Disposed;
    }

    fn resolve_with(&self, prepared: &Prepared, geo: &GeoPos) -> GeoResult<PixelPos> {
        if !geo.is_valid() {
            return Ok(PixelPos::invalid());
        }
        let grid = &prepared.grid;
        let located = match &prepared.estimator {
            Some(estimator) => LocalWindowSearch::new(
                grid,
                estimator.as_ref(),
                self.params.search_radius,
                self.params.bbox_epsilon,
            )
            .locate(geo)?,
            None => QuadTreeSearch::new(grid, self.params.bbox_epsilon).locate(geo),
        };
        if located == Located::Unresolved {
            log::debug!("No pixel found for {}", geo);
        }
        Ok(located.into_pixel(grid, geo, self.params.fractional_accuracy))
    }

    #[cfg(feature = "parallel")]
    fn resolve_batch(&self, prepared: &Prepared, geos: &[GeoPos]) -> GeoResult<Vec<PixelPos>> {
        use rayon::prelude::*;

        geos.par_iter().map(|geo| self.resolve_with(prepared, geo)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn resolve_batch(&self, prepared: &Prepared, geos: &[GeoPos]) -> GeoResult<Vec<PixelPos>> {
        geos.iter().map(|geo| self.resolve_with(prepared, geo)).collect()
    }

    /// The materialized grid, initializing it on first use.
    ///
    /// Check, lock, check again: only the holder of `init_lock` reads the
    /// rasters; the others block on the lock and find the grid ready.
    fn prepared(&self) -> GeoResult<Arc<Prepared>> {
        match &*self.read_state() {
            Lifecycle::Ready(prepared) => return Ok(Arc::clone(prepared)),
            Lifecycle::Disposed => return Err(GeoError::Disposed),
            Lifecycle::Uninitialized(_) | Lifecycle::Initializing(_) => {}
        }

        let _init = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let inputs = {
            let mut state = self.write_state();
            let inputs = match &*state {
                Lifecycle::Ready(prepared) => return Ok(Arc::clone(prepared)),
                Lifecycle::Disposed => return Err(GeoError::Disposed),
                // A leftover `Initializing` means the previous holder of the
                // lock panicked; start over with its inputs.
                Lifecycle::Uninitialized(inputs) | Lifecycle::Initializing(inputs) => {
                    inputs.clone()
                }
            };
            *state = Lifecycle::Initializing(inputs.clone());
            inputs
        };

        let result = self.initialize(&inputs);

        let mut state = self.write_state();
        if matches!(*state, Lifecycle::Disposed) {
            return Err(GeoError::Disposed);
        }
        match result {
            Ok(prepared) => {
                let prepared = Arc::new(prepared);
                *state = Lifecycle::Ready(Arc::clone(&prepared));
                Ok(prepared)
            }
            Err(e) => {
                log::error!("Pixel geocoding initialization failed: {}", e);
                *state = Lifecycle::Uninitialized(inputs);
                Err(e)
            }
        }
    }

    fn initialize(&self, inputs: &Inputs) -> GeoResult<Prepared> {
        let mut grid = GeoGrid::materialize(self.source.as_ref())?;

        if let Some(mask) = &inputs.mask {
            grid.fill_gaps(mask.as_ref(), inputs.estimator.as_deref())?;
        }

        log::info!("Pixel geocoding ready: {}x{} grid", grid.width(), grid.height());

        Ok(Prepared {
            grid,
            estimator: inputs.estimator.clone(),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut Lifecycle {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GeoCoding for PixelGeoCoding {
    fn pixel_pos(&self, geo: &GeoPos) -> GeoResult<PixelPos> {
        self.resolve_pixel(geo)
    }

    fn geo_pos(&self, pixel: &PixelPos) -> GeoResult<GeoPos> {
        self.resolve_geo(pixel)
    }

    fn is_crossing_meridian(&self) -> GeoResult<bool> {
        self.is_meridian_crossing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mask::BitMask;
    use crate::io::raster::{ArrayRasterSource, Band};
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that fails its first `failures` reads
    struct FlakySource {
        inner: ArrayRasterSource,
        failures: AtomicUsize,
        reads: Arc<AtomicUsize>,
    }

    impl RasterSource for FlakySource {
        fn width(&self) -> usize {
            self.inner.width()
        }
        fn height(&self) -> usize {
            self.inner.height()
        }
        fn read_all(&self, band: Band) -> GeoResult<Array2<f32>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(GeoError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated band",
                )));
            }
            self.inner.read_all(band)
        }
    }

    fn unit_source(width: usize, height: usize) -> ArrayRasterSource {
        ArrayRasterSource::from_fn(width, height, |x, y| (y as f32, x as f32))
    }

    #[test]
    fn test_construction_reads_nothing() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            inner: unit_source(4, 4),
            failures: AtomicUsize::new(0),
            reads: Arc::clone(&reads),
        };
        let geocoding = PixelGeoCoding::new(source, GeocodingParams::default()).unwrap();
        assert!(!geocoding.is_initialized());
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        // invalid input does not initialize either
        assert!(!geocoding.resolve_pixel(&GeoPos::invalid()).unwrap().is_valid());
        assert!(!geocoding.resolve_geo(&PixelPos::invalid()).unwrap().is_valid());
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_initialization_is_retried() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = FlakySource {
            inner: unit_source(4, 4),
            failures: AtomicUsize::new(1),
            reads: Arc::clone(&reads),
        };
        let geocoding = PixelGeoCoding::new(source, GeocodingParams::default()).unwrap();

        let first = geocoding.resolve_pixel(&GeoPos::new(2.0, 2.0));
        assert!(matches!(first, Err(GeoError::Io(_))));
        assert!(!geocoding.is_initialized());

        let second = geocoding.resolve_pixel(&GeoPos::new(2.0, 2.0)).unwrap();
        assert_eq!(second, PixelPos::new(2.5, 2.5));
        assert!(geocoding.is_initialized());
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_disposed_queries_fail() {
        let geocoding = PixelGeoCoding::new(unit_source(4, 4), GeocodingParams::default()).unwrap();
        assert!(geocoding.resolve_geo(&PixelPos::new(1.5, 1.5)).is_ok());

        geocoding.dispose();
        assert!(geocoding.is_disposed());
        assert!(matches!(geocoding.resolve_pixel(&GeoPos::new(1.0, 1.0)), Err(GeoError::Disposed)));
        assert!(matches!(geocoding.resolve_geo(&PixelPos::new(1.5, 1.5)), Err(GeoError::Disposed)));
        assert!(matches!(geocoding.is_meridian_crossing(), Err(GeoError::Disposed)));
    }

    #[test]
    fn test_resolve_geo_direct_lookup() {
        let geocoding = PixelGeoCoding::new(unit_source(5, 5), GeocodingParams::default()).unwrap();
        assert_eq!(geocoding.resolve_geo(&PixelPos::new(3.9, 1.2)).unwrap(), GeoPos::new(1.0, 3.0));
        assert!(!geocoding.resolve_geo(&PixelPos::new(5.0, 1.0)).unwrap().is_valid());
    }

    #[test]
    fn test_mask_without_estimator_keeps_values() {
        let geocoding = PixelGeoCoding::new(unit_source(4, 4), GeocodingParams::default())
            .unwrap()
            .with_valid_mask(BitMask::all_invalid(16));
        assert_eq!(geocoding.resolve_geo(&PixelPos::new(2.5, 3.5)).unwrap(), GeoPos::new(3.0, 2.0));
    }

    #[test]
    fn test_rejects_zero_search_radius() {
        let params = GeocodingParams { search_radius: 0, ..Default::default() };
        let result = PixelGeoCoding::new(unit_source(4, 4), params);
        assert!(matches!(result, Err(GeoError::InvalidParameter(_))));
    }
}
