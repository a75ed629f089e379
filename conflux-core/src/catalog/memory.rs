use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use geo::Intersects;
use ndarray::Array2;
use parking_lot::RwLock;
use tracing::debug;

use super::{Catalog, LoadRequest, SceneQuery};
use crate::error::{DrillError, Result};
use crate::raster::{GeoBox, RasterCube};
use crate::types::{Resampling, Scene};

/// Failure injected into [`MemoryCatalog::load`] for one scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    RasterIo(String),
    MissingBand(String),
    TypeMismatch(String),
}

impl From<LoadFailure> for DrillError {
    fn from(failure: LoadFailure) -> Self {
        match failure {
            LoadFailure::RasterIo(m) => DrillError::RasterIo(m),
            LoadFailure::MissingBand(m) => DrillError::MissingBand(m),
            LoadFailure::TypeMismatch(m) => DrillError::TypeMismatch(m),
        }
    }
}

#[derive(Debug, Clone)]
struct SceneData {
    geobox: GeoBox,
    bands: BTreeMap<String, Array2<f64>>,
}

#[derive(Debug, Default)]
struct Inner {
    scenes: HashMap<String, Scene>,
    data: HashMap<String, SceneData>,
    failures: HashMap<String, LoadFailure>,
}

/// In-memory catalog.
///
/// Loads resample nearest-neighbour onto the requested grid. When several
/// scenes are requested only the earliest UTC day is used, and within it
/// the most recent valid observation wins per pixel.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    inner: RwLock<Inner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scene(&self, scene: Scene) {
        self.inner.write().scenes.insert(scene.id.clone(), scene);
    }

    /// Register pixels for a scene. Every band must match the grid shape.
    pub fn add_scene_data(
        &self,
        scene_id: impl Into<String>,
        geobox: GeoBox,
        bands: BTreeMap<String, Array2<f64>>,
    ) -> Result<()> {
        let scene_id = scene_id.into();
        for (name, data) in &bands {
            if data.dim() != geobox.shape() {
                return Err(DrillError::type_mismatch(format!(
                    "band '{name}' of scene {scene_id} has shape {:?}, grid is {:?}",
                    data.dim(),
                    geobox.shape()
                )));
            }
        }
        self.inner
            .write()
            .data
            .insert(scene_id, SceneData { geobox, bands });
        Ok(())
    }

    /// Make every load touching `scene_id` fail.
    pub fn fail_load(&self, scene_id: impl Into<String>, failure: LoadFailure) {
        self.inner.write().failures.insert(scene_id.into(), failure);
    }

    pub fn scene_count(&self) -> usize {
        self.inner.read().scenes.len()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_scene(&self, id: &str) -> Result<Option<Scene>> {
        Ok(self.inner.read().scenes.get(id).cloned())
    }

    async fn find_scenes(&self, query: &SceneQuery) -> Result<Vec<Scene>> {
        let inner = self.inner.read();
        let mut found: Vec<Scene> = inner
            .scenes
            .values()
            .filter(|s| s.product == query.product)
            .filter(|s| query.time.contains(s.center_time))
            .filter(|s| s.extent.intersects(&query.bounds))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.center_time.cmp(&b.center_time).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn load(&self, request: &LoadRequest) -> Result<RasterCube> {
        if request.resampling != Resampling::Nearest {
            debug!(resampling = ?request.resampling, "memory catalog samples nearest-neighbour only");
        }

        let first_day: Option<NaiveDate> = request
            .scenes
            .iter()
            .map(|s| s.center_time.date_naive())
            .min();
        let Some(first_day) = first_day else {
            return Err(DrillError::unavailable("load requested with no scenes"));
        };

        let mut day: Vec<&Scene> = request
            .scenes
            .iter()
            .filter(|s| s.center_time.date_naive() == first_day)
            .collect();
        day.sort_by(|a, b| b.center_time.cmp(&a.center_time));

        let inner = self.inner.read();
        let mut sources = Vec::with_capacity(day.len());
        for scene in &day {
            if let Some(failure) = inner.failures.get(&scene.id) {
                return Err(failure.clone().into());
            }
            if scene.crs != request.crs {
                return Err(DrillError::type_mismatch(format!(
                    "scene {} is stored in {}, requested {}",
                    scene.id, scene.crs, request.crs
                )));
            }
            let data = inner
                .data
                .get(&scene.id)
                .filter(|d| !d.bands.is_empty())
                .ok_or_else(|| {
                    DrillError::unavailable(format!("scene {} has no bands", scene.id))
                })?;
            sources.push(data);
        }

        let geobox = GeoBox::covering(request.bounds, request.crs.clone(), request.resolution)?;
        let Some(time) = day.last().map(|s| s.center_time) else {
            return Err(DrillError::unavailable("load requested with no scenes"));
        };
        let mut cube = RasterCube::new(geobox, time);

        for measurement in &request.measurements {
            let mut out = Array2::from_elem(cube.geobox.shape(), f64::NAN);
            for source in &sources {
                let band = source
                    .bands
                    .get(measurement)
                    .ok_or_else(|| DrillError::missing_band(measurement.clone()))?;
                for ((row, col), cell) in out.indexed_iter_mut() {
                    if !cell.is_nan() {
                        continue;
                    }
                    let centre = cube.geobox.pixel_center(row, col);
                    if let Some(idx) = source.geobox.index_of(centre) {
                        *cell = band[idx];
                    }
                }
            }
            cube.insert_band(measurement.clone(), out)?;
        }

        debug!(
            scenes = sources.len(),
            shape = ?cube.geobox.shape(),
            "loaded cube"
        );
        Ok(cube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TimeRange;
    use crate::types::{Crs, Resolution};
    use chrono::{Duration, TimeZone, Utc};
    use geo::{coord, Rect};

    fn scene(id: &str, x0: f64, hours: i64) -> Scene {
        let t = Utc.with_ymd_and_hms(2020, 6, 1, 8, 0, 0).unwrap() + Duration::hours(hours);
        Scene {
            id: id.into(),
            product: "wofs_ls".into(),
            region_code: None,
            crs: Crs::new("EPSG:6933"),
            extent: Rect::new(coord! { x: x0, y: 0.0 }, coord! { x: x0 + 20.0, y: 20.0 }).to_polygon(),
            center_time: t,
            creation_time: t,
        }
    }

    fn grid(x0: f64) -> GeoBox {
        GeoBox::new(Crs::new("EPSG:6933"), x0, 20.0, Resolution::new(10.0, -10.0), 2, 2)
    }

    fn water(values: [f64; 4]) -> BTreeMap<String, Array2<f64>> {
        let mut bands = BTreeMap::new();
        bands.insert(
            "water".to_string(),
            Array2::from_shape_vec((2, 2), values.to_vec()).unwrap(),
        );
        bands
    }

    fn request(scenes: Vec<Scene>, bounds: Rect<f64>) -> LoadRequest {
        LoadRequest {
            scenes,
            measurements: vec!["water".into()],
            crs: Crs::new("EPSG:6933"),
            resolution: Resolution::new(10.0, -10.0),
            resampling: Resampling::Nearest,
            bounds,
        }
    }

    #[tokio::test]
    async fn test_find_scenes_by_time_and_space() {
        let catalog = MemoryCatalog::new();
        catalog.add_scene(scene("a", 0.0, 0));
        catalog.add_scene(scene("b", 20.0, 0));
        catalog.add_scene(scene("late", 0.0, 5));

        let found = catalog
            .find_scenes(&SceneQuery {
                product: "wofs_ls".into(),
                bounds: Rect::new(coord! { x: 5.0, y: 5.0 }, coord! { x: 10.0, y: 10.0 }).to_polygon(),
                time: TimeRange::around(scene("x", 0.0, 0).center_time, Duration::hours(1)),
            })
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_load_mosaics_adjacent_scenes() {
        let catalog = MemoryCatalog::new();
        let (a, b) = (scene("a", 0.0, 0), scene("b", 20.0, 0));
        catalog.add_scene(a.clone());
        catalog.add_scene(b.clone());
        catalog.add_scene_data("a", grid(0.0), water([1.0, 1.0, 1.0, 1.0])).unwrap();
        catalog.add_scene_data("b", grid(20.0), water([2.0, 2.0, 2.0, 2.0])).unwrap();

        let bounds = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 40.0, y: 20.0 });
        let cube = catalog.load(&request(vec![a, b], bounds)).await.unwrap();
        let band = cube.band("water").unwrap();
        assert_eq!(band.dim(), (2, 4));
        assert_eq!(band[[0, 0]], 1.0);
        assert_eq!(band[[1, 3]], 2.0);
    }

    #[tokio::test]
    async fn test_load_prefers_most_recent_valid_pixel() {
        let catalog = MemoryCatalog::new();
        let (old, new) = (scene("old", 0.0, 0), scene("new", 0.0, 1));
        catalog.add_scene_data("old", grid(0.0), water([1.0, 1.0, 1.0, 1.0])).unwrap();
        catalog.add_scene_data("new", grid(0.0), water([2.0, f64::NAN, 2.0, 2.0])).unwrap();

        let bounds = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 20.0, y: 20.0 });
        let cube = catalog.load(&request(vec![old, new], bounds)).await.unwrap();
        let band = cube.band("water").unwrap();
        assert_eq!(band[[0, 0]], 2.0);
        assert_eq!(band[[0, 1]], 1.0);
    }

    #[tokio::test]
    async fn test_injected_failures_classified() {
        let catalog = MemoryCatalog::new();
        let a = scene("a", 0.0, 0);
        catalog.add_scene_data("a", grid(0.0), water([0.0; 4])).unwrap();
        catalog.fail_load("a", LoadFailure::RasterIo("connection reset".into()));

        let bounds = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 20.0, y: 20.0 });
        let err = catalog.load(&request(vec![a], bounds)).await.unwrap_err();
        assert!(matches!(err, DrillError::RasterIo(_)));
    }

    #[tokio::test]
    async fn test_missing_band() {
        let catalog = MemoryCatalog::new();
        let a = scene("a", 0.0, 0);
        catalog.add_scene_data("a", grid(0.0), water([0.0; 4])).unwrap();

        let mut req = request(
            vec![a],
            Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 20.0, y: 20.0 }),
        );
        req.measurements = vec!["nbart_red".into()];
        assert!(matches!(catalog.load(&req).await, Err(DrillError::MissingBand(_))));
    }
}
