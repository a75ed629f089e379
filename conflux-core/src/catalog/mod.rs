//! Raster catalog collaborator: scene lookup, spatiotemporal search and load.

mod memory;

pub use memory::{LoadFailure, MemoryCatalog};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use geo::{Polygon, Rect};

use crate::error::{DrillError, Result};
use crate::raster::RasterCube;
use crate::types::{Crs, Resampling, Resolution, Scene};

/// Inclusive time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A single instant.
    pub fn at(t: DateTime<Utc>) -> Self {
        Self::new(t, t)
    }

    /// `centre ± buffer`.
    pub fn around(centre: DateTime<Utc>, buffer: Duration) -> Self {
        Self::new(centre - buffer, centre + buffer)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Search for scenes of one product intersecting `bounds` within `time`.
#[derive(Debug, Clone)]
pub struct SceneQuery {
    pub product: String,
    pub bounds: Polygon<f64>,
    pub time: TimeRange,
}

/// Load `measurements` from `scenes` onto the grid covering `bounds`.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub scenes: Vec<Scene>,
    pub measurements: Vec<String>,
    pub crs: Crs,
    pub resolution: Resolution,
    pub resampling: Resampling,
    pub bounds: Rect<f64>,
}

/// Source of scene metadata and pixels.
///
/// Load failures are reported as `MissingBand` (band absent), `TypeMismatch`
/// (undecodable data) or `RasterIo` (read failure) so the worker can
/// classify them.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_scene(&self, id: &str) -> Result<Option<Scene>>;

    async fn find_scenes(&self, query: &SceneQuery) -> Result<Vec<Scene>>;

    async fn load(&self, request: &LoadRequest) -> Result<RasterCube>;

    /// The scene footprint in `crs`.
    ///
    /// The default only accepts scenes already in `crs`; catalogs that can
    /// reproject override this.
    fn extent_in(&self, scene: &Scene, crs: &Crs) -> Result<Polygon<f64>> {
        if &scene.crs == crs {
            Ok(scene.extent.clone())
        } else {
            Err(DrillError::config(format!(
                "scene {} is in {}, drill CRS is {}",
                scene.id, scene.crs, crs
            )))
        }
    }
}
