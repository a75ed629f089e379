//! Core domain types: polygons, scenes, CRS and grid resolution.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use geo::{BoundingRect, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{DrillError, Result};

/// Coordinate reference system identifier (e.g. `EPSG:6933`).
///
/// Equality ignores ASCII case, so `epsg:6933` and `EPSG:6933` name the same CRS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Crs {}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Crs {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique key of a polygon within a [`PolygonSet`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolygonId(String);

impl PolygonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolygonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PolygonId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PolygonId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single polygon feature (e.g. one water body).
#[derive(Debug, Clone)]
pub struct PolygonFeature {
    pub id: PolygonId,
    pub geometry: MultiPolygon<f64>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl PolygonFeature {
    pub fn new(id: impl Into<PolygonId>, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            id: id.into(),
            geometry: geometry.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// An indexed, immutable polygon collection in a single CRS.
///
/// Produced once per run by the vector loading collaborator, already
/// reprojected into the drill CRS.
#[derive(Debug, Clone)]
pub struct PolygonSet {
    crs: Crs,
    features: Vec<PolygonFeature>,
}

impl PolygonSet {
    /// Build a polygon set, rejecting duplicate ids.
    pub fn new(crs: Crs, features: Vec<PolygonFeature>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(features.len());
        for feature in &features {
            if !seen.insert(&feature.id) {
                return Err(DrillError::config(format!(
                    "duplicate polygon id '{}'",
                    feature.id
                )));
            }
        }
        Ok(Self { crs, features })
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn features(&self) -> &[PolygonFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding rectangle of every feature, or `None` for an empty set.
    pub fn total_bounds(&self) -> Option<Rect<f64>> {
        total_bounds(self.features.iter().map(|f| &f.geometry))
    }
}

/// Union of the bounding rectangles of a sequence of geometries.
pub fn total_bounds<'a>(geoms: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Option<Rect<f64>> {
    geoms
        .into_iter()
        .filter_map(|g| g.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        })
}

/// Metadata of one time-stamped raster acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub product: String,
    /// Spatial partition code; `None` means the scene is its own partition.
    pub region_code: Option<String>,
    pub crs: Crs,
    pub extent: Polygon<f64>,
    pub center_time: DateTime<Utc>,
    pub creation_time: DateTime<Utc>,
}

impl Scene {
    /// Partition key used when deduplicating reissued scenes.
    pub fn partition_key(&self) -> &str {
        self.region_code.as_deref().unwrap_or(&self.id)
    }
}

/// Output pixel size. `y` is negative for north-up grids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

impl Resolution {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Area of one pixel in squared CRS units.
    pub fn pixel_area(&self) -> f64 {
        (self.x * self.y).abs()
    }
}

/// Resampling method requested from the raster loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
    Average,
    Mode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_crs_case_insensitive() {
        assert_eq!(Crs::new("EPSG:6933"), Crs::new("epsg:6933"));
        assert_ne!(Crs::new("EPSG:6933"), Crs::new("EPSG:3577"));
    }

    #[test]
    fn test_polygon_set_rejects_duplicates() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let features = vec![
            PolygonFeature::new("a", square.clone()),
            PolygonFeature::new("a", square),
        ];
        let err = PolygonSet::new(Crs::new("EPSG:6933"), features).unwrap_err();
        assert!(matches!(err, DrillError::Configuration(_)));
    }

    #[test]
    fn test_total_bounds() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let b = polygon![(x: 5.0, y: -2.0), (x: 6.0, y: -2.0), (x: 6.0, y: 3.0), (x: 5.0, y: 3.0)];
        let set = PolygonSet::new(
            Crs::new("EPSG:6933"),
            vec![PolygonFeature::new("a", a), PolygonFeature::new("b", b)],
        )
        .unwrap();
        let bounds = set.total_bounds().unwrap();
        assert_eq!(bounds.min().x, 0.0);
        assert_eq!(bounds.min().y, -2.0);
        assert_eq!(bounds.max().x, 6.0);
        assert_eq!(bounds.max().y, 3.0);
    }

    #[test]
    fn test_partition_key_falls_back_to_id() {
        let extent = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let now = Utc::now();
        let mut scene = Scene {
            id: "s1".into(),
            product: "wofs_ls".into(),
            region_code: None,
            crs: Crs::new("EPSG:6933"),
            extent,
            center_time: now,
            creation_time: now,
        };
        assert_eq!(scene.partition_key(), "s1");
        scene.region_code = Some("170068".into());
        assert_eq!(scene.partition_key(), "170068");
    }
}
