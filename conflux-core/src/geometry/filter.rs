//! Two-phase polygon screening against a scene extent.

use geo::{BoundingRect, Centroid, Contains, Intersects, LineString, Polygon, Rect};
use tracing::debug;

use crate::error::{DrillError, Result};
use crate::types::{PolygonFeature, PolygonSet};

/// Selects the polygons a drill should cover for a given extent.
///
/// | partial | overedge | kept |
/// |---|---|---|
/// | false | false | fully contained |
/// | true | false | contained or intersecting |
/// | true | true | intersecting, minus those crossing the 3× extent box |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialFilter {
    partial: bool,
    overedge: bool,
}

impl SpatialFilter {
    /// Fails with `Configuration` when `overedge` is set without `partial`.
    pub fn new(partial: bool, overedge: bool) -> Result<Self> {
        if overedge && !partial {
            return Err(DrillError::config("overedge requires partial"));
        }
        Ok(Self { partial, overedge })
    }

    pub fn partial(&self) -> bool {
        self.partial
    }

    pub fn overedge(&self) -> bool {
        self.overedge
    }

    /// Polygons surviving both phases, in set order.
    pub fn apply<'a>(
        &self,
        polygons: &'a PolygonSet,
        extent: &Polygon<f64>,
    ) -> Vec<&'a PolygonFeature> {
        let Some(bbox) = extent.bounding_rect() else {
            return Vec::new();
        };

        let quick: Vec<&PolygonFeature> = polygons
            .features()
            .iter()
            .filter(|f| centroid_in(f, &expand(bbox, self.partial)))
            .collect();
        debug!(
            removed = polygons.len() - quick.len(),
            "centroid prefilter"
        );

        let exact: Vec<&PolygonFeature> = quick
            .iter()
            .copied()
            .filter(|f| {
                if self.partial {
                    f.geometry.intersects(extent)
                } else {
                    extent.contains(&f.geometry)
                }
            })
            .collect();
        debug!(removed = quick.len() - exact.len(), "exact filter");

        if !self.overedge {
            return exact;
        }

        let boundary = tripled_boundary(bbox);
        let kept: Vec<&PolygonFeature> = exact
            .iter()
            .copied()
            .filter(|f| !f.geometry.intersects(&boundary))
            .collect();
        debug!(removed = exact.len() - kept.len(), "overedge filter");
        kept
    }

    /// Whether a scene extent is worth drilling for this polygon set:
    /// some centroid lies in the buffered extent box and some polygon
    /// intersects the extent.
    pub fn scene_near_polygons(polygons: &PolygonSet, extent: &Polygon<f64>) -> bool {
        let Some(bbox) = extent.bounding_rect() else {
            return false;
        };
        let buffered = expand(bbox, true);
        let near: Vec<&PolygonFeature> = polygons
            .features()
            .iter()
            .filter(|f| centroid_in(f, &buffered))
            .collect();
        !near.is_empty() && near.iter().any(|f| f.geometry.intersects(extent))
    }
}

/// Grow `bbox` by its own width/height on every side when `buffer` is set.
fn expand(bbox: Rect<f64>, buffer: bool) -> Rect<f64> {
    if !buffer {
        return bbox;
    }
    let (w, h) = (bbox.width(), bbox.height());
    Rect::new(
        geo::coord! { x: bbox.min().x - w, y: bbox.min().y - h },
        geo::coord! { x: bbox.max().x + w, y: bbox.max().y + h },
    )
}

fn centroid_in(feature: &PolygonFeature, bbox: &Rect<f64>) -> bool {
    feature.geometry.centroid().is_some_and(|c| {
        c.x() >= bbox.min().x && c.x() <= bbox.max().x && c.y() >= bbox.min().y && c.y() <= bbox.max().y
    })
}

/// Exterior ring of the box three times the extent's size, centred on it.
fn tripled_boundary(bbox: Rect<f64>) -> LineString<f64> {
    expand(bbox, true).to_polygon().exterior().clone()
}
