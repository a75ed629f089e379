//! Burns filtered polygons into a label grid.

use std::collections::BTreeMap;

use geo::{BoundingRect, Intersects, Point};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::GeoBox;
use crate::types::{PolygonFeature, PolygonId};

/// Which polygon owns a pixel whose centre falls inside several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The polygon drawn later (higher label) wins.
    #[default]
    LastDrawnWins,
    /// The first polygon drawn keeps the pixel.
    FirstDrawnWins,
}

/// Label grid plus the label to polygon id mapping. `0` means no polygon.
#[derive(Debug, Clone)]
pub struct LabelRaster {
    pub geobox: GeoBox,
    pub grid: Array2<u32>,
    labels: BTreeMap<u32, PolygonId>,
}

impl LabelRaster {
    pub fn polygon_id(&self, label: u32) -> Option<&PolygonId> {
        self.labels.get(&label)
    }

    pub fn labels(&self) -> &BTreeMap<u32, PolygonId> {
        &self.labels
    }

    /// Number of pixels carrying `label`.
    pub fn pixel_count(&self, label: u32) -> usize {
        self.grid.iter().filter(|&&l| l == label).count()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterLabeler {
    policy: OverlapPolicy,
}

impl RasterLabeler {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self { policy }
    }

    /// Assign labels `1..=N` in slice order and burn each polygon into the
    /// grid, selecting pixels by centre.
    pub fn label(&self, polygons: &[&PolygonFeature], geobox: &GeoBox) -> LabelRaster {
        let mut grid = Array2::<u32>::zeros(geobox.shape());
        let mut labels = BTreeMap::new();

        for (idx, feature) in polygons.iter().enumerate() {
            let label = idx as u32 + 1;
            labels.insert(label, feature.id.clone());

            let Some(bounds) = feature.geometry.bounding_rect() else {
                continue;
            };
            let Some((rows, cols)) = pixel_window(geobox, bounds) else {
                continue;
            };
            for row in rows.0..=rows.1 {
                for col in cols.0..=cols.1 {
                    let cell = &mut grid[[row, col]];
                    if *cell != 0 && self.policy == OverlapPolicy::FirstDrawnWins {
                        continue;
                    }
                    let centre = Point::from(geobox.pixel_center(row, col));
                    if feature.geometry.intersects(&centre) {
                        *cell = label;
                    }
                }
            }
        }

        LabelRaster {
            geobox: geobox.clone(),
            grid,
            labels,
        }
    }
}

type Span = (usize, usize);

/// Inclusive row and column ranges whose pixel centres fall in `bounds`.
fn pixel_window(geobox: &GeoBox, bounds: geo::Rect<f64>) -> Option<(Span, Span)> {
    let cols = centre_span(
        bounds.min().x,
        bounds.max().x,
        geobox.left,
        geobox.resolution.x,
        geobox.width,
    )?;
    let rows = centre_span(
        bounds.min().y,
        bounds.max().y,
        geobox.top,
        geobox.resolution.y,
        geobox.height,
    )?;
    Some((rows, cols))
}

fn centre_span(lo: f64, hi: f64, origin: f64, step: f64, len: usize) -> Option<Span> {
    if len == 0 {
        return None;
    }
    let a = (lo - origin) / step - 0.5;
    let b = (hi - origin) / step - 0.5;
    let first = a.min(b).ceil().max(0.0);
    let last = a.max(b).floor().min(len as f64 - 1.0);
    (first <= last).then_some((first as usize, last as usize))
}
