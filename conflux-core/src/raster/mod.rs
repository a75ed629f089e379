//! Raster grids and cubes, polygon labelling and zonal reduction.

pub mod label;
pub mod zonal;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geo::{coord, Coord, Polygon, Rect};
use ndarray::Array2;

use crate::error::{DrillError, Result};
use crate::types::{Crs, Resolution};

pub use label::{LabelRaster, OverlapPolicy, RasterLabeler};
pub use zonal::{ZonalReducer, ZoneValues};

/// An axis-aligned pixel grid.
///
/// `left`/`top` locate the outer corner of pixel `(0, 0)`; a negative
/// `resolution.y` gives a north-up grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoBox {
    pub crs: Crs,
    pub left: f64,
    pub top: f64,
    pub resolution: Resolution,
    pub width: usize,
    pub height: usize,
}

impl GeoBox {
    pub fn new(
        crs: Crs,
        left: f64,
        top: f64,
        resolution: Resolution,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            crs,
            left,
            top,
            resolution,
            width,
            height,
        }
    }

    /// Smallest grid of `resolution` covering `bounds`, snapped outward to
    /// whole multiples of the pixel size.
    pub fn covering(bounds: Rect<f64>, crs: Crs, resolution: Resolution) -> Result<Self> {
        let rx = resolution.x;
        let ry = resolution.y;
        if rx <= 0.0 || ry == 0.0 || !rx.is_finite() || !ry.is_finite() {
            return Err(DrillError::config(format!(
                "invalid resolution ({rx}, {ry})"
            )));
        }
        let ay = ry.abs();

        let left = (bounds.min().x / rx).floor() * rx;
        let right = (bounds.max().x / rx).ceil() * rx;
        let bottom = (bounds.min().y / ay).floor() * ay;
        let upper = (bounds.max().y / ay).ceil() * ay;

        let width = (((right - left) / rx).round() as usize).max(1);
        let height = (((upper - bottom) / ay).round() as usize).max(1);
        let top = if ry < 0.0 { upper } else { bottom };

        Ok(Self::new(crs, left, top, resolution, width, height))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Coordinate of the centre of pixel `(row, col)`.
    pub fn pixel_center(&self, row: usize, col: usize) -> Coord<f64> {
        coord! {
            x: self.left + (col as f64 + 0.5) * self.resolution.x,
            y: self.top + (row as f64 + 0.5) * self.resolution.y,
        }
    }

    /// Pixel containing `point`, if it falls inside the grid.
    pub fn index_of(&self, point: Coord<f64>) -> Option<(usize, usize)> {
        let col = ((point.x - self.left) / self.resolution.x).floor();
        let row = ((point.y - self.top) / self.resolution.y).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.height && col < self.width).then_some((row, col))
    }

    /// Grid bounds as a rectangle.
    pub fn bounds(&self) -> Rect<f64> {
        let right = self.left + self.width as f64 * self.resolution.x;
        let far = self.top + self.height as f64 * self.resolution.y;
        Rect::new(coord! { x: self.left, y: self.top }, coord! { x: right, y: far })
    }

    /// Grid bounds as a polygon, used as the drill extent.
    pub fn extent(&self) -> Polygon<f64> {
        self.bounds().to_polygon()
    }
}

/// A loaded (or transformed) set of co-registered bands for one time slice.
///
/// NaN marks nodata.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterCube {
    pub geobox: GeoBox,
    pub time: DateTime<Utc>,
    pub bands: BTreeMap<String, Array2<f64>>,
}

impl RasterCube {
    pub fn new(geobox: GeoBox, time: DateTime<Utc>) -> Self {
        Self {
            geobox,
            time,
            bands: BTreeMap::new(),
        }
    }

    /// Add a band; its shape must match the grid.
    pub fn with_band(mut self, name: impl Into<String>, data: Array2<f64>) -> Result<Self> {
        self.insert_band(name, data)?;
        Ok(self)
    }

    pub fn insert_band(&mut self, name: impl Into<String>, data: Array2<f64>) -> Result<()> {
        let name = name.into();
        if data.dim() != self.geobox.shape() {
            return Err(DrillError::type_mismatch(format!(
                "band '{name}' has shape {:?}, grid is {:?}",
                data.dim(),
                self.geobox.shape()
            )));
        }
        self.bands.insert(name, data);
        Ok(())
    }

    pub fn band(&self, name: &str) -> Result<&Array2<f64>> {
        self.bands
            .get(name)
            .ok_or_else(|| DrillError::missing_band(name.to_string()))
    }
}
