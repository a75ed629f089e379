//! # Conflux core
//!
//! Zonal ("drill") statistics of satellite raster scenes over a fixed set of
//! polygons.
//!
//! A drill screens the polygons against a scene extent, loads the plugin's
//! input band onto the scene grid (mosaicking neighbouring scenes in
//! overedge mode), rasterises the surviving polygons into a label grid and
//! summarises each polygon's pixels through the plugin. Polygons cut by the
//! scene edge are annotated with the sides they overflow.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use conflux_core::{waterbodies, DrillEngine, DrillOptions, MemoryCatalog};
//!
//! let engine = DrillEngine::new(Arc::new(MemoryCatalog::new()));
//! let plugin = waterbodies::plugin()?;
//! let table = engine.drill(&plugin, &polygons, "scene-id", &DrillOptions::default()).await?;
//! ```

pub mod catalog;
pub mod drill;
pub mod error;
pub mod geometry;
pub mod plugin;
pub mod raster;
pub mod table;
pub mod types;
pub mod waterbodies;

pub use catalog::{Catalog, LoadFailure, LoadRequest, MemoryCatalog, SceneQuery, TimeRange};
pub use drill::{DrillEngine, DrillOptions, DrillState, SceneAssembler, SceneGroup};
pub use error::{DrillError, Result};
pub use geometry::{Direction, Directions, SpatialFilter, FLAG_COLUMNS};
pub use plugin::{Plugin, PluginBuilder, PluginContext, PluginError};
pub use raster::{GeoBox, LabelRaster, OverlapPolicy, RasterCube, RasterLabeler, ZonalReducer, ZoneValues};
pub use table::{ColumnSpec, ColumnType, Record, Table, TableMetadata, Value};
pub use types::{Crs, PolygonFeature, PolygonId, PolygonSet, Resampling, Resolution, Scene};
