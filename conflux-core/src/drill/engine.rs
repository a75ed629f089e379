use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::assembler::SceneAssembler;
use crate::catalog::{Catalog, LoadRequest, SceneQuery, TimeRange};
use crate::error::{DrillError, Result};
use crate::geometry::{boundary_directions, SpatialFilter, FLAG_COLUMNS};
use crate::plugin::Plugin;
use crate::raster::{OverlapPolicy, RasterLabeler, ZonalReducer};
use crate::table::{Table, TableMetadata};
use crate::types::{total_bounds, PolygonId, PolygonSet, Scene};

/// Options for a single drill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillOptions {
    /// Keep polygons that only partly overlap the scene.
    pub partial: bool,
    /// Mosaic neighbouring scenes so partial polygons are fully covered.
    pub overedge: bool,
    /// Half-width of the overedge search window around the reference scene.
    pub time_buffer: StdDuration,
    pub overlap: OverlapPolicy,
    /// Fail instead of warning when several plugin scenes share the
    /// reference scene's centre time.
    pub strict_scene_match: bool,
}

impl Default for DrillOptions {
    fn default() -> Self {
        Self {
            partial: true,
            overedge: false,
            time_buffer: StdDuration::from_secs(3600),
            overlap: OverlapPolicy::default(),
            strict_scene_match: false,
        }
    }
}

/// Stages a drill passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillState {
    Filtering,
    SceneLoading,
    Transform,
    Labeling,
    Reducing,
    BoundaryAnnotation,
    Done,
}

/// Runs drills against a catalog.
#[derive(Clone)]
pub struct DrillEngine {
    catalog: Arc<dyn Catalog>,
}

impl DrillEngine {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    /// Drill `polygons` against the scene `scene_id`.
    ///
    /// Returns an empty table (with metadata) when no polygon survives the
    /// spatial filter.
    pub async fn drill(
        &self,
        plugin: &Plugin,
        polygons: &PolygonSet,
        scene_id: &str,
        options: &DrillOptions,
    ) -> Result<Table> {
        let filter = SpatialFilter::new(options.partial, options.overedge)?;
        let (product, band) = plugin.single_input()?;
        let crs = plugin.output_crs();
        if polygons.crs() != crs {
            return Err(DrillError::config(format!(
                "polygons are in {}, plugin outputs {}",
                polygons.crs(),
                crs
            )));
        }
        let time_buffer = Duration::from_std(options.time_buffer)
            .map_err(|e| DrillError::config(format!("invalid time buffer: {e}")))?;

        let reference = self
            .catalog
            .get_scene(scene_id)
            .await?
            .ok_or_else(|| DrillError::unavailable(format!("scene {scene_id} not found")))?;
        let metadata = TableMetadata::new(plugin.product_name(), reference.center_time);
        let extent = self.catalog.extent_in(&reference, crs)?;

        trace_state(scene_id, DrillState::Filtering);
        let kept = filter.apply(polygons, &extent);
        if kept.is_empty() {
            warn!(scene_id, "no polygons found in scene");
            return Ok(Table::default().with_metadata(metadata));
        }
        debug!(scene_id, polygons = kept.len(), "polygons kept");

        trace_state(scene_id, DrillState::SceneLoading);
        let (scenes, bounds) = if options.overedge {
            let features = kept.iter().map(|f| &f.geometry);
            let bounds = total_bounds(features)
                .ok_or_else(|| DrillError::geometry("filtered polygons have no bounds"))?;
            let group = SceneAssembler::new(self.catalog.as_ref(), time_buffer)
                .assemble(&reference, product, bounds)
                .await?;
            (group.scenes, group.bounds)
        } else {
            let scene = self
                .matching_scene(&reference, &extent, product, options.strict_scene_match)
                .await?;
            let bounds = geo::BoundingRect::bounding_rect(&extent)
                .ok_or_else(|| DrillError::geometry("scene extent is empty"))?;
            (vec![scene], bounds)
        };
        for scene in &scenes {
            debug!(scene_id, loading = %scene.id, "loading scene");
        }

        let cube = self
            .catalog
            .load(&LoadRequest {
                scenes,
                measurements: vec![band.to_string()],
                crs: crs.clone(),
                resolution: plugin.resolution(),
                resampling: plugin.resampling(),
                bounds,
            })
            .await?;
        let grid = cube.geobox.clone();
        info!(scene_id, height = grid.height, width = grid.width, "loaded reference grid");

        trace_state(scene_id, DrillState::Transform);
        let transformed = plugin.transform(cube)?;
        if transformed.geobox != grid {
            return Err(DrillError::type_mismatch(format!(
                "plugin {} changed the grid during transform",
                plugin.product_name()
            )));
        }

        trace_state(scene_id, DrillState::Labeling);
        let labels = RasterLabeler::new(options.overlap).label(&kept, &grid);

        trace_state(scene_id, DrillState::Reducing);
        let mut table = ZonalReducer::new(plugin).reduce(&transformed, &labels)?;

        if options.partial && !options.overedge {
            trace_state(scene_id, DrillState::BoundaryAnnotation);
            let grid_extent = grid.extent();
            let mut flags: BTreeMap<PolygonId, Vec<bool>> = BTreeMap::new();
            for feature in &kept {
                let directions = boundary_directions(&feature.geometry, &grid_extent)?;
                flags.insert(feature.id.clone(), directions.flags().to_vec());
            }
            table.left_join_flags(&FLAG_COLUMNS, &flags);
        }

        trace_state(scene_id, DrillState::Done);
        Ok(table.with_metadata(metadata))
    }

    /// The `product` scene sharing the reference scene's centre time.
    async fn matching_scene(
        &self,
        reference: &Scene,
        extent: &geo::Polygon<f64>,
        product: &str,
        strict: bool,
    ) -> Result<Scene> {
        if reference.product == product {
            return Ok(reference.clone());
        }
        let mut found = self
            .catalog
            .find_scenes(&SceneQuery {
                product: product.to_string(),
                bounds: extent.clone(),
                time: TimeRange::at(reference.center_time),
            })
            .await?;
        match found.len() {
            0 => Err(DrillError::unavailable(format!(
                "no {product} scene found for scene {}",
                reference.id
            ))),
            1 => Ok(found.remove(0)),
            n if strict => Err(DrillError::unavailable(format!(
                "found {n} {product} scenes at the same time as {}",
                reference.id
            ))),
            n => {
                warn!(
                    scene_id = %reference.id,
                    candidates = n,
                    "multiple scenes at the same time, choosing the first"
                );
                Ok(found.remove(0))
            }
        }
    }
}

fn trace_state(scene_id: &str, state: DrillState) {
    debug!(scene_id, ?state, "drill state");
}
