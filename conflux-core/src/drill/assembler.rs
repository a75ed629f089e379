//! Overedge scene group resolution.

use std::collections::HashMap;

use chrono::Duration;
use geo::Rect;
use tracing::{debug, warn};

use crate::catalog::{Catalog, SceneQuery, TimeRange};
use crate::error::{DrillError, Result};
use crate::types::Scene;

/// Upper bound on group size before a warning (nine neighbours, sometimes
/// split in two).
pub const MAX_EXPECTED_SCENES: usize = 18;

/// Deduplicated, time-windowed set of scenes around a reference scene.
#[derive(Debug, Clone)]
pub struct SceneGroup {
    pub reference: Scene,
    pub scenes: Vec<Scene>,
    pub bounds: Rect<f64>,
    pub time: TimeRange,
}

pub struct SceneAssembler<'a> {
    catalog: &'a dyn Catalog,
    time_buffer: Duration,
}

impl<'a> SceneAssembler<'a> {
    pub fn new(catalog: &'a dyn Catalog, time_buffer: Duration) -> Self {
        Self {
            catalog,
            time_buffer,
        }
    }

    /// Find `product` scenes within the time buffer of `reference` that
    /// intersect `bounds`, keeping the latest-created scene per region code.
    pub async fn assemble(
        &self,
        reference: &Scene,
        product: &str,
        bounds: Rect<f64>,
    ) -> Result<SceneGroup> {
        let time = TimeRange::around(reference.center_time, self.time_buffer);
        let candidates = self
            .catalog
            .find_scenes(&SceneQuery {
                product: product.to_string(),
                bounds: bounds.to_polygon(),
                time,
            })
            .await?;

        if candidates.is_empty() {
            return Err(DrillError::unavailable(format!(
                "no {product} scenes found around scene {}",
                reference.id
            )));
        }

        let found = candidates.len();
        let scenes = dedup_by_region(candidates);
        debug!(
            reference = %reference.id,
            found,
            kept = scenes.len(),
            "assembled overedge scene group"
        );
        if scenes.len() > MAX_EXPECTED_SCENES {
            warn!(
                reference = %reference.id,
                scenes = scenes.len(),
                "overedge group larger than expected"
            );
        }

        Ok(SceneGroup {
            reference: reference.clone(),
            scenes,
            bounds,
            time,
        })
    }
}

/// Keep one scene per region code: the one created last. Ties keep the
/// scene seen first. Output is ordered by centre time, then id.
pub fn dedup_by_region(scenes: Vec<Scene>) -> Vec<Scene> {
    let mut best: HashMap<String, Scene> = HashMap::new();
    for scene in scenes {
        let key = scene.partition_key().to_string();
        match best.get(&key) {
            Some(current) if current.creation_time >= scene.creation_time => {}
            _ => {
                best.insert(key, scene);
            }
        }
    }
    let mut kept: Vec<Scene> = best.into_values().collect();
    kept.sort_by(|a, b| a.center_time.cmp(&b.center_time).then_with(|| a.id.cmp(&b.id)));
    kept
}
