//! Per-polygon reduction of a transformed cube through the plugin's
//! `summarise` callback.

use std::collections::BTreeMap;

use tracing::debug;

use super::{LabelRaster, RasterCube};
use crate::error::{DrillError, Result};
use crate::plugin::{Plugin, PluginContext};
use crate::table::Table;

/// Cell values of every band for one polygon, in row-major pixel order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneValues {
    pub bands: BTreeMap<String, Vec<f64>>,
}

impl ZoneValues {
    pub fn band(&self, name: &str) -> Option<&[f64]> {
        self.bands.get(name).map(Vec::as_slice)
    }

    pub fn pixel_count(&self) -> usize {
        self.bands.values().next().map_or(0, Vec::len)
    }
}

pub struct ZonalReducer<'a> {
    plugin: &'a Plugin,
}

impl<'a> ZonalReducer<'a> {
    pub fn new(plugin: &'a Plugin) -> Self {
        Self { plugin }
    }

    /// Summarise each labelled zone. Labels without pixels produce no row.
    pub fn reduce(&self, cube: &RasterCube, labels: &LabelRaster) -> Result<Table> {
        if cube.geobox.shape() != labels.grid.dim() {
            return Err(DrillError::type_mismatch(format!(
                "cube grid {:?} does not match label grid {:?}",
                cube.geobox.shape(),
                labels.grid.dim()
            )));
        }

        let mut zones: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (flat, label) in labels.grid.iter().enumerate() {
            if *label != 0 {
                zones.entry(*label).or_default().push(flat);
            }
        }
        debug!(zones = zones.len(), "reducing zones");

        let flat_bands: Vec<(&String, Vec<f64>)> = cube
            .bands
            .iter()
            .map(|(name, data)| (name, data.iter().copied().collect()))
            .collect();

        let mut records = Vec::with_capacity(zones.len());
        for (label, cells) in zones {
            let id = labels.polygon_id(label).ok_or_else(|| {
                DrillError::type_mismatch(format!("label {label} has no polygon"))
            })?;
            let values = ZoneValues {
                bands: flat_bands
                    .iter()
                    .map(|(name, data)| ((*name).clone(), cells.iter().map(|&i| data[i]).collect()))
                    .collect(),
            };

            let mut ctx = PluginContext::new(self.plugin.resolution());
            let record = self.plugin.summarise_with(&values, &mut ctx)?;
            ctx.into_result()?;
            records.push((id.clone(), record));
        }

        Table::from_records(records)
    }
}
