//! Built-in water-body plugin over WOfS feature layers.
//!
//! `transform` keeps clear pixels only: 128 (clear and wet) becomes 1,
//! 0 (clear and dry) becomes 0 and everything else is invalid (NaN).
//! `summarise` reports pixel counts, areas and percentages per class.

use crate::error::Result;
use crate::plugin::{Plugin, PluginContext, PluginError};
use crate::raster::{RasterCube, ZoneValues};
use crate::table::{Record, Value};

pub const PRODUCT_NAME: &str = "waterbodies";
pub const INPUT_PRODUCT: &str = "wofs_ls";
pub const BAND: &str = "water";

const CLEAR_WET: f64 = 128.0;
const CLEAR_DRY: f64 = 0.0;

/// Percentage of invalid pixels above which wet/dry percentages are blanked.
pub const MAX_INVALID_PC: f64 = 10.0;

pub fn plugin() -> Result<Plugin> {
    Plugin::builder()
        .product_name(PRODUCT_NAME)
        .version("0.0.1")
        .input_product(INPUT_PRODUCT, [BAND])
        .output_crs("EPSG:6933")
        .resolution(30.0, -30.0)
        .transform(transform)
        .summarise(summarise)
        .build()
}

fn transform(
    mut cube: RasterCube,
    _ctx: &mut PluginContext,
) -> std::result::Result<RasterCube, PluginError> {
    let water = cube
        .bands
        .get_mut(BAND)
        .ok_or_else(|| PluginError::MissingBand(BAND.to_string()))?;
    water.mapv_inplace(|v| {
        if v == CLEAR_WET {
            1.0
        } else if v == CLEAR_DRY {
            0.0
        } else {
            f64::NAN
        }
    });
    Ok(cube)
}

fn summarise(
    values: &ZoneValues,
    ctx: &mut PluginContext,
) -> std::result::Result<Record, PluginError> {
    let water = values
        .band(BAND)
        .ok_or_else(|| PluginError::MissingBand(BAND.to_string()))?;
    let px_area = ctx.resolution().pixel_area();

    let (mut px_wet, mut px_dry, mut px_invalid) = (0i64, 0i64, 0i64);
    for &v in water {
        if v.is_nan() {
            px_invalid += 1;
        } else if v == 1.0 {
            px_wet += 1;
        } else if v == 0.0 {
            px_dry += 1;
        } else {
            return Err(PluginError::TypeMismatch(format!(
                "unexpected transformed water value {v}"
            )));
        }
    }

    let total = water.len() as f64;
    let pc = |px: i64| px as f64 / total * 100.0;
    let pc_invalid = pc(px_invalid);
    let (pc_wet, pc_dry) = if pc_invalid > MAX_INVALID_PC {
        (f64::NAN, f64::NAN)
    } else {
        (pc(px_wet), pc(px_dry))
    };

    let mut record = Record::new();
    record.insert("pc_wet".into(), Value::Float(pc_wet));
    record.insert("px_wet".into(), Value::Int(px_wet));
    record.insert("area_wet_m2".into(), Value::Float(px_wet as f64 * px_area));
    record.insert("pc_dry".into(), Value::Float(pc_dry));
    record.insert("px_dry".into(), Value::Int(px_dry));
    record.insert("area_dry_m2".into(), Value::Float(px_dry as f64 * px_area));
    record.insert("pc_invalid".into(), Value::Float(pc_invalid));
    record.insert("px_invalid".into(), Value::Int(px_invalid));
    record.insert("area_invalid_m2".into(), Value::Float(px_invalid as f64 * px_area));
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoBox;
    use crate::types::{Crs, Resolution};
    use chrono::Utc;
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn zone(values: Vec<f64>) -> ZoneValues {
        let mut bands = BTreeMap::new();
        bands.insert(BAND.to_string(), values);
        ZoneValues { bands }
    }

    #[test]
    fn test_transform_masks_unclear_pixels() {
        let plugin = plugin().unwrap();
        let gb = GeoBox::new(Crs::new("EPSG:6933"), 0.0, 60.0, Resolution::new(30.0, -30.0), 2, 2);
        let cube = RasterCube::new(gb, Utc::now())
            .with_band(BAND, Array2::from_shape_vec((2, 2), vec![128.0, 0.0, 64.0, 130.0]).unwrap())
            .unwrap();
        let out = plugin.transform(cube).unwrap();
        let water = out.band(BAND).unwrap();
        assert_eq!(water[[0, 0]], 1.0);
        assert_eq!(water[[0, 1]], 0.0);
        assert!(water[[1, 0]].is_nan());
        assert!(water[[1, 1]].is_nan());
    }

    #[test]
    fn test_summarise_counts_and_areas() {
        let mut ctx = PluginContext::new(Resolution::new(30.0, -30.0));
        let record = summarise(&zone(vec![1.0, 1.0, 1.0, 0.0]), &mut ctx).unwrap();
        assert_eq!(record["px_wet"], Value::Int(3));
        assert_eq!(record["pc_wet"], Value::Float(75.0));
        assert_eq!(record["area_wet_m2"], Value::Float(2700.0));
        assert_eq!(record["pc_invalid"], Value::Float(0.0));
    }

    #[test]
    fn test_summarise_blanks_percentages_when_mostly_invalid() {
        let mut ctx = PluginContext::new(Resolution::new(30.0, -30.0));
        let record = summarise(&zone(vec![1.0, f64::NAN, 0.0, 0.0]), &mut ctx).unwrap();
        assert_eq!(record["pc_invalid"], Value::Float(25.0));
        assert!(record["pc_wet"].as_f64().unwrap().is_nan());
        assert!(record["pc_dry"].as_f64().unwrap().is_nan());
        assert_eq!(record["px_invalid"], Value::Int(1));
    }
}
