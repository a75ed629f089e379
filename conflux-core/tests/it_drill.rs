//! End-to-end drills against the in-memory catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use conflux_core::{
    Catalog, Crs, DrillEngine, DrillError, DrillOptions, GeoBox, MemoryCatalog, Plugin,
    PolygonFeature, PolygonId, PolygonSet, Record, Resolution, Scene, Value, FLAG_COLUMNS,
};
use geo::{coord, Area, BooleanOps, MultiPolygon, Rect};
use ndarray::Array2;

const CRS: &str = "EPSG:6933";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 3, 14, 8, 30, 0).unwrap()
}

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
    Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
}

fn scene(id: &str, region: &str, x0: f64) -> Scene {
    Scene {
        id: id.into(),
        product: "wofs_ls".into(),
        region_code: Some(region.into()),
        crs: Crs::new(CRS),
        extent: rect(x0, 0.0, x0 + 1000.0, 1000.0).to_polygon(),
        center_time: t0(),
        creation_time: t0(),
    }
}

fn add_scene(catalog: &MemoryCatalog, scene: Scene, fill: f64) {
    let x0 = scene.extent.exterior().0[0].x.min(scene.extent.exterior().0[2].x);
    let gb = GeoBox::new(Crs::new(CRS), x0, 1000.0, Resolution::new(10.0, -10.0), 100, 100);
    let mut bands = BTreeMap::new();
    bands.insert("water".to_string(), Array2::from_elem((100, 100), fill));
    catalog.add_scene_data(scene.id.clone(), gb, bands).unwrap();
    catalog.add_scene(scene);
}

fn count_plugin() -> Plugin {
    Plugin::builder()
        .product_name("count")
        .version("1.0")
        .input_product("wofs_ls", ["water"])
        .output_crs(CRS)
        .resolution(10.0, -10.0)
        .transform(|cube, _| Ok(cube))
        .summarise(|values, _| {
            let water = values.band("water").unwrap_or_default();
            let mut record = Record::new();
            record.insert("px".into(), Value::Int(water.len() as i64));
            record.insert("total".into(), Value::Float(water.iter().sum()));
            Ok(record)
        })
        .build()
        .unwrap()
}

/// 40 polygons inside the 0..1000 scene, 10 across its east edge, 50 far away.
fn hundred_polygons() -> PolygonSet {
    let mut features = Vec::new();
    for i in 0..8 {
        for j in 0..5 {
            let (x, y) = (50.0 + i as f64 * 110.0, 50.0 + j as f64 * 150.0);
            features.push(PolygonFeature::new(
                format!("in-{i}-{j}").as_str(),
                rect(x, y, x + 50.0, y + 50.0).to_polygon(),
            ));
        }
    }
    for k in 0..10 {
        let y = 50.0 + k as f64 * 90.0;
        features.push(PolygonFeature::new(
            format!("edge-{k}").as_str(),
            rect(970.0, y, 1030.0, y + 40.0).to_polygon(),
        ));
    }
    for k in 0..50 {
        let x = 5000.0 + k as f64 * 100.0;
        features.push(PolygonFeature::new(
            format!("far-{k}").as_str(),
            rect(x, 5000.0, x + 50.0, 5050.0).to_polygon(),
        ));
    }
    PolygonSet::new(Crs::new(CRS), features).unwrap()
}

fn engine_with(catalog: MemoryCatalog) -> DrillEngine {
    DrillEngine::new(Arc::new(catalog))
}

fn has_flag(table: &conflux_core::Table, id: &PolygonId) -> bool {
    FLAG_COLUMNS
        .iter()
        .any(|c| table.get(id, c).and_then(Value::as_bool) == Some(true))
}

#[tokio::test]
async fn test_not_partial_keeps_contained_without_flags() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 0.0), 1.0);
    let engine = engine_with(catalog);
    let options = DrillOptions {
        partial: false,
        ..DrillOptions::default()
    };

    let table = engine
        .drill(&count_plugin(), &hundred_polygons(), "ref", &options)
        .await
        .unwrap();

    assert_eq!(table.len(), 40);
    assert!(table.rows().keys().all(|id| id.as_str().starts_with("in-")));
    for column in FLAG_COLUMNS {
        assert!(table.column_index(column).is_none());
    }
    let meta = table.metadata().unwrap();
    assert_eq!(meta.drill, "count");
    assert_eq!(meta.date, t0());
}

#[tokio::test]
async fn test_partial_flags_every_cut_polygon() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 0.0), 1.0);
    let engine = engine_with(catalog);
    let polygons = hundred_polygons();

    let table = engine
        .drill(&count_plugin(), &polygons, "ref", &DrillOptions::default())
        .await
        .unwrap();

    assert_eq!(table.len(), 50);
    let flagged = table.rows().keys().filter(|id| has_flag(&table, id)).count();
    assert!(flagged >= 10);

    let extent = MultiPolygon::new(vec![rect(0.0, 0.0, 1000.0, 1000.0).to_polygon()]);
    for feature in polygons.features() {
        if table.row(&feature.id).is_none() {
            continue;
        }
        let ratio = feature.geometry.intersection(&extent).unsigned_area()
            / feature.geometry.unsigned_area();
        if ratio > 1e-9 && ratio < 1.0 - 1e-9 {
            assert!(has_flag(&table, &feature.id), "{} not flagged", feature.id);
            assert_eq!(
                table.get(&feature.id, "conflux_e"),
                Some(&Value::Bool(true))
            );
        } else {
            assert!(!has_flag(&table, &feature.id));
        }
    }

    // Only the part inside the scene is drilled.
    let edge = PolygonId::new("edge-0");
    assert_eq!(table.get(&edge, "px"), Some(&Value::Int(12)));
}

#[tokio::test]
async fn test_overedge_mosaics_neighbour() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 0.0), 1.0);
    add_scene(&catalog, scene("east", "r2", 1000.0), 2.0);
    let engine = engine_with(catalog);
    let options = DrillOptions {
        partial: true,
        overedge: true,
        ..DrillOptions::default()
    };

    let table = engine
        .drill(&count_plugin(), &hundred_polygons(), "ref", &options)
        .await
        .unwrap();

    assert_eq!(table.len(), 50);
    assert!(table.column_index("conflux_e").is_none());
    let edge = PolygonId::new("edge-0");
    assert_eq!(table.get(&edge, "px"), Some(&Value::Int(24)));
    assert_eq!(table.get(&edge, "total"), Some(&Value::Float(36.0)));
}

#[tokio::test]
async fn test_overedge_without_partial_is_configuration_error() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 0.0), 1.0);
    let options = DrillOptions {
        partial: false,
        overedge: true,
        ..DrillOptions::default()
    };
    let err = engine_with(catalog)
        .drill(&count_plugin(), &hundred_polygons(), "ref", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, DrillError::Configuration(_)));
}

#[tokio::test]
async fn test_unknown_scene_is_unavailable() {
    let err = engine_with(MemoryCatalog::new())
        .drill(&count_plugin(), &hundred_polygons(), "missing", &DrillOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DrillError::DataUnavailable(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_no_polygons_in_scene_gives_empty_table() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 20_000.0), 1.0);
    let table = engine_with(catalog)
        .drill(&count_plugin(), &hundred_polygons(), "ref", &DrillOptions::default())
        .await
        .unwrap();
    assert!(table.is_empty());
    assert!(table.metadata().is_some());
}

#[tokio::test]
async fn test_transform_warning_fails_drill() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 0.0), 1.0);
    let plugin = Plugin::builder()
        .product_name("noisy")
        .version("1.0")
        .input_product("wofs_ls", ["water"])
        .output_crs(CRS)
        .resolution(10.0, -10.0)
        .transform(|cube, ctx| {
            ctx.warn("overflow encountered in cast");
            Ok(cube)
        })
        .summarise(|_, _| Ok(Record::new()))
        .build()
        .unwrap();

    let err = engine_with(catalog)
        .drill(&plugin, &hundred_polygons(), "ref", &DrillOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DrillError::PluginWarning(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_polygon_crs_must_match_plugin() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 0.0), 1.0);
    let polygons = PolygonSet::new(Crs::new("EPSG:3577"), Vec::new()).unwrap();
    let err = engine_with(catalog)
        .drill(&count_plugin(), &polygons, "ref", &DrillOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DrillError::Configuration(_)));
}

#[tokio::test]
async fn test_catalog_scene_lookup() {
    let catalog = MemoryCatalog::new();
    add_scene(&catalog, scene("ref", "r1", 0.0), 1.0);
    let found = catalog.get_scene("ref").await.unwrap().unwrap();
    assert_eq!(found.region_code.as_deref(), Some("r1"));
}
