//! Queue worker scenarios against in-memory queue, catalog and store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use conflux_core::{
    waterbodies, Crs, DrillEngine, DrillError, GeoBox, LoadFailure, MemoryCatalog,
    PolygonFeature, PolygonSet, Resolution, Scene, Table,
};
use conflux_storage::{MemoryArtifactStore, OutputStore, Replicator};
use conflux_worker::{
    MessageQueue, MemoryQueue, QueueWorker, WorkerConfig, WorkerError, WorkerStats,
};
use geo::{coord, Rect};
use ndarray::Array2;
use parking_lot::Mutex;

const CRS: &str = "EPSG:6933";

fn day(i: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 1 + i, 9, 0, 0).unwrap()
}

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
    Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
}

/// Scene `s<i>` covering 0..1000 (or far away when `x0` is large), all wet.
fn add_scene(catalog: &MemoryCatalog, i: u32, x0: f64) {
    let id = format!("s{i}");
    catalog.add_scene(Scene {
        id: id.clone(),
        product: waterbodies::INPUT_PRODUCT.into(),
        region_code: Some(format!("r{i}")),
        crs: Crs::new(CRS),
        extent: rect(x0, 0.0, x0 + 1000.0, 1000.0).to_polygon(),
        center_time: day(i),
        creation_time: day(i),
    });
    let mut bands = BTreeMap::new();
    bands.insert(
        waterbodies::BAND.to_string(),
        Array2::from_elem((100, 100), 128.0),
    );
    let grid = GeoBox::new(Crs::new(CRS), x0, 1000.0, Resolution::new(10.0, -10.0), 100, 100);
    catalog.add_scene_data(id, grid, bands).unwrap();
}

fn polygons() -> Arc<PolygonSet> {
    let features = vec![
        PolygonFeature::new("lake-a", rect(90.0, 90.0, 300.0, 300.0).to_polygon()),
        PolygonFeature::new("lake-b", rect(510.0, 510.0, 690.0, 690.0).to_polygon()),
    ];
    Arc::new(PolygonSet::new(Crs::new(CRS), features).unwrap())
}

struct Harness {
    catalog: Arc<MemoryCatalog>,
    source: Arc<MemoryQueue>,
    dead_letter: Arc<MemoryQueue>,
    store: Arc<MemoryArtifactStore>,
}

impl Harness {
    fn new(scenes: u32) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        for i in 0..scenes {
            add_scene(&catalog, i, 0.0);
        }
        Self {
            catalog,
            source: Arc::new(MemoryQueue::new("waterbodies_scenes")),
            dead_letter: Arc::new(MemoryQueue::new("waterbodies_scenes_deadletter")),
            store: Arc::new(MemoryArtifactStore::new()),
        }
    }

    fn worker(&self, config: WorkerConfig) -> QueueWorker {
        QueueWorker::new(
            DrillEngine::new(self.catalog.clone()),
            waterbodies::plugin().unwrap(),
            polygons(),
            self.source.clone(),
            self.dead_letter.clone(),
            OutputStore::new(self.store.clone(), "s3://bucket/waterbodies"),
            config,
        )
    }
}

fn quick_config() -> WorkerConfig {
    WorkerConfig {
        retry_ceiling: 2,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(2),
        ..WorkerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_recoverable_failures_go_to_dead_letter_queue() {
    let h = Harness::new(5);
    h.catalog
        .fail_load("s1", LoadFailure::RasterIo("s3 read timed out".into()));
    h.catalog
        .fail_load("s3", LoadFailure::RasterIo("truncated tiff".into()));
    for i in 0..5 {
        h.source.push(format!("s{i}"));
    }

    let stats = h.worker(quick_config()).run().await.unwrap();

    assert_eq!(stats.received, 5);
    assert_eq!(stats.written, 3);
    assert_eq!(stats.dead_lettered, 2);
    assert_eq!(stats.deleted, 5);
    assert!(h.source.is_empty());
    let mut dead = h.dead_letter.bodies();
    dead.sort();
    assert_eq!(dead, vec!["s1", "s3"]);
    assert_eq!(h.store.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_message_is_redelivered_after_visibility_timeout() {
    let h = Harness::new(1);
    h.source.push("s0");
    let config = WorkerConfig {
        retry_ceiling: 1,
        ..quick_config()
    };

    // A worker that died mid-message leaves it invisible.
    let taken = h
        .source
        .receive(1, config.visibility_timeout)
        .await
        .unwrap();
    assert_eq!(taken.len(), 1);

    let stats = h.worker(config.clone()).run().await.unwrap();
    assert_eq!(stats.received, 0);
    assert_eq!(h.source.len(), 1);

    tokio::time::advance(config.visibility_timeout + Duration::from_secs(1)).await;
    let stats = h.worker(config).run().await.unwrap();
    assert_eq!(stats.written, 1);
    assert!(h.source.is_empty());
    assert_eq!(h.source.receive_count("s0"), None);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_delivery_is_not_redrilled() {
    let h = Harness::new(1);
    h.source.push("s0");
    let first = h.worker(quick_config()).run().await.unwrap();
    assert_eq!(first.written, 1);

    h.source.push("s0");
    let second = h.worker(quick_config()).run().await.unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.already_existed, 1);
    assert_eq!(second.deleted, 1);
    assert_eq!(h.store.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overwrite_redrills_existing_scene() {
    let h = Harness::new(1);
    h.source.push("s0");
    h.worker(quick_config()).run().await.unwrap();

    h.source.push("s0");
    let config = WorkerConfig {
        overwrite: true,
        ..quick_config()
    };
    let stats = h.worker(config).run().await.unwrap();
    assert_eq!(stats.written, 1);
    assert_eq!(h.store.write_count(), 2);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_recoverable_error_stops_worker() {
    let h = Harness::new(2);
    h.source.push("s0");
    let mut config = quick_config();
    config.max_messages = 10;
    config.drill.partial = false;
    config.drill.overedge = true;

    let err = h.worker(config).run().await.unwrap_err();
    assert!(matches!(err, WorkerError::Drill(DrillError::Configuration(_))));
    // left for redelivery, not dead-lettered
    assert_eq!(h.source.len(), 1);
    assert!(h.dead_letter.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_scene_is_dead_lettered() {
    let h = Harness::new(0);
    h.source.push("no-such-scene");
    let stats = h.worker(quick_config()).run().await.unwrap();
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(h.dead_letter.bodies(), vec!["no-such-scene"]);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_delete_is_fatal() {
    let h = Harness::new(1);
    h.source.push("s0");
    h.source.fail_next_deletes(100);
    let config = WorkerConfig {
        ack_retries: 2,
        ..quick_config()
    };

    let err = h.worker(config).run().await.unwrap_err();
    match err {
        WorkerError::Unacknowledged { queue, ids } => {
            assert_eq!(queue, "waterbodies_scenes");
            assert_eq!(ids.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    // The artifact was written before the failed delete.
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_drill_is_skipped_when_configured() {
    let h = Harness::new(0);
    add_scene(&h.catalog, 7, 50_000.0);
    h.source.push("s7");

    let config = WorkerConfig {
        write_empty: false,
        ..quick_config()
    };
    let stats = h.worker(config).run().await.unwrap();
    assert_eq!(stats.skipped_empty, 1);
    assert!(h.store.is_empty());

    h.source.push("s7");
    let stats = h.worker(quick_config()).run().await.unwrap();
    assert_eq!(stats.written, 1);
    assert_eq!(h.store.len(), 1);
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Replicator for Recorder {
    async fn replicate(&self, table: &Table, path: &str) -> conflux_storage::Result<()> {
        self.seen.lock().push((path.to_string(), table.len()));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_replicator_sees_written_tables() {
    let h = Harness::new(2);
    h.source.push("s0");
    h.source.push("s1");
    let recorder = Arc::new(Recorder::default());

    let stats: WorkerStats = h
        .worker(quick_config())
        .with_replicator(recorder.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(stats.written, 2);
    let seen = recorder.seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|(path, rows)| path.ends_with(".pq") && *rows == 2));
}
