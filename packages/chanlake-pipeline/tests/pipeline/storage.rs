use std::{
	sync::{Arc, atomic::Ordering},
	time::Duration,
};

use time::macros::date;

use chanlake_pipeline::{PgRunLocker, Pipeline, RunState, Stage, enrich, loader};
use chanlake_storage::{db::Db, queries, schema::SchemaPart};
use chanlake_testkit::TestDatabase;

use super::{
	FakeDetector, SpyDetectorLoader, SpyTransformer, capabilities, object, test_config, write_file,
};

const BATCH: &str = r#"[
	{"id": 101, "date": "2024-01-01T08:00:00+00:00", "text": "Paracetamol in stock", "has_image": false, "photo_path": null},
	{"id": 102, "date": "2024-01-01 09:30:00", "text": null, "has_image": true, "photo_path": "images/102.jpg"}
]"#;

async fn test_db(name: &str) -> Option<TestDatabase> {
	let Some(base_dsn) = chanlake_testkit::env_dsn() else {
		eprintln!("Skipping {name}; set CHANLAKE_PG_DSN to run this test.");

		return None;
	};

	Some(TestDatabase::new(&base_dsn).await.expect("Failed to create test database."))
}

async fn connect(test_db: &TestDatabase) -> Db {
	let cfg = chanlake_config::Postgres {
		dsn: test_db.dsn().to_string(),
		pool_max_conns: 1,
		acquire_timeout_ms: 5_000,
	};

	Db::connect(&cfg).await.expect("Failed to connect to Postgres.")
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHANLAKE_PG_DSN to run."]
async fn malformed_batch_does_not_abort_load() {
	let Some(test_db) = test_db("malformed_batch_does_not_abort_load").await else {
		return;
	};
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	write_file(root.path(), "2024-01-01/Chemed/Chemed_2024-01-01.json", BATCH.as_bytes());
	write_file(root.path(), "2024-01-01/lobelia4cosmetics/lobelia4cosmetics.json", BATCH.as_bytes());
	write_file(root.path(), "2024-01-01/tikvahpharma/tikvahpharma.json", b"[{\"id\": 1, \"date\":");

	let cfg = test_config(root.path(), test_db.dsn());
	let summary = loader::run_load(&cfg).await.expect("Load stage must succeed.");

	assert_eq!(summary.files_attempted, 3);
	assert_eq!(summary.files_succeeded, 2);
	assert_eq!(summary.files_failed, 1);
	assert_eq!(summary.messages_inserted, 4);

	let db = connect(&test_db).await;

	assert_eq!(queries::count_raw_messages(&db).await.expect("Failed to count messages."), 4);

	let malformed = root.path().join("2024-01-01/tikvahpharma/tikvahpharma.json");
	let rows = queries::list_messages_by_source(&db, &malformed.display().to_string())
		.await
		.expect("Failed to list messages.");

	assert!(rows.is_empty(), "Malformed file must leave no rows.");

	db.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHANLAKE_PG_DSN to run."]
async fn reloading_the_same_files_skips_existing_rows() {
	let Some(test_db) = test_db("reloading_the_same_files_skips_existing_rows").await else {
		return;
	};
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = write_file(root.path(), "2024-01-01/Chemed/Chemed.json", BATCH.as_bytes());
	let cfg = test_config(root.path(), test_db.dsn());
	let first = loader::run_load(&cfg).await.expect("First load must succeed.");
	let second = loader::run_load(&cfg).await.expect("Second load must succeed.");

	assert_eq!(first.messages_inserted, 2);
	assert_eq!(second.messages_inserted, 0);
	assert_eq!(second.messages_skipped, 2);

	let db = connect(&test_db).await;
	let rows = queries::list_messages_by_source(&db, &path.display().to_string())
		.await
		.expect("Failed to list messages.");

	assert_eq!(rows.len(), 2);
	assert!(rows.iter().all(|row| row.channel == "Chemed"));
	assert!(rows.iter().any(|row| row.id == 102 && row.photo_path.as_deref() == Some("images/102.jpg")));

	db.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHANLAKE_PG_DSN to run."]
async fn failed_image_leaves_no_partial_detections() {
	let Some(test_db) = test_db("failed_image_leaves_no_partial_detections").await else {
		return;
	};
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let good = write_file(root.path(), "2024-01-01/ChannelX/images/555.jpg", b"jpeg");
	let partial = write_file(root.path(), "2024-01-01/ChannelX/images/556.jpg", b"jpeg");

	write_file(root.path(), "2024-01-01/ChannelX/images/557.jpg", b"jpeg");
	write_file(root.path(), "2024-01-01/ChannelX/images/cover.jpg", b"jpeg");

	let detector = FakeDetector {
		results: [
			(
				"555".to_string(),
				Ok(vec![
					object("pill", 1.3, [40.0, 50.0, 10.0, 20.0]),
					object("bottle", 0.42, [-3.0, 0.0, 12.5, 80.0]),
				]),
			),
			(
				"556".to_string(),
				Ok(vec![
					object("syringe", 0.8, [1.0, 1.0, 2.0, 2.0]),
					// Postgres rejects NUL in text, so this insert fails after the first one.
					object("bad\0class", 0.8, [1.0, 1.0, 2.0, 2.0]),
				]),
			),
			("557".to_string(), Err("Model raised on a truncated image.".to_string())),
		]
		.into_iter()
		.collect(),
	};
	let loader = SpyDetectorLoader::new(detector);
	let cfg = test_config(root.path(), test_db.dsn());
	let summary = enrich::run_enrich(&cfg, &loader).await.expect("Enrich stage must succeed.");

	assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
	assert_eq!(summary.images_attempted, 4);
	assert_eq!(summary.images_succeeded, 1);
	assert_eq!(summary.images_failed, 2);
	assert_eq!(summary.images_skipped, 1);
	assert_eq!(summary.detections_stored, 2);

	let db = connect(&test_db).await;
	let stored = queries::list_detections_for_image(&db, &good.display().to_string())
		.await
		.expect("Failed to list detections.");

	assert_eq!(stored.len(), 2);

	for row in &stored {
		assert_eq!(row.message_id, 555);
		assert_eq!(row.channel, "ChannelX");
		assert_eq!(row.model, "fake-detector");
		assert!((0.0..=1.0).contains(&row.confidence));

		let bbox: Vec<f64> = row
			.bbox_xyxy
			.as_array()
			.expect("bbox_xyxy must be an array.")
			.iter()
			.map(|value| value.as_f64().expect("bbox_xyxy elements must be numbers."))
			.collect();

		assert_eq!(bbox.len(), 4);
		assert!(bbox[0] <= bbox[2] && bbox[1] <= bbox[3]);
		assert!(bbox.iter().all(|value| *value >= 0.0));
	}

	let partial_rows = queries::list_detections_for_image(&db, &partial.display().to_string())
		.await
		.expect("Failed to list detections.");

	assert!(partial_rows.is_empty());
	assert_eq!(queries::count_detections(&db).await.expect("Failed to count detections."), 2);

	db.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHANLAKE_PG_DSN to run."]
async fn re_enrichment_replaces_previous_detections() {
	let Some(test_db) = test_db("re_enrichment_replaces_previous_detections").await else {
		return;
	};
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let image = write_file(root.path(), "2024-01-01/ChannelX/images/700.jpg", b"jpeg");
	let loader = SpyDetectorLoader::new(FakeDetector {
		results: [(
			"700".to_string(),
			Ok(vec![
				object("pill", 0.9, [0.0, 0.0, 5.0, 5.0]),
				object("pill", 0.05, [0.0, 0.0, 5.0, 5.0]),
			]),
		)]
		.into_iter()
		.collect(),
	});
	let mut cfg = test_config(root.path(), test_db.dsn());

	cfg.detector.min_confidence = 0.25;

	for _ in 0..2 {
		let summary = enrich::run_enrich(&cfg, &loader).await.expect("Enrich stage must succeed.");

		assert_eq!(summary.detections_stored, 1);
		assert_eq!(summary.detections_dropped, 1);
	}

	let db = connect(&test_db).await;
	let stored = queries::list_detections_for_image(&db, &image.display().to_string())
		.await
		.expect("Failed to list detections.");

	assert_eq!(stored.len(), 1);

	db.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHANLAKE_PG_DSN to run."]
async fn failed_transform_writes_no_detections() {
	let Some(test_db) = test_db("failed_transform_writes_no_detections").await else {
		return;
	};
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	write_file(root.path(), "2024-01-01/ChannelX/Channel_X.json", BATCH.as_bytes());
	write_file(root.path(), "2024-01-01/ChannelX/images/102.jpg", b"jpeg");

	let loader = Arc::new(SpyDetectorLoader::new(FakeDetector {
		results: [("102".to_string(), Ok(vec![object("pill", 0.9, [0.0, 0.0, 1.0, 1.0])]))]
			.into_iter()
			.collect(),
	}));
	let pipeline = Pipeline::new(
		test_config(root.path(), test_db.dsn()),
		capabilities(None, Arc::new(SpyTransformer::with_exit(Some(1))), loader.clone()),
	);
	let report = pipeline.run(date!(2024 - 01 - 01)).await;

	assert_eq!(report.state, RunState::Failed(Stage::Transform));
	assert_eq!(loader.loads.load(Ordering::SeqCst), 0);

	let db = connect(&test_db).await;

	db.ensure_schema(SchemaPart::Detections).await.expect("Failed to ensure detection schema.");

	assert_eq!(queries::count_raw_messages(&db).await.expect("Failed to count messages."), 2);
	assert_eq!(queries::count_detections(&db).await.expect("Failed to count detections."), 0);

	db.close().await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHANLAKE_PG_DSN to run."]
async fn detector_load_failure_fails_enrich() {
	let Some(test_db) = test_db("detector_load_failure_fails_enrich").await else {
		return;
	};
	let root = tempfile::tempdir().expect("Failed to create temp dir.");

	write_file(root.path(), "2024-01-01/ChannelX/images/555.jpg", b"jpeg");

	let mut loader = SpyDetectorLoader::new(FakeDetector::default());

	loader.fail = true;

	let loader = Arc::new(loader);
	let pipeline = Pipeline::new(
		test_config(root.path(), test_db.dsn()),
		capabilities(None, Arc::new(SpyTransformer::succeeding()), loader.clone()),
	);
	let report = pipeline.run_from(date!(2024 - 01 - 01), Stage::Enrich).await;

	assert_eq!(report.state, RunState::Failed(Stage::Enrich));
	assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set CHANLAKE_PG_DSN to run."]
async fn pipelines_sharing_a_database_never_run_the_same_date_together() {
	let Some(test_db) =
		test_db("pipelines_sharing_a_database_never_run_the_same_date_together").await
	else {
		return;
	};
	let root = tempfile::tempdir().expect("Failed to create temp dir.");
	let cfg = test_config(root.path(), test_db.dsn());
	let first_transformer = {
		let mut transformer = SpyTransformer::succeeding();

		transformer.delay = Duration::from_millis(200);

		transformer
	};
	let second_transformer = SpyTransformer {
		calls: first_transformer.calls.clone(),
		exit_code: None,
		delay: first_transformer.delay,
		active: first_transformer.active.clone(),
		max_active: first_transformer.max_active.clone(),
	};
	let calls = first_transformer.calls.clone();
	let max_active = first_transformer.max_active.clone();
	let pipeline = |transformer: SpyTransformer| {
		Pipeline::new(
			cfg.clone(),
			capabilities(
				None,
				Arc::new(transformer),
				Arc::new(SpyDetectorLoader::new(FakeDetector::default())),
			)
			.with_run_locker(Arc::new(PgRunLocker::new(cfg.storage.postgres.clone()))),
		)
	};
	let first = pipeline(first_transformer);
	let second = pipeline(second_transformer);
	let (a, b) = tokio::join!(
		first.run_from(date!(2024 - 01 - 01), Stage::Transform),
		second.run_from(date!(2024 - 01 - 01), Stage::Transform),
	);
	let mut states = [a.state, b.state];

	states.sort_by_key(|state| *state == RunState::Refused);

	assert_eq!(states, [RunState::Complete, RunState::Refused]);
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(max_active.load(Ordering::SeqCst), 1);

	// The winner released its lock, so the date can run again.
	let rerun = second.run_from(date!(2024 - 01 - 01), Stage::Transform).await;

	assert!(rerun.succeeded(), "Unexpected state: {:?}", rerun.state);
	assert_eq!(calls.load(Ordering::SeqCst), 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

