//! End-to-end scenarios (§8): drive the real router/engine against a
//! temp-file catalog and a scripted prober, no real ffmpeg/identify
//! binaries required.

mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use custodian_core::catalog::ListFilter;
use custodian_core::engine::{run_cleanup, run_file_changes, run_rescan, run_scan, EngineConfig, Engine, RescanRequest, ScanRequest};
use custodian_core::model::{NewScanResult, OperationKind, ScanStatus};
use custodian_core::prober::testing::ScriptedProbeTools;
use custodian_core::write;
use tower::ServiceExt;

use support::{reopen_catalog, spawn_app, write_healthy_image, write_truncated_image, write_video_stub};

#[tokio::test]
async fn cold_scan_classifies_every_discovered_file() {
    let app = spawn_app(Arc::new(ScriptedProbeTools::new())).await;

    write_healthy_image(&app.media_dir.join("a.bmp"));
    write_video_stub(&app.media_dir.join("b.mp4"), b"stub video bytes");
    write_truncated_image(&app.media_dir.join("c.png"));

    run_scan(&app.engine, ScanRequest::default()).await.expect("scan run");

    let counts = app.catalog.counts().await.expect("counts");
    assert_eq!(counts.total, 3);
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.corrupted, 1);
    assert_eq!(counts.healthy, 2);

    let corrupted = app
        .catalog
        .get_by_path(&app.media_dir.join("c.png").to_string_lossy())
        .await
        .expect("lookup")
        .expect("row exists");
    assert_eq!(corrupted.scan_status, ScanStatus::Completed);
    assert_eq!(corrupted.is_corrupted, Some(true));

    let reports = app.catalog.list_reports(Some(OperationKind::Scan), 10, 0).await.expect("reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].files_scanned, 3);
    assert_eq!(reports[0].files_corrupted, 1);

    // The HTTP surface reflects the same idle state once the run finishes.
    let response = app
        .router
        .oneshot(Request::builder().uri("/api/v1/operations/scan/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn targeted_rescan_only_touches_requested_paths() {
    let app = spawn_app(Arc::new(ScriptedProbeTools::new())).await;
    let healthy_path = app.media_dir.join("a.bmp");
    let stale_path = app.media_dir.join("c.png");
    write_healthy_image(&healthy_path);
    write_truncated_image(&stale_path);

    run_scan(&app.engine, ScanRequest::default()).await.expect("initial scan");
    let before = app.catalog.get_by_path(&healthy_path.to_string_lossy()).await.unwrap().unwrap();

    run_rescan(&app.engine, RescanRequest { paths: vec![stale_path.clone()], deep_scan: false })
        .await
        .expect("targeted rescan");

    let after_stale = app.catalog.get_by_path(&stale_path.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(after_stale.scan_status, ScanStatus::Completed);
    assert_eq!(after_stale.is_corrupted, Some(true));

    let after_healthy = app.catalog.get_by_path(&healthy_path.to_string_lossy()).await.unwrap().unwrap();
    assert_eq!(after_healthy.scan_date, before.scan_date, "untouched row must keep its original scan timestamp");

    let reports = app.catalog.list_reports(Some(OperationKind::Scan), 10, 0).await.expect("reports");
    assert_eq!(reports.len(), 2, "one report from the initial scan, one from the rescan");
}

/// `FULL_SCAN_BATCH_SIZE` is 1000: cancellation is only checked at the top
/// of phase 3's loop, so a batch in flight always runs to completion. This
/// seeds more than one batch's worth of pending rows so the test observes
/// exactly that: batch one finishes in full, batch two never starts.
#[tokio::test]
async fn cancel_mid_scan_stops_at_the_next_batch_boundary() {
    const SEEDED_ROWS: usize = 1500;
    const BATCH_SIZE: i64 = 1000;

    let tools = Arc::new(ScriptedProbeTools::new().with_delay(Duration::from_millis(5)));
    let app = spawn_app(tools).await;

    for i in 0..SEEDED_ROWS {
        let new = NewScanResult {
            file_path: format!("{}/seed-{i}.mp4", app.media_dir.display()),
            file_size: 1024,
            file_type: "mp4".to_string(),
            creation_date: Utc::now(),
            last_modified: Utc::now(),
            discovered_date: Utc::now(),
        };
        app.catalog.insert_discovered(&new).await.expect("seed pending row");
    }

    let engine = app.engine.clone();
    let scan_task = tokio::spawn(async move { run_scan(&engine, ScanRequest::default()).await });

    loop {
        if let Some(status) = app.engine.status(OperationKind::Scan).await.expect("status") {
            if status.files_processed > 0 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().method("POST").uri("/api/v1/operations/scan/cancel").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    scan_task.await.expect("scan task join").expect("scan run");

    let pending = app
        .catalog
        .list(&ListFilter { status: Some(ScanStatus::Pending), limit: 10, offset: 0, ..Default::default() })
        .await
        .expect("list pending");
    assert!(!pending.is_empty(), "rows past the first batch must remain pending");

    let completed = app
        .catalog
        .list(&ListFilter { status: Some(ScanStatus::Completed), limit: (SEEDED_ROWS + 10) as i64, offset: 0, ..Default::default() })
        .await
        .expect("list completed");
    assert_eq!(completed.len() as i64, BATCH_SIZE, "exactly one full batch must have been processed");

    let reports = app.catalog.list_reports(Some(OperationKind::Scan), 10, 0).await.expect("reports");
    assert!(reports.is_empty(), "a cancelled scan's early return skips report insertion entirely");
}

#[tokio::test]
async fn orphan_cleanup_removes_rows_whose_files_are_gone() {
    let app = spawn_app(Arc::new(ScriptedProbeTools::new())).await;
    let kept = app.media_dir.join("kept.mp4");
    let gone_a = app.media_dir.join("gone-a.mp4");
    let gone_b = app.media_dir.join("gone-b.mp4");
    for path in [&kept, &gone_a, &gone_b] {
        write_video_stub(path, b"stub");
    }

    run_scan(&app.engine, ScanRequest::default()).await.expect("initial scan");
    std::fs::remove_file(&gone_a).unwrap();
    std::fs::remove_file(&gone_b).unwrap();

    run_cleanup(&app.engine).await.expect("cleanup run");

    let counts = app.catalog.counts().await.expect("counts");
    assert_eq!(counts.total, 1);
    assert!(app.catalog.get_by_path(&kept.to_string_lossy()).await.unwrap().is_some());
    assert!(app.catalog.get_by_path(&gone_a.to_string_lossy()).await.unwrap().is_none());

    let reports = app.catalog.list_reports(Some(OperationKind::Cleanup), 10, 0).await.expect("reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].orphaned_records_found, 2);
    assert_eq!(reports[0].orphaned_records_deleted, 2);
}

#[tokio::test]
async fn file_changes_detects_modification_and_rescans_it() {
    let tools = Arc::new(ScriptedProbeTools::new());
    let app = spawn_app(tools.clone()).await;
    let changed = app.media_dir.join("d.mp4");
    write_video_stub(&changed, b"original bytes");

    run_scan(&app.engine, ScanRequest::default()).await.expect("initial scan");
    let before = app.catalog.get_by_path(&changed.to_string_lossy()).await.unwrap().unwrap();

    // Advance mtime past the stored `last_modified` so the detector has
    // something to notice.
    tokio::time::sleep(Duration::from_millis(20)).await;
    write_video_stub(&changed, b"different bytes, definitely not the original");
    let file = std::fs::OpenOptions::new().write(true).open(&changed).unwrap();
    let now = std::time::SystemTime::now();
    let times = std::fs::FileTimes::new().set_modified(now).set_accessed(now);
    file.set_times(times).expect("touch mtime");

    run_file_changes(&app.engine).await.expect("file-changes run");

    let after = app.catalog.get_by_path(&changed.to_string_lossy()).await.unwrap().unwrap();
    assert_ne!(after.file_hash, before.file_hash);
    assert_eq!(after.scan_status, ScanStatus::Completed);

    let reports = app.catalog.list_reports(Some(OperationKind::FileChanges), 10, 0).await.expect("reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].files_changed, 1);
}

#[tokio::test]
async fn crash_recovery_resets_interrupted_operations_and_stuck_rows() {
    let tools = Arc::new(ScriptedProbeTools::new());
    let app = spawn_app(tools.clone()).await;

    // Simulate what a crash mid-operation leaves behind: an
    // `OperationState` row still flagged active, and a `scan_results` row
    // caught mid-probe with a `scanning` status and a partial verdict
    // already written. Nothing in `app` actually drives this; it is
    // written directly so recovery is exercised deterministically rather
    // than racing a real scan against an abort.
    let mut stuck_state = custodian_core::model::OperationState::new(OperationKind::Scan);
    stuck_state.phase_number = 3;
    stuck_state.phase = OperationKind::Scan.phase_name(3).to_string();
    app.catalog.create_operation(&stuck_state).await.expect("create stuck operation row");

    let seed = NewScanResult {
        file_path: app.media_dir.join("stuck.mp4").to_string_lossy().into_owned(),
        file_size: 512,
        file_type: "mp4".to_string(),
        creation_date: Utc::now(),
        last_modified: Utc::now(),
        discovered_date: Utc::now(),
    };
    let stuck_id = app.catalog.insert_discovered(&seed).await.expect("seed stuck row");
    app.catalog
        .apply_scan_result(
            stuck_id,
            &custodian_core::catalog::ScanResultUpdate {
                scan_status: ScanStatus::Scanning,
                is_corrupted: None,
                has_warnings: false,
                warning_details: None,
                corruption_details: Some("partial: probe in flight when the process died".to_string()),
                scan_tool: None,
                scan_duration: None,
                scan_output: None,
                file_hash: None,
                scan_date: Some(Utc::now()),
                deep_scan: false,
            },
        )
        .await
        .expect("mark row scanning");

    // A second healthy file is left untouched (still pending) so the
    // post-recovery scan below has something real to do.
    write_video_stub(&app.media_dir.join("untouched.mp4"), b"stub");

    // Restart: open a fresh engine against the same database file, as a
    // real process restart would, and run startup recovery.
    let db_path = app.db_path.clone();
    let catalog = reopen_catalog(&db_path).await;
    let writer = write::spawn(catalog.clone(), 16);
    let fresh_engine = Engine::new(
        catalog.clone(),
        writer,
        tools,
        EngineConfig { scan_roots: vec![app.media_dir.clone()], max_workers: 2, max_files_per_scan: 0 },
    );
    fresh_engine.recover_on_startup().await.expect("recover on startup");

    let recovered_state = catalog
        .get_operation(OperationKind::Scan, stuck_state.operation_id)
        .await
        .expect("get recovered operation")
        .expect("row still exists");
    assert!(!recovered_state.is_active);
    assert_eq!(recovered_state.phase, "interrupted");

    let recovered_row = catalog.get_by_id(stuck_id).await.expect("get stuck row").expect("row still exists");
    assert_eq!(recovered_row.scan_status, ScanStatus::Pending);
    assert!(recovered_row.scan_date.is_none());
    assert!(recovered_row.corruption_details.is_none());

    // A fresh scan can start cleanly after recovery and clears every
    // pending row, the recovered one included.
    run_scan(&fresh_engine, ScanRequest::default()).await.expect("post-recovery scan");
    let counts = catalog.counts().await.expect("counts");
    assert_eq!(counts.pending, 0);
}

