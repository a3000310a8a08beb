//! Shared harness for the end-to-end scenarios of SPEC_FULL.md §8: builds a
//! real router backed by a temp-file SQLite catalog and a scripted prober,
//! so tests exercise the actual HTTP surface without real media tools.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use custodian_core::engine::{Engine, EngineConfig};
use custodian_core::prober::testing::ScriptedProbeTools;
use custodian_core::prober::ProbeTools;
use custodian_core::{write, Catalog};
use custodian_server::config::Config;
use custodian_server::rate_limit::RateLimiter;
use custodian_server::routes;
use custodian_server::state::AppState;

pub struct TestApp {
    pub router: axum::Router,
    pub catalog: Catalog,
    pub engine: Engine,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    _tmp: tempfile::TempDir,
}

/// Spins up the full stack against a fresh temp-file database and media
/// directory, with `tools` driving every probe call deterministically.
pub async fn spawn_app(tools: Arc<dyn ProbeTools>) -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db_path = tmp.path().join("catalog.db");
    let media_dir = tmp.path().join("media");
    std::fs::create_dir_all(&media_dir).expect("create media dir");

    let catalog = Catalog::open(&db_path).await.expect("open catalog");
    let writer = write::spawn(catalog.clone(), 64);
    let engine = Engine::new(
        catalog.clone(),
        writer,
        tools,
        EngineConfig { scan_roots: vec![media_dir.clone()], max_workers: 4, max_files_per_scan: 0 },
    );
    engine.recover_on_startup().await.expect("recover on startup");

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: db_path.clone(),
        scan_roots: vec![media_dir.clone()],
        max_workers: 4,
        max_files_per_scan: 0,
        timezone: "UTC".to_string(),
        secret_key: "test".to_string(),
        reset_batch_size: 100,
        use_legacy_ui: false,
    };

    let state = AppState { engine: engine.clone(), catalog: catalog.clone(), config: Arc::new(config), started_at: Instant::now() };
    let limiter = RateLimiter::new(10_000);
    let router = routes::build(state, limiter);

    TestApp { router, catalog, engine, db_path, media_dir, _tmp: tmp }
}

/// Reopens the catalog at the same path without touching the Operation
/// Engine, simulating an HTTP process restart after a crash (§8 scenario 6).
pub async fn reopen_catalog(db_path: &Path) -> Catalog {
    Catalog::open(db_path).await.expect("reopen catalog")
}

/// A minimal, spec-exact, uncompressed 24-bit BMP: trivial to construct
/// byte-for-byte correctly since the format has no compression or
/// checksums, unlike PNG/GIF/JPEG.
pub fn minimal_bmp_bytes() -> Vec<u8> {
    let width: i32 = 1;
    let height: i32 = 1;
    let pixel_row = [0x00u8, 0x00, 0xFF, 0x00]; // BGR red pixel + row padding
    let pixel_data_size = pixel_row.len() as u32;
    let header_size = 14u32 + 40u32;
    let file_size = header_size + pixel_data_size;

    let mut bytes = Vec::with_capacity(file_size as usize);

    // BITMAPFILEHEADER
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&header_size.to_le_bytes());

    // BITMAPINFOHEADER
    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&width.to_le_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // planes
    bytes.extend_from_slice(&24u16.to_le_bytes()); // bit count
    bytes.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    bytes.extend_from_slice(&pixel_data_size.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0i32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.extend_from_slice(&pixel_row);
    bytes
}

pub fn write_healthy_image(path: &Path) {
    std::fs::write(path, minimal_bmp_bytes()).expect("write bmp fixture");
}

pub fn write_truncated_image(path: &Path) {
    std::fs::write(path, b"not a real image").expect("write garbage fixture");
}

pub fn write_video_stub(path: &Path, contents: &[u8]) {
    std::fs::write(path, contents).expect("write video fixture");
}
