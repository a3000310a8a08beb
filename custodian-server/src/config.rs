//! Layered configuration (§6 / SPEC_FULL.md §10.3): compiled-in defaults,
//! then an optional TOML config file, then environment variables, then CLI
//! flags — each layer overrides only the fields it sets. Exclusion lists and
//! schedules are database-backed and editable at runtime through the
//! administration endpoints instead.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::Parser;
use serde::Deserialize;

/// Command-line overrides. Every flag also has an environment variable
/// fallback so the service can run unattended under a process supervisor.
#[derive(Parser, Debug)]
#[command(name = "custodian-server")]
#[command(about = "Media-integrity catalog and scanning service")]
struct Args {
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    #[arg(long, env = "SERVER_PORT")]
    port: Option<u16>,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<PathBuf>,

    #[arg(long, env = "SCAN_ROOTS")]
    scan_roots: Option<String>,

    #[arg(long, env = "MAX_WORKERS")]
    max_workers: Option<usize>,

    #[arg(long, env = "MAX_FILES_PER_SCAN")]
    max_files_per_scan: Option<i64>,

    #[arg(long, env = "TZ_NAME")]
    timezone: Option<String>,

    #[arg(long, env = "SECRET_KEY")]
    secret_key: Option<String>,

    #[arg(long, env = "RESET_BATCH_SIZE")]
    reset_batch_size: Option<i64>,

    #[arg(long, env = "USE_LEGACY_UI")]
    use_legacy_ui: bool,

    #[arg(long, env = "CONFIG_PATH")]
    config_path: Option<PathBuf>,
}

/// Partial overrides read from a TOML config file. Every field is optional
/// so the file only needs to mention the settings it wants to change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    database_url: Option<PathBuf>,
    scan_roots: Option<Vec<PathBuf>>,
    max_workers: Option<usize>,
    max_files_per_scan: Option<i64>,
    timezone: Option<String>,
    secret_key: Option<String>,
    reset_batch_size: Option<i64>,
    use_legacy_ui: Option<bool>,
}

impl FileConfig {
    fn load_from_env() -> anyhow::Result<Self> {
        if let Ok(path) = env::var("CONFIG_PATH") {
            return Self::load_from_file(Path::new(&path));
        }
        if let Some(path) = Self::find_default_file() {
            return Self::load_from_file(&path);
        }
        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents).map_err(|err| anyhow!("invalid config file {}: {}", path.display(), err))
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &["custodian.toml", "config/custodian.toml"];
        CANDIDATES.iter().map(Path::new).find(|path| path.exists()).map(|path| path.to_path_buf())
    }
}

/// Fully resolved configuration the rest of the service reads from.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: PathBuf,
    pub scan_roots: Vec<PathBuf>,
    pub max_workers: usize,
    pub max_files_per_scan: i64,
    pub timezone: String,
    pub secret_key: String,
    pub reset_batch_size: i64,
    pub use_legacy_ui: bool,
}

impl Config {
    /// Loads `.env` if present, then an optional TOML config file, then CLI
    /// flags (which fall back to environment variables via `clap`'s `env`
    /// attribute), then compiled defaults for anything still unset. Layers
    /// later in this list win. Fails fast if the resolved configuration is
    /// not viable to run the service with.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let args = Args::parse();

        let file = if let Some(path) = &args.config_path {
            FileConfig::load_from_file(path)?
        } else {
            FileConfig::load_from_env()?
        };

        let scan_roots = args
            .scan_roots
            .map(|raw| {
                raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from).collect::<Vec<_>>()
            })
            .filter(|roots| !roots.is_empty())
            .or(file.scan_roots)
            .unwrap_or_default();

        let config = Self {
            host: args.host.or(file.host).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: args.port.or(file.port).unwrap_or(8080),
            database_url: args.database_url.or(file.database_url).unwrap_or_else(|| PathBuf::from("./custodian.db")),
            scan_roots,
            max_workers: args.max_workers.or(file.max_workers).unwrap_or(4),
            max_files_per_scan: args.max_files_per_scan.or(file.max_files_per_scan).unwrap_or(0),
            timezone: args.timezone.or(file.timezone).unwrap_or_else(|| "UTC".to_string()),
            secret_key: args.secret_key.or(file.secret_key).unwrap_or_else(|| "change-me".to_string()),
            reset_batch_size: args.reset_batch_size.or(file.reset_batch_size).unwrap_or(100),
            use_legacy_ui: args.use_legacy_ui || file.use_legacy_ui.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    /// Fail-fast startup checks (SPEC_FULL.md §10.3): a worker count of zero
    /// would deadlock discovery, an empty database URL can't open a catalog,
    /// and scan endpoints are meaningless with no configured root.
    fn validate(&self) -> anyhow::Result<()> {
        if self.max_workers == 0 {
            return Err(anyhow!("max_workers must be at least 1"));
        }
        let database_url = self.database_url.to_string_lossy();
        if database_url.trim().is_empty() {
            return Err(anyhow!("database_url must not be empty"));
        }
        if self.scan_roots.is_empty() {
            tracing::warn!("no scan roots configured; scan endpoints will fail until SCAN_ROOTS is set");
        }
        Ok(())
    }
}
