//! The Operation Engine (§4.4): drives the three coupled long-running
//! operations (scan, cleanup, file-changes) through their phase sequences,
//! exposes progress, honors cancellation, and recovers from interruption.

mod cleanup;
mod file_changes;
mod scan;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{CatalogError, Result};
use crate::model::{OperationKind, OperationState, TerminalPhase};
use crate::prober::ProbeTools;
use crate::write::WriteHandle;

pub use cleanup::run_cleanup;
pub use file_changes::run_file_changes;
pub use scan::{run_rescan, run_scan, RescanRequest, ScanRequest};

/// Tunables that don't change per-run; everything path/filter-related is
/// re-read from the catalog at the start of each run since exclusions and
/// scan roots are editable at runtime (§4.7 administration).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub scan_roots: Vec<PathBuf>,
    pub max_workers: usize,
    /// Global discovery-phase cap across every scan root combined; `<= 0`
    /// means unlimited (§4.3).
    pub max_files_per_scan: i64,
}

/// Per-variant in-memory mirror of the active operation's hot progress
/// fields (§5). The database row remains authoritative; this exists so the
/// status endpoint never needs a query hotter than once a second.
#[derive(Default)]
struct Mirrors {
    scan: RwLock<Option<OperationState>>,
    cleanup: RwLock<Option<OperationState>>,
    file_changes: RwLock<Option<OperationState>>,
}

impl Mirrors {
    fn slot(&self, kind: OperationKind) -> &RwLock<Option<OperationState>> {
        match kind {
            OperationKind::Scan => &self.scan,
            OperationKind::Cleanup => &self.cleanup,
            OperationKind::FileChanges => &self.file_changes,
        }
    }
}

/// Shared handle every HTTP handler and background task holds. Cheap to
/// clone; internals are `Arc`-wrapped.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    catalog: Catalog,
    writer: WriteHandle,
    tools: Arc<dyn ProbeTools>,
    config: EngineConfig,
    mirrors: Mirrors,
    /// Guards the check-then-create race between two concurrent start
    /// requests for the same variant within this process.
    start_locks: [Mutex<()>; 3],
}

fn lock_index(kind: OperationKind) -> usize {
    match kind {
        OperationKind::Scan => 0,
        OperationKind::Cleanup => 1,
        OperationKind::FileChanges => 2,
    }
}

impl Engine {
    pub fn new(catalog: Catalog, writer: WriteHandle, tools: Arc<dyn ProbeTools>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                writer,
                tools,
                config,
                mirrors: Mirrors::default(),
                start_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Startup recovery (§4.4.5): called once before the HTTP surface
    /// starts accepting operation-control requests.
    #[instrument(skip(self))]
    pub async fn recover_on_startup(&self) -> Result<()> {
        for kind in [OperationKind::Scan, OperationKind::Cleanup, OperationKind::FileChanges] {
            let recovered = self.inner.catalog.recover_interrupted(kind).await?;
            if recovered > 0 {
                warn!(%kind, recovered, "recovered interrupted operation on startup");
            }
        }
        let reset = self.inner.catalog.reset_stuck_scanning().await?;
        if reset > 0 {
            warn!(reset, "reset stuck scanning rows to pending");
        }
        Ok(())
    }

    /// Same reset `reset_stuck_scanning` performs on startup, exposed as an
    /// on-demand admin action (§4.4.5).
    pub async fn recover_stuck_scan(&self) -> Result<u64> {
        self.inner.catalog.reset_stuck_scanning().await
    }

    /// Clears a stuck `is_active=true` row for `kind` without waiting for
    /// the next process restart (§4.7 "reset cleanup/file-changes state").
    pub async fn reset_operation(&self, kind: OperationKind) -> Result<u64> {
        let recovered = self.inner.catalog.recover_interrupted(kind).await?;
        *self.inner.mirrors.slot(kind).write().await = None;
        Ok(recovered)
    }

    async fn begin(&self, kind: OperationKind, phase_number: i32, total_files: i64) -> Result<OperationState> {
        let _guard = self.inner.start_locks[lock_index(kind)].lock().await;
        if self.inner.catalog.active_operation(kind).await?.is_some() {
            return Err(CatalogError::AlreadyActive(kind.to_string()));
        }

        let mut state = OperationState::new(kind);
        state.phase_number = phase_number;
        state.phase = kind.phase_name(phase_number).to_string();
        state.total_files = total_files;
        self.inner.writer.send(crate::write::WriteMessage::CreateOperation(state.clone())).await?;
        *self.inner.mirrors.slot(kind).write().await = Some(state.clone());
        info!(operation_id = %state.operation_id, %kind, "operation started");
        Ok(state)
    }

    async fn publish(&self, state: &OperationState) -> Result<()> {
        *self.inner.mirrors.slot(state.kind).write().await = Some(state.clone());
        self.inner.writer.send(crate::write::WriteMessage::UpdateOperation(state.clone())).await
    }

    async fn finish(&self, mut state: OperationState, terminal: TerminalPhase, error: Option<String>) -> Result<()> {
        state.is_active = false;
        state.phase = terminal.to_string();
        state.end_time = Some(Utc::now());
        state.error_message = error;
        self.publish(&state).await?;
        info!(operation_id = %state.operation_id, kind = %state.kind, phase = %terminal, "operation finished");
        *self.inner.mirrors.slot(state.kind).write().await = None;
        Ok(())
    }

    async fn is_cancelled(&self, kind: OperationKind, operation_id: Uuid) -> Result<bool> {
        if let Some(mirrored) = self.inner.mirrors.slot(kind).read().await.as_ref() {
            if mirrored.operation_id == operation_id {
                return Ok(mirrored.cancel_requested);
            }
        }
        Ok(self
            .inner
            .catalog
            .get_operation(kind, operation_id)
            .await?
            .map(|s| s.cancel_requested)
            .unwrap_or(false))
    }

    /// Requests cancellation of the active operation for `kind`. Returns an
    /// error if none is active (§4.7: cancel returns 400 in that case).
    pub async fn cancel(&self, kind: OperationKind) -> Result<()> {
        let active = self
            .inner
            .catalog
            .active_operation(kind)
            .await?
            .ok_or_else(|| CatalogError::NotActive(kind.to_string()))?;
        self.inner.catalog.request_cancel(kind, active.operation_id).await?;
        if let Some(mirrored) = self.inner.mirrors.slot(kind).write().await.as_mut() {
            if mirrored.operation_id == active.operation_id {
                mirrored.cancel_requested = true;
            }
        }
        Ok(())
    }

    /// Returns the current status for `kind`, preferring the hot mirror and
    /// falling back to the database row when nothing is active in-process
    /// (e.g. right after a restart, before anything has run).
    pub async fn status(&self, kind: OperationKind) -> Result<Option<OperationState>> {
        if let Some(state) = self.inner.mirrors.slot(kind).read().await.clone() {
            return Ok(Some(state));
        }
        self.inner.catalog.active_operation(kind).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn writer(&self) -> &WriteHandle {
        &self.inner.writer
    }

    pub fn tools(&self) -> &Arc<dyn ProbeTools> {
        &self.inner.tools
    }
}

/// Snapshot of the pieces a running phase needs without holding a `&Engine`
/// borrow across every await point.
pub(crate) struct RunContext {
    pub catalog: Catalog,
    pub writer: WriteHandle,
    pub tools: Arc<dyn ProbeTools>,
    pub max_workers: usize,
    pub max_files_per_scan: i64,
}

impl Engine {
    pub(crate) fn run_context(&self) -> RunContext {
        RunContext {
            catalog: self.inner.catalog.clone(),
            writer: self.inner.writer.clone(),
            tools: self.inner.tools.clone(),
            max_workers: self.inner.config.max_workers.max(1),
            max_files_per_scan: self.inner.config.max_files_per_scan,
        }
    }
}

pub(crate) fn merge_patterns(rows: &[crate::model::IgnoredErrorPattern]) -> Vec<String> {
    rows.iter().map(|r| r.pattern.clone()).collect()
}

pub(crate) fn chunked<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size.max(1))
}
