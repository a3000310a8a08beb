use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::model::{
    Exclusion, ExclusionType, IgnoredErrorPattern, NewScanResult, OperationCounters, OperationKind, OperationState,
    ScanConfiguration, ScanReport, ScanResult, ScanStatus,
};

use super::Catalog;

/// Whitelisted sort columns for the results listing endpoint (§4.1, §5).
/// Never interpolate a user-supplied column name directly into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    FilePath,
    FileSize,
    DiscoveredDate,
    ScanDate,
    ScanStatus,
}

impl SortColumn {
    fn as_sql(self) -> &'static str {
        match self {
            SortColumn::FilePath => "file_path",
            SortColumn::FileSize => "file_size",
            SortColumn::DiscoveredDate => "discovered_date",
            SortColumn::ScanDate => "scan_date",
            SortColumn::ScanStatus => "scan_status",
        }
    }
}

pub fn parse_sort_column(s: &str) -> Result<SortColumn> {
    match s {
        "file_path" => Ok(SortColumn::FilePath),
        "file_size" => Ok(SortColumn::FileSize),
        "discovered_date" => Ok(SortColumn::DiscoveredDate),
        "scan_date" => Ok(SortColumn::ScanDate),
        "scan_status" => Ok(SortColumn::ScanStatus),
        other => Err(CatalogError::InvalidArgument(format!("unsupported sort column: {other}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Filters accepted by the paginated results listing (§4.1, §5).
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<ScanStatus>,
    pub corrupted_only: bool,
    pub warnings_only: bool,
    pub marked_good_only: bool,
    pub text_match: Option<String>,
    pub sort: Option<SortColumn>,
    pub direction: SortDirection,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Desc
    }
}

/// Aggregate counts over the whole catalog, computed in one pass using the
/// same effective-status formulas [`ScanResult`] exposes per row (§4.1).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CatalogCounts {
    pub total: i64,
    pub healthy: i64,
    pub corrupted: i64,
    pub warnings: i64,
    pub marked_good: i64,
    pub pending: i64,
}

impl Catalog {
    #[tracing::instrument(skip(self))]
    pub async fn insert_discovered(&self, new: &NewScanResult) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO scan_results (file_path, file_size, file_type, creation_date, last_modified, discovered_date, scan_status)
            VALUES (?, ?, ?, ?, ?, ?, 'pending')
            ON CONFLICT(file_path) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&new.file_path)
        .bind(new.file_size)
        .bind(&new.file_type)
        .bind(new.creation_date)
        .bind(new.last_modified)
        .bind(new.discovered_date)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.get::<i64, _>("id")),
            None => {
                let existing = self.get_by_path(&new.file_path).await?;
                existing
                    .map(|r| r.id)
                    .ok_or_else(|| CatalogError::Internal("insert conflict but row missing".to_string()))
            }
        }
    }

    pub async fn known_paths(&self) -> Result<std::collections::HashSet<std::path::PathBuf>> {
        let rows = sqlx::query("SELECT file_path FROM scan_results")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| std::path::PathBuf::from(r.get::<String, _>("file_path")))
            .collect())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ScanResult>> {
        let row = sqlx::query_as::<_, ScanResultRow>("SELECT * FROM scan_results WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_by_path(&self, file_path: &str) -> Result<Option<ScanResult>> {
        let row = sqlx::query_as::<_, ScanResultRow>("SELECT * FROM scan_results WHERE file_path = ?")
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ScanResult>> {
        let sort_col = filter.sort.unwrap_or(SortColumn::DiscoveredDate).as_sql();
        let direction = filter.direction.as_sql();

        let mut sql = String::from("SELECT * FROM scan_results WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND scan_status = ?");
        }
        if filter.corrupted_only {
            sql.push_str(" AND is_corrupted = 1 AND marked_as_good = 0 AND has_warnings = 0");
        }
        if filter.warnings_only {
            sql.push_str(" AND has_warnings = 1 AND (is_corrupted IS NULL OR is_corrupted = 0 OR marked_as_good = 1)");
        }
        if filter.marked_good_only {
            sql.push_str(" AND marked_as_good = 1");
        }
        if filter.text_match.is_some() {
            sql.push_str(" AND file_path LIKE ?");
        }
        sql.push_str(&format!(" ORDER BY {sort_col} {direction} LIMIT ? OFFSET ?"));

        let mut query = sqlx::query_as::<_, ScanResultRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        if let Some(text) = &filter.text_match {
            query = query.bind(format!("%{text}%"));
        }
        query = query.bind(filter.limit).bind(filter.offset);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn counts(&self) -> Result<CatalogCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN scan_status = 'pending' THEN 1 ELSE 0 END) AS pending,
                SUM(CASE WHEN marked_as_good = 1 THEN 1 ELSE 0 END) AS marked_good,
                SUM(CASE WHEN marked_as_good = 0 AND is_corrupted = 1 AND has_warnings = 0 THEN 1 ELSE 0 END) AS corrupted,
                SUM(CASE WHEN has_warnings = 1 AND (marked_as_good = 1 OR is_corrupted IS NULL OR is_corrupted = 0) THEN 1 ELSE 0 END) AS warnings,
                SUM(CASE WHEN (marked_as_good = 1 OR is_corrupted IS NULL OR is_corrupted = 0) AND has_warnings = 0 THEN 1 ELSE 0 END) AS healthy
            FROM scan_results
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogCounts {
            total: row.get("total"),
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0),
            marked_good: row.get::<Option<i64>, _>("marked_good").unwrap_or(0),
            corrupted: row.get::<Option<i64>, _>("corrupted").unwrap_or(0),
            warnings: row.get::<Option<i64>, _>("warnings").unwrap_or(0),
            healthy: row.get::<Option<i64>, _>("healthy").unwrap_or(0),
        })
    }

    #[tracing::instrument(skip(self, result))]
    pub async fn apply_scan_result(&self, id: i64, result: &ScanResultUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scan_results SET
                scan_status = ?,
                is_corrupted = ?,
                has_warnings = ?,
                warning_details = ?,
                corruption_details = ?,
                scan_tool = ?,
                scan_duration = ?,
                scan_output = ?,
                file_hash = ?,
                scan_date = ?,
                deep_scan = ?
            WHERE id = ?
            "#,
        )
        .bind(result.scan_status.to_string())
        .bind(result.is_corrupted)
        .bind(result.has_warnings)
        .bind(&result.warning_details)
        .bind(&result.corruption_details)
        .bind(&result.scan_tool)
        .bind(result.scan_duration)
        .bind(&result.scan_output)
        .bind(&result.file_hash)
        .bind(result.scan_date)
        .bind(result.deep_scan)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Applies every update as one transaction, per SPEC_FULL.md §5's
    /// "one batched transaction for `batch_update_scan_results`".
    #[tracing::instrument(skip(self, updates))]
    pub async fn apply_scan_result_batch(&self, updates: &[(i64, ScanResultUpdate)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (id, result) in updates {
            sqlx::query(
                r#"
                UPDATE scan_results SET
                    scan_status = ?,
                    is_corrupted = ?,
                    has_warnings = ?,
                    warning_details = ?,
                    corruption_details = ?,
                    scan_tool = ?,
                    scan_duration = ?,
                    scan_output = ?,
                    file_hash = ?,
                    scan_date = ?,
                    deep_scan = ?
                WHERE id = ?
                "#,
            )
            .bind(result.scan_status.to_string())
            .bind(result.is_corrupted)
            .bind(result.has_warnings)
            .bind(&result.warning_details)
            .bind(&result.corruption_details)
            .bind(&result.scan_tool)
            .bind(result.scan_duration)
            .bind(&result.scan_output)
            .bind(&result.file_hash)
            .bind(result.scan_date)
            .bind(result.deep_scan)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_marked_good(&self, id: i64, marked_as_good: bool) -> Result<()> {
        sqlx::query("UPDATE scan_results SET marked_as_good = ? WHERE id = ?")
            .bind(marked_as_good)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_results(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM scan_results WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    pub async fn delete_missing(&self, ids: &[i64]) -> Result<u64> {
        self.delete_results(ids).await
    }

    // ---- Operation state (scan_state / cleanup_state / file_changes_state) ----

    #[tracing::instrument(skip(self))]
    pub async fn active_operation(&self, kind: OperationKind) -> Result<Option<OperationState>> {
        let table = kind.table_name();
        let sql = format!("SELECT * FROM {table} WHERE is_active = 1 ORDER BY id DESC LIMIT 1");
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| operation_state_from_row(kind, &r)))
    }

    pub async fn get_operation(&self, kind: OperationKind, operation_id: Uuid) -> Result<Option<OperationState>> {
        let table = kind.table_name();
        let sql = format!("SELECT * FROM {table} WHERE operation_id = ?");
        let row = sqlx::query(&sql)
            .bind(operation_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| operation_state_from_row(kind, &r)))
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_operation(&self, state: &OperationState) -> Result<i64> {
        let table = state.kind.table_name();
        let extra_cols = counter_columns(state.kind);
        let sql = format!(
            "INSERT INTO {table} (operation_id, is_active, phase, phase_number, phase_current, phase_total, \
             files_processed, total_files, start_time, {extra}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, {placeholders}) \
             RETURNING id",
            extra = extra_cols.join(", "),
            placeholders = extra_cols.iter().map(|_| "?").collect::<Vec<_>>().join(", "),
        );
        let mut query = sqlx::query(&sql)
            .bind(state.operation_id.to_string())
            .bind(state.is_active)
            .bind(&state.phase)
            .bind(state.phase_number)
            .bind(state.phase_current)
            .bind(state.phase_total)
            .bind(state.files_processed)
            .bind(state.total_files)
            .bind(state.start_time);
        query = bind_counters(query, state.kind, &state.counters);
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.get("id"))
    }

    #[tracing::instrument(skip(self, state))]
    pub async fn update_operation(&self, state: &OperationState) -> Result<()> {
        let table = state.kind.table_name();
        let extra_cols = counter_columns(state.kind);
        let set_extra = extra_cols.iter().map(|c| format!("{c} = ?")).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "UPDATE {table} SET is_active = ?, phase = ?, phase_number = ?, phase_current = ?, phase_total = ?, \
             files_processed = ?, total_files = ?, current_file = ?, progress_message = ?, error_message = ?, \
             cancel_requested = ?, end_time = ?, {set_extra} WHERE operation_id = ?"
        );
        let mut query = sqlx::query(&sql)
            .bind(state.is_active)
            .bind(&state.phase)
            .bind(state.phase_number)
            .bind(state.phase_current)
            .bind(state.phase_total)
            .bind(state.files_processed)
            .bind(state.total_files)
            .bind(&state.current_file)
            .bind(&state.progress_message)
            .bind(&state.error_message)
            .bind(state.cancel_requested)
            .bind(state.end_time);
        query = bind_counters(query, state.kind, &state.counters);
        query = query.bind(state.operation_id.to_string());
        query.execute(&self.pool).await?;
        Ok(())
    }

    pub async fn request_cancel(&self, kind: OperationKind, operation_id: Uuid) -> Result<()> {
        let table = kind.table_name();
        let sql = format!("UPDATE {table} SET cancel_requested = 1 WHERE operation_id = ?");
        sqlx::query(&sql)
            .bind(operation_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Startup recovery (§4.4.5): marks any row still flagged active as
    /// interrupted. Returns the number of rows recovered.
    #[tracing::instrument(skip(self))]
    pub async fn recover_interrupted(&self, kind: OperationKind) -> Result<u64> {
        let table = kind.table_name();
        let sql = format!(
            "UPDATE {table} SET is_active = 0, phase = 'interrupted', end_time = ? WHERE is_active = 1"
        );
        let result = sqlx::query(&sql).bind(Utc::now()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Resets any row stuck mid-scan back to pending (§4.4.5, scan_status
    /// recovery on scan_results rows left in `scanning` by a crash).
    #[tracing::instrument(skip(self))]
    pub async fn reset_stuck_scanning(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scan_results SET scan_status = 'pending', scan_date = NULL, corruption_details = NULL \
             WHERE scan_status = 'scanning'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ---- Reports ----

    pub async fn insert_report(&self, report: &ScanReport) -> Result<i64> {
        let directories = serde_json::to_string(&report.directories)?;
        let row = sqlx::query(
            r#"
            INSERT INTO scan_reports (
                report_id, operation_id, scan_type, started_at, completed_at, duration_seconds, directories,
                files_scanned, files_corrupted, files_with_warnings,
                orphaned_records_found, orphaned_records_deleted,
                files_changed, files_corrupted_new
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(report.report_id.to_string())
        .bind(report.operation_id.to_string())
        .bind(report.scan_type.to_string())
        .bind(report.started_at)
        .bind(report.completed_at)
        .bind(report.duration_seconds)
        .bind(directories)
        .bind(report.files_scanned)
        .bind(report.files_corrupted)
        .bind(report.files_with_warnings)
        .bind(report.orphaned_records_found)
        .bind(report.orphaned_records_deleted)
        .bind(report.files_changed)
        .bind(report.files_corrupted_new)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    // ---- Configuration / exclusions / ignored patterns ----

    pub async fn ignored_error_patterns(&self) -> Result<Vec<IgnoredErrorPattern>> {
        let rows = sqlx::query_as::<_, IgnoredErrorPatternRow>(
            "SELECT * FROM ignored_error_patterns WHERE is_active = 1",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn exclusions(&self) -> Result<Vec<Exclusion>> {
        let rows = sqlx::query_as::<_, ExclusionRow>("SELECT * FROM exclusions")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_config(&self, key: &str) -> Result<Option<ScanConfiguration>> {
        let row = sqlx::query_as::<_, ScanConfigurationRow>("SELECT * FROM scan_configuration WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_configuration (key, value, updated_date) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_date = excluded.updated_date
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Administration: exclusions, ignored patterns, schedules ----

    pub async fn add_exclusion(&self, exclusion_type: ExclusionType, value: &str) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO exclusions (exclusion_type, value, created_date) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(exclusion_type.to_string())
        .bind(value)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    pub async fn remove_exclusion(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM exclusions WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn add_ignored_pattern(&self, pattern: &str, description: Option<&str>) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO ignored_error_patterns (pattern, description, created_date, is_active) \
             VALUES (?, ?, ?, 1) RETURNING id",
        )
        .bind(pattern)
        .bind(description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    pub async fn remove_ignored_pattern(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("UPDATE ignored_error_patterns SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn schedules(&self) -> Result<Vec<crate::model::ScanSchedule>> {
        let rows = sqlx::query_as::<_, ScanScheduleRow>("SELECT * FROM scan_schedules")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn add_schedule(
        &self,
        name: &str,
        time_expression: &str,
        variant: OperationKind,
    ) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO scan_schedules (name, time_expression, variant, is_active, created_date) \
             VALUES (?, ?, ?, 1, ?) RETURNING id",
        )
        .bind(name)
        .bind(time_expression)
        .bind(variant.to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    pub async fn remove_schedule(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scan_schedules WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // ---- Reports ----

    pub async fn list_reports(&self, scan_type: Option<OperationKind>, limit: i64, offset: i64) -> Result<Vec<ScanReport>> {
        let mut sql = String::from("SELECT * FROM scan_reports WHERE 1 = 1");
        if scan_type.is_some() {
            sql.push_str(" AND scan_type = ?");
        }
        sql.push_str(" ORDER BY completed_at DESC LIMIT ? OFFSET ?");
        let mut query = sqlx::query_as::<_, ScanReportRow>(&sql);
        if let Some(kind) = scan_type {
            query = query.bind(kind.to_string());
        }
        query = query.bind(limit).bind(offset);
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_report(&self, report_id: Uuid) -> Result<Option<ScanReport>> {
        let row = sqlx::query_as::<_, ScanReportRow>("SELECT * FROM scan_reports WHERE report_id = ?")
            .bind(report_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn latest_report(&self, scan_type: OperationKind) -> Result<Option<ScanReport>> {
        let row = sqlx::query_as::<_, ScanReportRow>(
            "SELECT * FROM scan_reports WHERE scan_type = ? ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(scan_type.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn delete_report(&self, report_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scan_reports WHERE report_id = ?")
            .bind(report_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Fields the Prober/Operation Engine write back after scanning a file.
#[derive(Debug, Clone)]
pub struct ScanResultUpdate {
    pub scan_status: ScanStatus,
    pub is_corrupted: Option<bool>,
    pub has_warnings: bool,
    pub warning_details: Option<String>,
    pub corruption_details: Option<String>,
    pub scan_tool: Option<String>,
    pub scan_duration: Option<f64>,
    pub scan_output: Option<String>,
    pub file_hash: Option<String>,
    pub scan_date: Option<DateTime<Utc>>,
    pub deep_scan: bool,
}

fn counter_columns(kind: OperationKind) -> Vec<&'static str> {
    match kind {
        OperationKind::Scan => vec!["estimated_total", "discovery_count"],
        OperationKind::Cleanup => vec!["orphaned_found"],
        OperationKind::FileChanges => vec!["changes_found", "corrupted_found", "changed_files_json"],
    }
}

fn bind_counters<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    kind: OperationKind,
    counters: &'q OperationCounters,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match kind {
        OperationKind::Scan => query.bind(counters.estimated_total).bind(counters.discovery_count),
        OperationKind::Cleanup => query.bind(counters.orphaned_found),
        OperationKind::FileChanges => query
            .bind(counters.changes_found)
            .bind(counters.corrupted_found)
            .bind(&counters.changed_files_json),
    }
}

fn operation_state_from_row(kind: OperationKind, row: &sqlx::sqlite::SqliteRow) -> OperationState {
    let mut counters = OperationCounters::default();
    match kind {
        OperationKind::Scan => {
            counters.estimated_total = row.try_get("estimated_total").unwrap_or(0);
            counters.discovery_count = row.try_get("discovery_count").unwrap_or(0);
        }
        OperationKind::Cleanup => {
            counters.orphaned_found = row.try_get("orphaned_found").unwrap_or(0);
        }
        OperationKind::FileChanges => {
            counters.changes_found = row.try_get("changes_found").unwrap_or(0);
            counters.corrupted_found = row.try_get("corrupted_found").unwrap_or(0);
            counters.changed_files_json = row.try_get("changed_files_json").ok();
        }
    }

    OperationState {
        id: row.get("id"),
        operation_id: Uuid::parse_str(&row.get::<String, _>("operation_id")).unwrap_or_else(|_| Uuid::nil()),
        kind,
        is_active: row.get("is_active"),
        phase: row.get("phase"),
        phase_number: row.get("phase_number"),
        phase_current: row.get("phase_current"),
        phase_total: row.get("phase_total"),
        files_processed: row.get("files_processed"),
        total_files: row.get("total_files"),
        current_file: row.try_get("current_file").ok(),
        progress_message: row.try_get("progress_message").ok(),
        error_message: row.try_get("error_message").ok(),
        cancel_requested: row.get("cancel_requested"),
        start_time: row.get("start_time"),
        end_time: row.try_get("end_time").ok(),
        counters,
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScanResultRow {
    id: i64,
    file_path: String,
    file_size: Option<i64>,
    file_type: Option<String>,
    creation_date: Option<DateTime<Utc>>,
    last_modified: Option<DateTime<Utc>>,
    scan_status: String,
    is_corrupted: Option<bool>,
    has_warnings: bool,
    warning_details: Option<String>,
    corruption_details: Option<String>,
    marked_as_good: bool,
    scan_tool: Option<String>,
    scan_duration: Option<f64>,
    scan_output: Option<String>,
    file_hash: Option<String>,
    discovered_date: DateTime<Utc>,
    scan_date: Option<DateTime<Utc>>,
    deep_scan: bool,
    ignored_error_types: Option<String>,
}

impl From<ScanResultRow> for ScanResult {
    fn from(row: ScanResultRow) -> Self {
        ScanResult {
            id: row.id,
            file_path: row.file_path,
            file_size: row.file_size,
            file_type: row.file_type,
            creation_date: row.creation_date,
            last_modified: row.last_modified,
            scan_status: row.scan_status.parse().unwrap_or(ScanStatus::Pending),
            is_corrupted: row.is_corrupted,
            has_warnings: row.has_warnings,
            warning_details: row.warning_details,
            corruption_details: row.corruption_details,
            marked_as_good: row.marked_as_good,
            scan_tool: row.scan_tool,
            scan_duration: row.scan_duration,
            scan_output: row.scan_output,
            file_hash: row.file_hash,
            discovered_date: row.discovered_date,
            scan_date: row.scan_date,
            deep_scan: row.deep_scan,
            ignored_error_types: row.ignored_error_types,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct IgnoredErrorPatternRow {
    id: i64,
    pattern: String,
    description: Option<String>,
    created_date: DateTime<Utc>,
    is_active: bool,
}

impl From<IgnoredErrorPatternRow> for IgnoredErrorPattern {
    fn from(row: IgnoredErrorPatternRow) -> Self {
        IgnoredErrorPattern {
            id: row.id,
            pattern: row.pattern,
            description: row.description,
            created_date: row.created_date,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExclusionRow {
    id: i64,
    exclusion_type: String,
    value: String,
    created_date: DateTime<Utc>,
}

impl From<ExclusionRow> for Exclusion {
    fn from(row: ExclusionRow) -> Self {
        Exclusion {
            id: row.id,
            exclusion_type: if row.exclusion_type == "extension" {
                ExclusionType::Extension
            } else {
                ExclusionType::Path
            },
            value: row.value,
            created_date: row.created_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScanConfigurationRow {
    id: i64,
    key: String,
    value: String,
    description: Option<String>,
    updated_date: DateTime<Utc>,
}

impl From<ScanConfigurationRow> for ScanConfiguration {
    fn from(row: ScanConfigurationRow) -> Self {
        ScanConfiguration {
            id: row.id,
            key: row.key,
            value: row.value,
            description: row.description,
            updated_date: row.updated_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScanScheduleRow {
    id: i64,
    name: String,
    time_expression: String,
    variant: String,
    is_active: bool,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    created_date: DateTime<Utc>,
}

impl From<ScanScheduleRow> for crate::model::ScanSchedule {
    fn from(row: ScanScheduleRow) -> Self {
        crate::model::ScanSchedule {
            id: row.id,
            name: row.name,
            time_expression: row.time_expression,
            variant: parse_operation_kind(&row.variant),
            is_active: row.is_active,
            last_run: row.last_run,
            next_run: row.next_run,
            created_date: row.created_date,
        }
    }
}

fn parse_operation_kind(s: &str) -> OperationKind {
    match s {
        "cleanup" => OperationKind::Cleanup,
        "file_changes" => OperationKind::FileChanges,
        _ => OperationKind::Scan,
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScanReportRow {
    id: i64,
    report_id: String,
    operation_id: String,
    scan_type: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    duration_seconds: f64,
    directories: String,
    files_scanned: i64,
    files_corrupted: i64,
    files_with_warnings: i64,
    orphaned_records_found: i64,
    orphaned_records_deleted: i64,
    files_changed: i64,
    files_corrupted_new: i64,
}

impl TryFrom<ScanReportRow> for ScanReport {
    type Error = CatalogError;

    fn try_from(row: ScanReportRow) -> Result<Self> {
        Ok(ScanReport {
            id: row.id,
            report_id: Uuid::parse_str(&row.report_id)
                .map_err(|e| CatalogError::Internal(format!("invalid report_id: {e}")))?,
            operation_id: Uuid::parse_str(&row.operation_id)
                .map_err(|e| CatalogError::Internal(format!("invalid operation_id: {e}")))?,
            scan_type: parse_operation_kind(&row.scan_type),
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_seconds: row.duration_seconds,
            directories: serde_json::from_str(&row.directories).unwrap_or_default(),
            files_scanned: row.files_scanned,
            files_corrupted: row.files_corrupted,
            files_with_warnings: row.files_with_warnings,
            orphaned_records_found: row.orphaned_records_found,
            orphaned_records_deleted: row.orphaned_records_deleted,
            files_changed: row.files_changed,
            files_corrupted_new: row.files_corrupted_new,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OperationState;

    async fn open_memory() -> (Catalog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let catalog = Catalog::open(&path).await.unwrap();
        (catalog, dir)
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trips() {
        let (catalog, _dir) = open_memory().await;
        let new = NewScanResult {
            file_path: "/media/a.jpg".to_string(),
            file_size: 1024,
            file_type: "jpg".to_string(),
            creation_date: None,
            last_modified: None,
            discovered_date: Utc::now(),
        };
        let id = catalog.insert_discovered(&new).await.unwrap();
        let fetched = catalog.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.file_path, "/media/a.jpg");
        assert_eq!(fetched.scan_status, ScanStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_insert_is_idempotent() {
        let (catalog, _dir) = open_memory().await;
        let new = NewScanResult {
            file_path: "/media/dup.jpg".to_string(),
            file_size: 10,
            file_type: "jpg".to_string(),
            creation_date: None,
            last_modified: None,
            discovered_date: Utc::now(),
        };
        let first = catalog.insert_discovered(&new).await.unwrap();
        let second = catalog.insert_discovered(&new).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn counts_reflect_effective_status() {
        let (catalog, _dir) = open_memory().await;
        let id = catalog
            .insert_discovered(&NewScanResult {
                file_path: "/media/b.jpg".to_string(),
                file_size: 10,
                file_type: "jpg".to_string(),
                creation_date: None,
                last_modified: None,
                discovered_date: Utc::now(),
            })
            .await
            .unwrap();
        catalog
            .apply_scan_result(
                id,
                &ScanResultUpdate {
                    scan_status: ScanStatus::Completed,
                    is_corrupted: Some(true),
                    has_warnings: false,
                    warning_details: None,
                    corruption_details: Some("bad".to_string()),
                    scan_tool: Some("tool".to_string()),
                    scan_duration: Some(1.0),
                    scan_output: None,
                    file_hash: None,
                    scan_date: Some(Utc::now()),
                    deep_scan: false,
                },
            )
            .await
            .unwrap();
        let counts = catalog.counts().await.unwrap();
        assert_eq!(counts.corrupted, 1);

        catalog.set_marked_good(id, true).await.unwrap();
        let counts = catalog.counts().await.unwrap();
        assert_eq!(counts.corrupted, 0);
        assert_eq!(counts.marked_good, 1);
    }

    #[tokio::test]
    async fn operation_lifecycle_create_update_recover() {
        let (catalog, _dir) = open_memory().await;
        let state = OperationState::new(OperationKind::Scan);
        let op_id = state.operation_id;
        catalog.create_operation(&state).await.unwrap();

        let active = catalog.active_operation(OperationKind::Scan).await.unwrap().unwrap();
        assert_eq!(active.operation_id, op_id);

        let recovered = catalog.recover_interrupted(OperationKind::Scan).await.unwrap();
        assert_eq!(recovered, 1);
        assert!(catalog.active_operation(OperationKind::Scan).await.unwrap().is_none());
    }
}
