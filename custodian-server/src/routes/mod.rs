use axum::routing::{delete, get, patch, post, put};
use axum::Router;

use crate::handlers::{admin, catalog, operations, reports};
use crate::rate_limit::{self, RateLimiter};
use crate::state::AppState;

/// Builds the full API router: read-only/status routes are open, every
/// write-producing route passes through the per-minute rate limiter
/// (§4.7).
pub fn build(state: AppState, limiter: RateLimiter) -> Router {
    let reads = Router::new()
        .route("/catalog", get(catalog::list))
        .route("/catalog/counts", get(catalog::counts))
        .route("/catalog/{id}", get(catalog::get_one))
        .route("/catalog/{id}/stream", get(catalog::stream))
        .route("/operations/{kind}/status", get(operations::status))
        .route("/admin/exclusions", get(admin::list_exclusions))
        .route("/admin/ignored-patterns", get(admin::list_ignored_patterns))
        .route("/admin/schedules", get(admin::list_schedules))
        .route("/admin/config/{key}", get(admin::get_config))
        .route("/reports", get(reports::list))
        .route("/reports/{report_id}", get(reports::get_one))
        .route("/reports/latest/{scan_type}", get(reports::latest))
        .route("/live", get(catalog::liveness));

    let writes = Router::new()
        .route("/catalog/{id}/mark-good", patch(catalog::mark_good))
        .route("/operations/scan/start", post(operations::start_scan))
        .route("/operations/scan/rescan", post(operations::start_rescan))
        .route("/operations/cleanup/start", post(operations::start_cleanup))
        .route("/operations/file_changes/start", post(operations::start_file_changes))
        .route("/operations/{kind}/cancel", post(operations::cancel))
        .route("/operations/{kind}/reset", post(operations::reset_operation))
        .route("/operations/scan/recover-stuck", post(operations::recover_stuck_scan))
        .route("/admin/exclusions", post(admin::add_exclusion))
        .route("/admin/exclusions/{id}", delete(admin::remove_exclusion))
        .route("/admin/ignored-patterns", post(admin::add_ignored_pattern))
        .route("/admin/ignored-patterns/{id}", delete(admin::remove_ignored_pattern))
        .route("/admin/schedules", post(admin::add_schedule))
        .route("/admin/schedules/{id}", delete(admin::remove_schedule))
        .route("/admin/config/{key}", put(admin::set_config))
        .route("/reports/{report_id}", delete(reports::delete))
        .route("/reports/bundle", post(reports::bundle))
        .route_layer(axum::middleware::from_fn_with_state(limiter, rate_limit::enforce));

    Router::new().nest("/api/v1", reads.merge(writes)).with_state(state)
}
