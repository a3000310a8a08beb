//! Per-minute rate limiting for write-producing endpoints (§4.7). Status
//! endpoints are exempt and never pass through this layer. In-process only:
//! this service runs as a single instance, so there's no need for the
//! distributed (Redis-backed) limiter the sibling media server uses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;

use crate::errors::AppError;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Fixed-window counter per client address, reset every minute.
#[derive(Clone)]
pub struct RateLimiter {
    limit_per_minute: u32,
    buckets: Arc<Mutex<HashMap<SocketAddr, Bucket>>>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self { limit_per_minute, buckets: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn check(&self, addr: SocketAddr) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let bucket = buckets.entry(addr).or_insert_with(|| Bucket { window_start: now, count: 0 });
        if now.duration_since(bucket.window_start) >= WINDOW {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;
        bucket.count <= self.limit_per_minute
    }
}

pub async fn enforce(
    State(limiter): State<RateLimiter>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if limiter.check(addr) {
        Ok(next.run(request).await)
    } else {
        Err(AppError::rate_limited("rate limit exceeded, try again shortly"))
    }
}
