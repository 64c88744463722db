//! Per-address throttling for routes that don't need a session.
//!
//! Each source address gets a hit counter. Once an address has used up its
//! hits it is refused until its entry has been idle for an hour and a sweep
//! evicts it; the next request then starts a fresh counter.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ApiError;

pub const DEFAULT_MAX_HITS: u32 = 20;
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const ENTRY_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block,
}

#[derive(Debug, Clone, Copy)]
struct IpEntry {
    hits: u32,
    last: Instant,
}

pub struct RateLimiter {
    max_hits: u32,
    entries: Mutex<HashMap<String, IpEntry>>,
}

impl RateLimiter {
    pub fn new(max_hits: u32) -> Self {
        Self {
            max_hits,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, ip: &str) -> Verdict {
        self.check_at(ip, Instant::now())
    }

    /// Counts a hit for `ip` at `now`. Blocked hits are not counted and do
    /// not refresh the entry, so a block ends an hour after the last
    /// admitted request.
    pub fn check_at(&self, ip: &str, now: Instant) -> Verdict {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get_mut(ip) {
            Some(entry) if entry.hits >= self.max_hits => Verdict::Block,
            Some(entry) => {
                entry.hits += 1;
                entry.last = now;
                Verdict::Allow
            }
            None => {
                entries.insert(ip.to_string(), IpEntry { hits: 1, last: now });
                Verdict::Allow
            }
        }
    }

    /// Current hit count for `ip`, if it has an entry.
    pub fn hits(&self, ip: &str) -> Option<u32> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(ip).map(|e| e.hits)
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evicts entries idle for longer than [`ENTRY_TTL`]. Returns how many
    /// were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.last) <= ENTRY_TTL);
        before - entries.len()
    }

    /// Sweeps every `interval` until `shutdown` fires.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; nothing to sweep yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        info!(removed, "Rate limiter: evicted idle addresses");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Rate limiter sweeper shutting down");
                    break;
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HITS)
    }
}

/// Source address of a request: `X-Real-IP`, then `X-Forwarded-For`, then
/// the peer address. The first non-empty one wins.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    ["x-real-ip", "x-forwarded-for"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware refusing requests from addresses that exhausted their hits.
pub async fn limit_by_ip(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);

    if limiter.check(&ip) == Verdict::Block {
        warn!(ip = %ip, "Blocked request from throttled address");
        return Err(ApiError::Blocked);
    }

    Ok(next.run(req).await)
}
