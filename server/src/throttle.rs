//! Per-principal sliding-window rate limiting.
//!
//! One `DashMap` keyed by `(Scope, Principal)`, living for the process
//! lifetime in `AppState` — no external cache, matching the rest of the
//! stack.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    SyncPush,
    SyncPull,
    ConflictResolution,
}

/// Who the limiter is counting requests against. Authenticated routes
/// always resolve a `User`; `Addr` exists for routes that might someday
/// accept unauthenticated traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    User(Uuid),
    Addr(SocketAddr),
}

struct Window {
    count: u32,
    started_at: Instant,
}

const WINDOW: Duration = Duration::from_secs(60);

/// Rolling one-minute window counters, one per `(scope, principal)`.
pub struct RateLimiter {
    windows: DashMap<(Scope, Principal), Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Record one request and enforce `limit` per rolling minute.
    pub fn check(&self, scope: Scope, principal: Principal, limit: u32) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((scope, principal))
            .or_insert_with(|| Window {
                count: 0,
                started_at: now,
            });

        if now.duration_since(entry.started_at) >= WINDOW {
            entry.count = 0;
            entry.started_at = now;
        }

        entry.count += 1;

        if entry.count > limit {
            let elapsed = now.duration_since(entry.started_at);
            let retry_after_secs = WINDOW.saturating_sub(elapsed).as_secs().max(1);
            return Err(AppError::RateLimited { retry_after_secs });
        }

        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit() {
        let limiter = RateLimiter::new();
        let principal = Principal::User(Uuid::new_v4());
        for _ in 0..5 {
            assert!(limiter.check(Scope::SyncPush, principal.clone(), 5).is_ok());
        }
        assert!(limiter.check(Scope::SyncPush, principal, 5).is_err());
    }

    #[test]
    fn scopes_are_independent() {
        let limiter = RateLimiter::new();
        let principal = Principal::User(Uuid::new_v4());
        for _ in 0..5 {
            limiter.check(Scope::SyncPush, principal.clone(), 5).unwrap();
        }
        assert!(limiter.check(Scope::SyncPull, principal, 60).is_ok());
    }
}
