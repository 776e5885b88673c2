// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Time-to-live policy for values passing through an indirection.

use chrono::{DateTime, Duration, Utc};

use crate::model::Model;

/// Seconds in the past given to values forced stale by `expire`.
pub const EXPIRE_OFFSET_SECS: i64 = 60;

/// Assigns and checks expiration timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    ttl: u64,
}

impl CachePolicy {
    /// A policy giving values `ttl` seconds of freshness.
    pub fn new(ttl: u64) -> Self {
        Self { ttl }
    }

    /// Seconds of freshness.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Expiration for a value fetched now.
    pub fn expiration(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        Duration::try_seconds(secs)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Expiration for a value forced stale now.
    pub fn expired_at(&self) -> DateTime<Utc> {
        Utc::now() - Duration::seconds(EXPIRE_OFFSET_SECS)
    }

    /// Whether a value is past its expiration.
    pub fn is_stale<M: Model>(&self, value: &M) -> bool {
        value.is_expired()
    }

    /// Give `value` an expiration if it has none. Returns whether it was set.
    pub fn stamp<M: Model>(&self, value: &mut M) -> bool {
        if value.expiration().is_some() {
            return false;
        }
        value.set_expiration(self.expiration());
        true
    }
}
