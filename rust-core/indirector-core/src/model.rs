// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The value types an indirection stores and returns.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::request::Options;

/// A value served through an indirection.
///
/// Every model carries its own name (used as the key when an instance is
/// saved without an explicit key) and an optional expiration timestamp used
/// by the cache policy.
pub trait Model: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The instance's own name.
    fn name(&self) -> &str;

    /// When this value stops being fresh, if known.
    fn expiration(&self) -> Option<DateTime<Utc>>;

    /// Replace the expiration timestamp.
    fn set_expiration(&mut self, expiration: DateTime<Utc>);

    /// True when the value carries an expiration that has already passed.
    fn is_expired(&self) -> bool {
        self.expiration().is_some_and(|at| at < Utc::now())
    }

    /// Whether this value satisfies search options.
    ///
    /// Termini that enumerate stored values (the file family) call this to
    /// narrow their results. The default accepts everything.
    fn matches_query(&self, _options: &Options) -> Result<bool> {
        Ok(true)
    }
}
