// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value types served by the bundled termini.

pub mod bucket;
pub mod content;
pub mod facts;
pub mod node;

pub use bucket::BucketFile;
pub use content::{Certificate, FileContent};
pub use facts::{Comparison, FactQuery, Facts};
pub use node::Node;
