// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Indirector Core
//
// A uniform find / search / save / destroy / head / expire protocol over
// named indirections, each backed by one of several interchangeable storage
// adapters (termini). This crate holds the routing core: the registry, the
// request normalizer, the terminus contract and the cache policy. Concrete
// adapters live in `indirector-termini`.
//
// # Modules
//
// - [`registry`] -- `Indirector`, the table of indirections.
// - [`indirection`] -- The per-resource dispatcher and its cache handling.
// - [`request`] -- `Request`, options, and URI-shaped key parsing.
// - [`terminus`] -- The `Terminus` adapter trait and its capabilities.
// - [`selector`] -- Per-request terminus selection.
// - [`cache`] -- TTL and expiration policy.
// - [`model`] -- The `Model` trait served values implement.
// - [`config`] -- `IndirectorConfig`.
// - [`error`] -- `IndirectorError` and `TerminusError`.
//
// # Example
//
// ```rust,ignore
// let indirector = Indirector::new(IndirectorConfig::default());
// let facts = indirector.create::<Facts>(
//     "facts",
//     IndirectionOptions::new().terminus_class("memory").cache_class("yaml"),
// )?;
// indirector.register::<Facts, Memory<Facts>>("facts")?;
// let found = facts.find("node1.example.com", Options::new()).await?;
// ```

pub mod cache;
pub mod config;
pub mod error;
pub mod indirection;
pub mod model;
pub mod registry;
pub mod request;
pub mod selector;
pub mod terminus;

pub use cache::CachePolicy;
pub use config::{IndirectorConfig, LdapSettings, RunMode, SslSettings};
pub use error::{IndirectorError, Result, TerminusError};
pub use indirection::{Indirection, IndirectionOptions};
pub use model::Model;
pub use registry::Indirector;
pub use request::{Method, OptionValue, Options, Request, RequestKey, RequestSettings};
pub use selector::{ProtocolSelector, TerminusSelector};
pub use terminus::{
    adapter_name, Capabilities, NamedTerminus, Terminus, TerminusContext, TerminusFactory,
    TerminusHandle,
};
