// SPDX-License-Identifier: MIT

//! Ingress Admission Filter
//!
//! A request-admission layer that inspects every inbound HTTP request
//! before it reaches application logic:
//!
//! - Per-client rate limiting with conservative decay and stale-entry
//!   eviction
//! - Hot-reloadable regex blocklists for request paths and user agents,
//!   swapped atomically so in-flight requests never see a partial update
//! - An admission middleware composing both into an allow/deny verdict,
//!   with a deliberate delay on the rate-limit deny path

pub mod admission;
pub mod blocklist;
pub mod config;
pub mod handlers;
pub mod limiter;

pub use admission::{AdmissionControl, DenyReason, Verdict};
pub use blocklist::{BlocklistError, RuleSet, RuleStore};
pub use config::Config;
pub use limiter::{ClientTable, RateCheck};
