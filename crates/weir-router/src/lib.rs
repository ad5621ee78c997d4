//! Request routing and membership management for a pool of
//! capacity-bounded servers.
//!
//! This crate provides:
//!
//! - [`Router`]: places string-keyed requests on servers through a
//!   consistent hashing ring, retries rejected requests, rebalances on
//!   join, redistributes on leave and reports load metrics.
//! - [`RouterConfig`]: TOML-backed configuration selecting the placement
//!   strategy and admission policy.
//! - [`service`]: a background task that owns a [`Router`] and serialises
//!   every operation through one queue, with [`RouterHandle`] as its API.

mod config;
mod error;
mod router;
pub mod service;

pub use config::{AdmissionSection, HistorySection, RingSection, RouterConfig};
pub use error::RouterError;
pub use router::Router;
pub use service::RouterHandle;
