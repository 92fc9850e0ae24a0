//! Proxy Pool - Quality-Ranked Proxy Store
//!
//! Maintains a pool of candidate network proxies, validates their protocol
//! support, anonymity level, and latency against echo endpoints, and exposes
//! a score-ranked PostgreSQL-backed store for protocol- and domain-aware
//! selection.
//!
//! ## Features
//!
//! - HTTP/HTTPS validation with anonymity classification (elite, anonymous, transparent)
//! - Score-ranked selection with per-proxy domain blacklisting
//! - Idempotent ingestion: re-discovering a known proxy never resets its history
//! - Score decay on failure with eviction at zero, reset on successful re-validation
//! - Periodic re-validation over a bounded worker pool

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod validator;

pub use config::Config;
pub use database::Database;
pub use error::{PoolError, Result};
pub use models::{Anonymity, ProbeOutcome, Protocol, ProxyFilter, ProxyRecord};
pub use repository::ProxyRepository;
pub use validator::{Validator, ValidatorConfig};
