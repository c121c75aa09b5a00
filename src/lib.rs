//! nodepulse: log-derived health snapshot for blockchain node pairs
//!
//! This crate derives a structured status snapshot of an execution client and
//! a consensus client from their recent log output and from host measurements
//! (memory, disk, load, uptime, block-device I/O, established connections),
//! and serves it as JSON over HTTP. Nothing is persisted between requests
//! beyond a short-lived peer-count cache.
//!
//! ## Modules
//!
//! * `config`: Configuration structures, loading, validation, and defaults.
//!   Supports TOML configuration files with validation via the `validator` crate.
//!
//! * `core`: Core runtime components:
//!   - Log windows and `key=value` extraction
//!   - Time-boxed command probes and log retrieval
//!   - TTL cache and peer count resolver
//!   - Section producers and the snapshot assembler
//!
//! * `logger`: Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.
//!
//! * `server`: `axum` router serving `/api/status` and `/health`.

pub mod config;
pub mod core;
pub mod logger;
pub mod server;
