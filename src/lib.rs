//! Client-side synchronization layer for the channel proxy admin dashboard.
//!
//! The crate is organized into four modules:
//!
//! - [`api`] - Typed HTTP client for the admin API plus the credential holder
//! - [`sync`] - The dashboard synchronization engine (snapshots, merge,
//!   single-flight refresh, auto-refresh loop, ping overlays)
//! - [`config`] - `config.toml` loading
//! - [`util`] - Base URL validation and terminal-safe label rendering

pub mod api;
pub mod config;
pub mod sync;
pub mod util;
