//! Admin API surface of the channel proxy.
//!
//! All routes live under `<base>/api` and authenticate with the `x-api-key`
//! header. A 401 from any route clears the shared [`Credentials`].

mod client;
mod credentials;
pub mod types;

pub use client::{ApiClient, ApiError};
pub use credentials::Credentials;
pub use types::{
    Channel, ChannelConfig, ChannelStatus, DashboardResponse, Health, PingResult, PingSweepEntry,
};
