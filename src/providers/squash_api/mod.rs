//! Client for a running SQUASH REST API.

mod client;
mod types;

pub use client::SquashClient;
pub use types::{Endpoints, JobReceipt};
