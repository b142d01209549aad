//! Ports: traits and error types at the boundaries of the core.

mod host;
mod hub_error;

pub use host::{FsHostProvider, HostError, HostProvider};
pub use hub_error::McpHubError;
