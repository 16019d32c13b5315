//! Git operations for lbdevtools.

pub mod client;
pub mod protocol;

pub use client::GitClient;
pub use protocol::Protocol;
