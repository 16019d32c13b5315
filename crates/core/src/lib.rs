//! lbdevtools core library.
//!
//! This crate provides the building blocks of the `git lb-*` commands and of
//! the release notes generator: configuration, the `.git-lb-checkout`
//! bookkeeping, history classification and patch replay for `lb-push`, the
//! GitLab client and the merge request reconciliation behind release notes.

pub mod checkout;
pub mod clone_pkg;
pub mod config;
pub mod errors;
pub mod git;
pub mod gitlab;
pub mod history;
pub mod push;
pub mod release;
pub mod remote_use;
pub mod replay;
pub mod tracking;

// Re-exports for convenience.
pub use config::ToolsConfig;
pub use git::GitClient;
pub use gitlab::GitLabClient;
pub use push::{LbPush, PushOutcome, PushRequest};
pub use tracking::TrackingFile;
