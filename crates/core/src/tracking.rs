//! Bookkeeping of directories imported from other projects.
//!
//! `git lb-checkout` records, for every directory it imports, the local
//! commit it was imported on top of (`base`) and the upstream commit it came
//! from (`imported`). The records live in `.git-lb-checkout` at the top of
//! the worktree, in git-config format:
//!
//! ```text
//! [lb-checkout "LHCb.Kernel/LHCbKernel"]
//!     base = 0123...
//!     imported = 4567...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::Config;
use tracing::{debug, warn};

use crate::errors::TrackingError;

/// Name of the bookkeeping file, relative to the worktree root.
pub const TRACKING_FILE: &str = ".git-lb-checkout";

const SECTION: &str = "lb-checkout";

/// A directory under synchronization with a remote project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPath {
    pub remote: String,
    pub path: String,
    /// Local commit at the last sync.
    pub base: String,
    /// Upstream commit holding the last imported state.
    pub imported: String,
}

/// Handle on the `.git-lb-checkout` file of a worktree.
#[derive(Debug, Clone)]
pub struct TrackingFile {
    path: PathBuf,
}

impl TrackingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The tracking file at the root of `workdir`.
    pub fn in_worktree(workdir: &Path) -> Self {
        Self::new(workdir.join(TRACKING_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, sorted by remote then path. A missing file has none.
    pub fn entries(&self) -> Result<Vec<TrackedPath>, TrackingError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no tracking file");
            return Ok(Vec::new());
        }

        let config = Config::open(&self.path)?;
        let mut raw: BTreeMap<(String, String), (Option<String>, Option<String>)> =
            BTreeMap::new();

        let mut entries = config.entries(None)?;
        while let Some(entry) = entries.next() {
            let entry = entry?;
            let (Some(name), Some(value)) = (entry.name(), entry.value()) else {
                continue;
            };
            let Some((remote, path, key)) = split_entry_name(name) else {
                if name.starts_with(SECTION) {
                    warn!(name, "ignoring malformed lb-checkout entry");
                }
                continue;
            };
            let slot = raw.entry((remote, path)).or_default();
            match key {
                "base" => slot.0 = Some(value.to_string()),
                "imported" => slot.1 = Some(value.to_string()),
                _ => {}
            }
        }

        let mut tracked = Vec::with_capacity(raw.len());
        for ((remote, path), (base, imported)) in raw {
            let section = format!("{} \"{}.{}\"", SECTION, remote, path);
            let base = base.ok_or_else(|| TrackingError::MissingKey {
                section: section.clone(),
                key: "base".into(),
            })?;
            let imported = imported.ok_or_else(|| TrackingError::MissingKey {
                section,
                key: "imported".into(),
            })?;
            tracked.push(TrackedPath {
                remote,
                path,
                base,
                imported,
            });
        }
        Ok(tracked)
    }

    /// Create or update the record for `(remote, path)`.
    pub fn record(
        &self,
        remote: &str,
        path: &str,
        base: &str,
        imported: &str,
    ) -> Result<(), TrackingError> {
        let mut config = Config::open(&self.path)?;
        let prefix = format!("{}.{}.{}", SECTION, remote, path);
        config.set_str(&format!("{}.base", prefix), base)?;
        config.set_str(&format!("{}.imported", prefix), imported)?;
        debug!(remote, path, base, imported, "recorded tracked path");
        Ok(())
    }
}

/// Split `lb-checkout.<remote>.<path>.<key>` into its parts. The remote is
/// everything up to the first dot of the subsection.
fn split_entry_name(name: &str) -> Option<(String, String, &str)> {
    let rest = name.strip_prefix(SECTION)?.strip_prefix('.')?;
    let (subsection, key) = rest.rsplit_once('.')?;
    let (remote, path) = subsection.split_once('.')?;
    if remote.is_empty() || path.is_empty() {
        return None;
    }
    Some((remote.to_string(), path.to_string(), key))
}

/// Whether `path` is `dir` itself or lies below it.
pub fn is_subdir(path: &str, dir: &str) -> bool {
    dir == "." || path == dir || path.starts_with(&format!("{}/", dir))
}
