//! Local Git repository operations.
//!
//! Read-only queries (discovery, ref resolution, ancestry, branch listing,
//! configuration) go through `git2`; everything that mutates a repository or
//! talks to a remote runs the `git` CLI as a subprocess.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use git2::{BranchType, Oid, Repository};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;

/// High-level Git client wrapping a `git2::Repository` and its worktree.
pub struct GitClient {
    repo: Repository,
    workdir: PathBuf,
}

impl GitClient {
    /// Find the repository containing `start` (searching parent directories).
    pub fn discover<P: AsRef<Path>>(start: P) -> Result<Self, GitError> {
        let start = start.as_ref();
        let repo = Repository::discover(start)
            .map_err(|_| GitError::NotAGitRepository(start.display().to_string()))?;
        Self::from_repository(repo, start)
    }

    /// Open the repository whose worktree root is `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .map_err(|_| GitError::NotAGitRepository(path.display().to_string()))?;
        Self::from_repository(repo, path)
    }

    fn from_repository(repo: Repository, origin: &Path) -> Result<Self, GitError> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| GitError::NotAGitRepository(origin.display().to_string()))?;
        let workdir = workdir.canonicalize().unwrap_or_else(|_| workdir.to_path_buf());
        debug!(workdir = %workdir.display(), "using git repository");
        Ok(Self { repo, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    // -- Queries (git2) -------------------------------------------------------

    /// Resolve any commit-ish to a full commit id.
    pub fn resolve_commit(&self, spec: &str) -> Result<String, GitError> {
        let object = self
            .repo
            .revparse_single(spec)
            .map_err(|_| GitError::RefNotFound(spec.to_string()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| GitError::RefNotFound(spec.to_string()))?;
        Ok(commit.id().to_string())
    }

    /// Return the SHA of HEAD.
    pub fn head_sha(&self) -> Result<String, GitError> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let ancestor = Oid::from_str(ancestor)?;
        let descendant = Oid::from_str(descendant)?;
        Ok(self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    /// List all local branch names.
    pub fn list_branches(&self) -> Result<Vec<String>, GitError> {
        let branches = self.repo.branches(Some(BranchType::Local))?;
        let mut names = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Read a string from the repository configuration (local, then global).
    pub fn config_string(&self, key: &str) -> Result<Option<String>, GitError> {
        let config = self.repo.config()?;
        match config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// URL of a configured remote, if it exists.
    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.repo
            .find_remote(name)
            .ok()
            .and_then(|remote| remote.url().map(str::to_string))
    }

    /// Express `path` (relative to `cwd`, or absolute) relative to the
    /// worktree root, with `/` separators and no trailing slash.
    pub fn relative_path(&self, cwd: &Path, path: &str) -> String {
        let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
        let absolute = normalize(&cwd.join(path));
        let relative = match absolute.strip_prefix(&self.workdir) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                warn!(path, "path is outside of the repository");
                PathBuf::from(path)
            }
        };
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if joined.is_empty() {
            ".".to_string()
        } else {
            joined
        }
    }

    // -- Commands (git CLI) ---------------------------------------------------

    /// Run `git <args>` in the worktree and return its stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        run_git(&self.workdir, args, None).await
    }

    /// Run `git <args>` feeding `input` on stdin.
    pub async fn run_with_input(&self, args: &[&str], input: &[u8]) -> Result<String, GitError> {
        run_git(&self.workdir, args, Some(input)).await
    }

    /// Run `git <args>` and report only whether it exited successfully.
    pub async fn succeeds(&self, args: &[&str]) -> Result<bool, GitError> {
        let output = git_command(&self.workdir, args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(map_spawn_error)?;
        Ok(output.success())
    }

    /// Commits in `base..HEAD` touching `path`, oldest first.
    #[instrument(skip(self))]
    pub async fn log_path(&self, base: &str, path: &str) -> Result<Vec<String>, GitError> {
        let range = format!("{}..HEAD", base);
        let output = self
            .run(&["log", "--reverse", "--format=%H", &range, "--", path])
            .await?;
        let commits: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        debug!(count = commits.len(), "collected commits");
        Ok(commits)
    }

    /// Full ref names decorating `commit`.
    pub async fn ref_names(&self, commit: &str) -> Result<Vec<String>, GitError> {
        let output = self
            .run(&["log", "-1", "--decorate=full", "--format=%D", commit])
            .await?;
        Ok(parse_decorations(&output))
    }

    /// Full message of `commit`.
    pub async fn commit_message(&self, commit: &str) -> Result<String, GitError> {
        self.run(&["show", "-s", "--format=%B", commit]).await
    }

    /// Whether the index differs from HEAD.
    pub async fn has_staged_changes(&self) -> Result<bool, GitError> {
        Ok(!self.succeeds(&["diff", "--cached", "--quiet"]).await?)
    }

    /// Clone this repository into `dest` without checkout, borrowing its
    /// object store. The new clone's `origin` is this repository.
    #[instrument(skip(self), fields(dest = %dest.display()))]
    pub async fn clone_reference(&self, dest: &Path) -> Result<GitClient, GitError> {
        let source = self.workdir.to_string_lossy().into_owned();
        let target = dest.to_string_lossy().into_owned();
        run_git(
            &self.workdir,
            &["clone", "--quiet", "--no-checkout", "--reference", &source, &source, &target],
            None,
        )
        .await?;
        info!("scratch clone created");
        GitClient::open(dest)
    }

    /// Push `refspec` to `remote`; a refusal maps to [`GitError::RemoteRejected`].
    #[instrument(skip(self))]
    pub async fn push(&self, remote: &str, refspec: &str) -> Result<(), GitError> {
        info!(remote, refspec, "pushing");
        match self.run(&["push", "--quiet", remote, refspec]).await {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed { stderr, .. }) => {
                warn!(remote, refspec, %stderr, "push rejected");
                let branch = refspec.rsplit(':').next().unwrap_or(refspec).to_string();
                Err(GitError::RemoteRejected {
                    remote: remote.to_string(),
                    branch,
                    detail: stderr.trim().to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Force-delete a local branch.
    #[instrument(skip(self))]
    pub async fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["branch", "--quiet", "-D", name]).await?;
        info!(name, "deleted branch");
        Ok(())
    }
}

/// Run `git <args>` in `dir`, optionally feeding `input` on stdin, and return
/// stdout. A non-zero exit maps to [`GitError::CommandFailed`].
pub async fn run_git(dir: &Path, args: &[&str], input: Option<&[u8]>) -> Result<String, GitError> {
    let mut cmd = git_command(dir, args);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    if input.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    debug!(cmd = ?format!("git {}", args.join(" ")), dir = %dir.display(), "running git command");
    let mut child = cmd.spawn().map_err(map_spawn_error)?;
    if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(data).await?;
        drop(stdin);
    }
    let output = child.wait_with_output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code, %stderr, "git command failed");
        return Err(GitError::CommandFailed {
            command: args.first().copied().unwrap_or_default().to_string(),
            exit_code,
            stderr,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn git_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_MERGE_AUTOEDIT", "no");
    cmd
}

fn map_spawn_error(e: std::io::Error) -> GitError {
    if e.kind() == std::io::ErrorKind::NotFound {
        GitError::BinaryNotFound("git".into())
    } else {
        GitError::IoError(e)
    }
}

/// Split `git log --format=%D` output into full ref names, dropping the
/// `HEAD -> ` prefix and `tag: ` markers.
fn parse_decorations(output: &str) -> Vec<String> {
    output
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let s = s.strip_prefix("HEAD -> ").unwrap_or(s);
            s.strip_prefix("tag: ").unwrap_or(s).to_string()
        })
        .collect()
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
