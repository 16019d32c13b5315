//! End-to-end tests for the `lb-use` / `lb-checkout` / `lb-push` workflow.
//!
//! These tests build real repositories with the `git` binary:
//! - a bare "upstream" project repository,
//! - a satellite repository importing one of its directories.
//!
//! No network I/O: remotes are local paths. Tests skip gracefully if `git`
//! is not installed.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use lbdevtools_core::checkout::{lb_checkout, CheckoutOutcome, CheckoutRequest};
use lbdevtools_core::errors::{GitError, PushError};
use lbdevtools_core::git::protocol::Protocol;
use lbdevtools_core::git::GitClient;
use lbdevtools_core::push::{LbPush, PushOutcome, PushRequest, PushState};
use lbdevtools_core::remote_use::lb_use;
use lbdevtools_core::tracking::TrackingFile;

// ===========================================================================
// Helpers
// ===========================================================================

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run git in `dir` with a fixed identity and return trimmed stdout.
fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=master",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn git_ok(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Bare upstream repository with `Kernel/Pkg`, `Event/Other` and `Phys/Third`,
/// tagged `v1r0`.
fn setup_upstream(root: &Path) -> std::path::PathBuf {
    let work = root.join("upstream_work");
    let bare = root.join("LHCb.git");
    std::fs::create_dir_all(&work).unwrap();
    git(&work, &["init", "-q"]);
    write_file(&work, "Kernel/Pkg/file.txt", "v1\n");
    write_file(&work, "Event/Other/data.txt", "upstream only\n");
    write_file(&work, "Phys/Third/notes.txt", "never imported\n");
    git(&work, &["add", "-A"]);
    git(&work, &["commit", "-q", "-m", "Initial upstream"]);
    git(&work, &["tag", "v1r0"]);
    git(root, &["clone", "-q", "--bare", work.to_str().unwrap(), bare.to_str().unwrap()]);
    bare
}

/// Satellite repository with one commit and a local identity.
fn setup_satellite(root: &Path) -> std::path::PathBuf {
    let sat = root.join("satellite");
    std::fs::create_dir_all(&sat).unwrap();
    git(&sat, &["init", "-q"]);
    git(&sat, &["config", "user.name", "Test User"]);
    git(&sat, &["config", "user.email", "test@example.com"]);
    git(&sat, &["config", "commit.gpgsign", "false"]);
    write_file(&sat, "README.md", "satellite\n");
    write_file(&sat, "CMakeLists.txt", "project(Satellite)\n");
    git(&sat, &["add", "-A"]);
    git(&sat, &["commit", "-q", "-m", "Initial satellite"]);
    sat
}

/// Upstream + satellite with `LHCb` registered as a remote.
async fn setup_workspace() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let bare = setup_upstream(tmp.path());
    let sat = setup_satellite(tmp.path());

    let client = GitClient::open(&sat).unwrap();
    let summary = lb_use(&client, "LHCb", Some(bare.to_str().unwrap()), Protocol::Https)
        .await
        .expect("lb-use failed");
    assert_eq!(summary.branches, vec!["LHCb/master"]);
    assert_eq!(summary.tags, vec!["LHCb/v1r0"]);

    (tmp, bare, sat)
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_lb_use_namespaces_tags() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, bare, sat) = setup_workspace().await;

    assert_eq!(git(&sat, &["config", "remote.LHCb.tagopt"]), "--no-tags");
    assert!(git_ok(&sat, &["rev-parse", "--verify", "refs/tags/LHCb/v1r0"]));
    assert!(!git_ok(&sat, &["rev-parse", "--verify", "refs/tags/v1r0"]));

    // Redefining the remote replaces it.
    let client = GitClient::open(&sat).unwrap();
    lb_use(&client, "LHCb", Some(bare.to_str().unwrap()), Protocol::Https)
        .await
        .unwrap();
    let fetch = git(&sat, &["config", "--get-all", "remote.LHCb.fetch"]);
    assert_eq!(fetch.lines().count(), 2);
}

#[tokio::test]
async fn test_lb_checkout_records_tracked_path() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();
    let base = client.head_sha().unwrap();
    let upstream_head = git(&bare, &["rev-parse", "master"]);

    let outcome = lb_checkout(
        &client,
        &CheckoutRequest {
            commitish: "LHCb/master".into(),
            path: "Kernel/Pkg/".into(),
            commit: true,
        },
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        CheckoutOutcome::Imported {
            remote: "LHCb".into(),
            imported: upstream_head.clone(),
            committed: true,
        }
    );

    let tracked = TrackingFile::in_worktree(&sat).entries().unwrap();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].remote, "LHCb");
    assert_eq!(tracked[0].path, "Kernel/Pkg");
    assert_eq!(tracked[0].base, base);
    assert_eq!(tracked[0].imported, upstream_head);

    assert_eq!(
        git(&sat, &["log", "-1", "--format=%s"]),
        "added Kernel/Pkg from LHCb (LHCb/master)"
    );
    assert_eq!(
        std::fs::read_to_string(sat.join("Kernel/Pkg/file.txt")).unwrap(),
        "v1\n"
    );

    // Checking out the same upstream state through its namespaced tag only
    // moves the recorded base.
    let again = lb_checkout(
        &client,
        &CheckoutRequest {
            commitish: "LHCb/v1r0".into(),
            path: "Kernel/Pkg".into(),
            commit: true,
        },
    )
    .await;
    assert!(matches!(
        again,
        Ok(CheckoutOutcome::Imported { committed: true, .. })
    ));
    assert_eq!(
        std::fs::read_to_string(sat.join("Kernel/Pkg/file.txt")).unwrap(),
        "v1\n"
    );
}

#[tokio::test]
async fn test_lb_push_replays_local_changes() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();

    lb_checkout(
        &client,
        &CheckoutRequest {
            commitish: "LHCb/master".into(),
            path: "Kernel/Pkg".into(),
            commit: true,
        },
    )
    .await
    .unwrap();

    // A local change inside the tracked path, and one outside of it.
    write_file(&sat, "Kernel/Pkg/file.txt", "v2\n");
    write_file(&sat, "README.md", "changed satellite\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Fix the package"]);
    let fix_commit = git(&sat, &["rev-parse", "HEAD"]);

    let request = PushRequest {
        remote: "LHCb".into(),
        branch: "fix-pkg".into(),
        paths: vec![],
        keep_temp_branch: false,
    };
    let mut push = LbPush::new(&client);
    let outcome = push.run(&request).await.expect("lb-push failed");
    assert_eq!(push.state(), PushState::Done);

    let pushed_head = git(&bare, &["rev-parse", "fix-pkg"]);
    match &outcome {
        PushOutcome::Pushed {
            base,
            imported,
            paths,
            ..
        } => {
            assert_eq!(base, &fix_commit);
            assert_eq!(imported, &pushed_head);
            assert_eq!(paths, &vec!["Kernel/Pkg".to_string()]);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Round-trip: the pushed tree of the path equals the local one.
    assert_eq!(
        git(&bare, &["rev-parse", "fix-pkg:Kernel/Pkg"]),
        git(&sat, &["rev-parse", "HEAD:Kernel/Pkg"])
    );
    assert_eq!(git(&bare, &["show", "fix-pkg:Kernel/Pkg/file.txt"]), "v2");
    // Non-interference: upstream content outside the path is untouched and
    // satellite-only files never leak upstream.
    assert_eq!(
        git(&bare, &["rev-parse", "fix-pkg:Event/Other"]),
        git(&bare, &["rev-parse", "master:Event/Other"])
    );
    assert!(!git_ok(&bare, &["cat-file", "-e", "fix-pkg:README.md"]));
    // The patch kept the original message.
    assert_eq!(git(&bare, &["log", "-1", "--format=%s", "fix-pkg"]), "Fix the package");

    // Tracking information updated and committed on its own.
    let tracked = TrackingFile::in_worktree(&sat).entries().unwrap();
    assert_eq!(tracked[0].base, fix_commit);
    assert_eq!(tracked[0].imported, pushed_head);
    assert_eq!(
        git(&sat, &["log", "-1", "--format=%s"]),
        "updated .git-lb-checkout after push of LHCb/fix-pkg"
    );
    assert_eq!(
        git(&sat, &["show", "--name-only", "--format=", "HEAD"]),
        ".git-lb-checkout"
    );
    // Temporary branch removed.
    assert!(!client.list_branches().unwrap().contains(&"fix-pkg".to_string()));

    // Idempotence: nothing new to push, no branch created.
    let mut again = LbPush::new(&client);
    let outcome = again.run(&request).await.unwrap();
    assert_eq!(outcome, PushOutcome::UpToDate);
    assert_eq!(again.state(), PushState::Done);
    assert!(!client.list_branches().unwrap().contains(&"fix-pkg".to_string()));
}

#[tokio::test]
async fn test_lb_push_introducing_commit_overwrites_imported_content() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();

    // Import without committing, change the content, commit both at once:
    // that single commit introduces the path with content "foo".
    lb_checkout(
        &client,
        &CheckoutRequest {
            commitish: "LHCb/master".into(),
            path: "Kernel/Pkg".into(),
            commit: false,
        },
    )
    .await
    .unwrap();
    write_file(&sat, "Kernel/Pkg/file.txt", "foo\n");
    git(&sat, &["add", "-A"]);
    git(&sat, &["commit", "-q", "-m", "Import and adapt Kernel/Pkg"]);
    let introducing = git(&sat, &["rev-parse", "HEAD"]);
    let upstream_head = git(&bare, &["rev-parse", "master"]);

    // An existing local branch with the requested name forces a -tmp suffix.
    git(&sat, &["branch", "adapt"]);

    let mut push = LbPush::new(&client);
    let outcome = push
        .run(&PushRequest {
            remote: "LHCb".into(),
            branch: "adapt".into(),
            paths: vec!["Kernel".into()],
            keep_temp_branch: true,
        })
        .await
        .unwrap();

    let PushOutcome::Pushed {
        temp_branch,
        base,
        imported,
        ..
    } = outcome
    else {
        panic!("expected a push");
    };
    assert_eq!(temp_branch, "adapt-tmp1");
    assert_eq!(base, introducing);
    assert_eq!(imported, git(&bare, &["rev-parse", "adapt"]));
    assert_eq!(git(&bare, &["show", "adapt:Kernel/Pkg/file.txt"]), "foo");
    // The synthetic branch grows from the imported upstream commit.
    assert!(git_ok(&bare, &["merge-base", "--is-ancestor", &upstream_head, "adapt"]));
    // Kept on request.
    assert!(client.list_branches().unwrap().contains(&"adapt-tmp1".to_string()));
}

#[tokio::test]
async fn test_lb_push_unknown_remote() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, _bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();

    let mut push = LbPush::new(&client);
    let result = push
        .run(&PushRequest {
            remote: "Gaudi".into(),
            branch: "x".into(),
            paths: vec![],
            keep_temp_branch: false,
        })
        .await;
    assert!(matches!(
        result,
        Err(PushError::NoTrackedPaths { .. })
    ));
    assert_eq!(push.state(), PushState::Failed);
}

// ===========================================================================
// Local merges and failure paths
// ===========================================================================

async fn import(client: &GitClient, path: &str) {
    lb_checkout(
        client,
        &CheckoutRequest {
            commitish: "LHCb/master".into(),
            path: path.into(),
            commit: true,
        },
    )
    .await
    .expect("lb-checkout failed");
}

fn request(branch: &str, keep_temp_branch: bool) -> PushRequest {
    PushRequest {
        remote: "LHCb".into(),
        branch: branch.into(),
        paths: vec![],
        keep_temp_branch,
    }
}

#[tokio::test]
async fn test_lb_push_skips_local_merge_commits() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();
    import(&client, "Kernel/Pkg").await;

    git(&sat, &["checkout", "-q", "-b", "side"]);
    write_file(&sat, "Kernel/Pkg/b.txt", "from side\n");
    git(&sat, &["add", "-A"]);
    git(&sat, &["commit", "-q", "-m", "Add b.txt on a side branch"]);
    git(&sat, &["checkout", "-q", "master"]);
    write_file(&sat, "Kernel/Pkg/file.txt", "v2\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Change file.txt on master"]);
    git(&sat, &["merge", "-q", "--no-ff", "-m", "Merge branch 'side'", "side"]);

    let mut push = LbPush::new(&client);
    let outcome = push.run(&request("with-merge", false)).await.unwrap();
    assert!(matches!(outcome, PushOutcome::Pushed { .. }));
    assert_eq!(push.state(), PushState::Done);

    assert_eq!(
        git(&bare, &["rev-parse", "with-merge:Kernel/Pkg"]),
        git(&sat, &["rev-parse", "HEAD:Kernel/Pkg"])
    );
    // Only the two real changes are replayed, the merge itself is not.
    assert_eq!(git(&bare, &["rev-list", "--count", "master..with-merge"]), "2");

    let outcome = LbPush::new(&client)
        .run(&request("with-merge", false))
        .await
        .unwrap();
    assert_eq!(outcome, PushOutcome::UpToDate);
}

#[tokio::test]
async fn test_lb_push_patch_conflict_keeps_scratch_clone_on_request() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();
    import(&client, "Kernel/Pkg").await;

    // Two diverging edits of the same line, reconciled by a local merge:
    // whichever comes second no longer applies on its own.
    git(&sat, &["checkout", "-q", "-b", "side"]);
    write_file(&sat, "Kernel/Pkg/file.txt", "side\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Side edit"]);
    git(&sat, &["checkout", "-q", "master"]);
    write_file(&sat, "Kernel/Pkg/file.txt", "master\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Master edit"]);
    assert!(!git_ok(&sat, &["merge", "-q", "side"]));
    write_file(&sat, "Kernel/Pkg/file.txt", "resolved\n");
    git(&sat, &["add", "Kernel/Pkg/file.txt"]);
    git(&sat, &["commit", "-q", "--no-edit"]);

    let tracked_before = TrackingFile::in_worktree(&sat).entries().unwrap();
    let head_before = client.head_sha().unwrap();

    let mut push = LbPush::new(&client);
    let result = push.run(&request("conflicting", false)).await;
    assert!(matches!(
        result,
        Err(PushError::GitError(GitError::PatchConflict { .. }))
    ));
    assert_eq!(push.state(), PushState::Failed);
    assert!(push.kept_scratch_clone().is_none());

    let mut kept = LbPush::new(&client);
    let result = kept.run(&request("conflicting", true)).await;
    assert!(matches!(
        result,
        Err(PushError::GitError(GitError::PatchConflict { .. }))
    ));
    let scratch = kept.kept_scratch_clone().expect("scratch clone kept").to_path_buf();
    assert!(scratch.join("LHCb").join(".git").exists());
    std::fs::remove_dir_all(&scratch).unwrap();

    // Nothing changed anywhere.
    assert_eq!(TrackingFile::in_worktree(&sat).entries().unwrap(), tracked_before);
    assert_eq!(client.head_sha().unwrap(), head_before);
    assert!(!client.list_branches().unwrap().contains(&"conflicting".to_string()));
    assert!(!git_ok(&bare, &["rev-parse", "--verify", "refs/heads/conflicting"]));
}

#[tokio::test]
async fn test_lb_push_remote_rejected() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (tmp, bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();
    import(&client, "Kernel/Pkg").await;
    write_file(&sat, "Kernel/Pkg/file.txt", "v2\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Fix the package"]);

    // Somebody else already owns branch `taken` upstream.
    let work = tmp.path().join("upstream_work");
    write_file(&work, "Kernel/Pkg/file.txt", "theirs\n");
    git(&work, &["commit", "-q", "-a", "-m", "Their change"]);
    git(&work, &["push", "-q", bare.to_str().unwrap(), "HEAD:refs/heads/taken"]);
    let theirs = git(&bare, &["rev-parse", "taken"]);

    let tracked_before = TrackingFile::in_worktree(&sat).entries().unwrap();
    let head_before = client.head_sha().unwrap();

    let mut push = LbPush::new(&client);
    let result = push.run(&request("taken", false)).await;
    assert!(matches!(
        result,
        Err(PushError::GitError(GitError::RemoteRejected { ref branch, .. })) if branch == "taken"
    ));
    assert_eq!(push.state(), PushState::Failed);
    assert!(!client.list_branches().unwrap().contains(&"taken".to_string()));

    let mut kept = LbPush::new(&client);
    let result = kept.run(&request("taken", true)).await;
    assert!(matches!(
        result,
        Err(PushError::GitError(GitError::RemoteRejected { .. }))
    ));
    assert_eq!(kept.state(), PushState::Failed);
    assert!(client.list_branches().unwrap().contains(&"taken".to_string()));

    assert_eq!(TrackingFile::in_worktree(&sat).entries().unwrap(), tracked_before);
    assert_eq!(client.head_sha().unwrap(), head_before);
    assert_eq!(git(&bare, &["rev-parse", "taken"]), theirs);
}

#[tokio::test]
async fn test_lb_push_unknown_base() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, _bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();
    import(&client, "Kernel/Pkg").await;

    let tracking = TrackingFile::in_worktree(&sat);
    let imported = tracking.entries().unwrap()[0].imported.clone();
    tracking
        .record("LHCb", "Kernel/Pkg", &"0".repeat(40), &imported)
        .unwrap();

    let mut push = LbPush::new(&client);
    let result = push.run(&request("stale", false)).await;
    assert!(matches!(
        result,
        Err(PushError::GitError(GitError::UnknownBase { ref path, .. })) if path == "Kernel/Pkg"
    ));
    assert_eq!(push.state(), PushState::Failed);
}

#[tokio::test]
async fn test_lb_push_two_paths_with_interleaved_commits() {
    if !git_available() {
        eprintln!("SKIPPED: git not found in PATH");
        return;
    }
    let (_tmp, bare, sat) = setup_workspace().await;
    let client = GitClient::open(&sat).unwrap();
    import(&client, "Kernel/Pkg").await;
    import(&client, "Event/Other").await;

    write_file(&sat, "Kernel/Pkg/file.txt", "v2\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Kernel change"]);
    write_file(&sat, "README.md", "local only\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Satellite change"]);
    write_file(&sat, "Event/Other/data.txt", "changed\n");
    git(&sat, &["commit", "-q", "-a", "-m", "Event change"]);
    write_file(&sat, "Kernel/Pkg/new.txt", "new\n");
    write_file(&sat, "Event/Other/data.txt", "changed again\n");
    git(&sat, &["add", "-A"]);
    git(&sat, &["commit", "-q", "-m", "Change both"]);

    let mut push = LbPush::new(&client);
    let outcome = push.run(&request("two-dirs", false)).await.unwrap();
    let PushOutcome::Pushed { paths, imported, .. } = outcome else {
        panic!("expected a push");
    };
    assert_eq!(paths, vec!["Event/Other".to_string(), "Kernel/Pkg".to_string()]);

    for path in ["Kernel/Pkg", "Event/Other"] {
        assert_eq!(
            git(&bare, &["rev-parse", &format!("two-dirs:{}", path)]),
            git(&sat, &["rev-parse", &format!("HEAD:{}", path)])
        );
    }
    assert_eq!(
        git(&bare, &["rev-parse", "two-dirs:Phys/Third"]),
        git(&bare, &["rev-parse", "master:Phys/Third"])
    );
    assert!(!git_ok(&bare, &["cat-file", "-e", "two-dirs:README.md"]));
    assert_eq!(git(&bare, &["rev-list", "--count", "master..two-dirs"]), "3");

    let tracked = TrackingFile::in_worktree(&sat).entries().unwrap();
    assert_eq!(tracked.len(), 2);
    assert!(tracked.iter().all(|t| t.imported == imported));
}
