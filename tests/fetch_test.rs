//! Integration tests for source acquisition against real git
//!
//! Upstreams are local repositories reached over `file://`. Tests are
//! skipped when git is not installed.

use std::path::Path;
use std::process::Command;
use std::sync::Once;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use rvforge::infra::git::{FetchAction, GitOperations, SourceRepository};
use rvforge::infra::process::SystemRunner;

fn git_available() -> bool {
    which::which("git").is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=rvforge", "-c", "user.email=rvforge@example.invalid"])
        .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .args(["-c", "protocol.file.allow=always"])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("Failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

/// Upstream repository with one commit on `main`, tagged `v1`
fn upstream(temp: &TempDir) -> std::path::PathBuf {
    let dir = temp.child("upstream");
    dir.create_dir_all().unwrap();
    dir.child("README").write_str("version one\n").unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir.path(), &["add", "README"]);
    git(dir.path(), &["commit", "-q", "-m", "one"]);
    git(dir.path(), &["tag", "v1"]);
    dir.path().to_path_buf()
}

/// Let every git child of this process use `file://` submodules
fn allow_file_submodules() {
    static ALLOW: Once = Once::new();
    ALLOW.call_once(|| {
        std::env::set_var("GIT_CONFIG_COUNT", "1");
        std::env::set_var("GIT_CONFIG_KEY_0", "protocol.file.allow");
        std::env::set_var("GIT_CONFIG_VALUE_0", "always");
    });
}

/// Upstream whose `lib/` is a submodule holding `VERSION`
fn upstream_with_submodule(temp: &TempDir) -> std::path::PathBuf {
    let lib = temp.child("lib-upstream");
    lib.create_dir_all().unwrap();
    lib.child("VERSION").write_str("lib 1\n").unwrap();
    git(lib.path(), &["init", "-q"]);
    git(lib.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(lib.path(), &["add", "VERSION"]);
    git(lib.path(), &["commit", "-q", "-m", "lib"]);

    let dir = upstream(temp);
    let url = format!("file://{}", lib.path().display());
    git(&dir, &["submodule", "add", "-q", &url, "lib"]);
    git(&dir, &["commit", "-q", "-m", "add lib"]);
    dir
}

fn repository(temp: &TempDir, upstream: &Path, git_ref: &str) -> SourceRepository {
    GitOperations::new(temp.child("sources").path().to_path_buf()).repository(
        "demo",
        &format!("file://{}", upstream.display()),
        Some(git_ref),
    )
}

#[test]
fn test_fetch_clones_absent_source() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let upstream = upstream(&temp);
    let repo = repository(&temp, &upstream, "v1");
    let log = temp.child("demo.log");

    let action = GitOperations::fetch(&mut SystemRunner::new(), &repo, false, log.path()).unwrap();

    assert_eq!(action, FetchAction::Cloned);
    temp.child("sources/demo/README")
        .assert(predicate::str::contains("version one"));
    assert!(GitOperations::head_commit(&repo.path).is_some());
    log.assert(predicate::str::contains("git clone"));
}

#[test]
fn test_submodules_are_initialised_on_clone_and_refresh() {
    if !git_available() {
        return;
    }
    allow_file_submodules();
    let temp = TempDir::new().unwrap();
    let upstream = upstream_with_submodule(&temp);
    let repo = repository(&temp, &upstream, "main");
    let log = temp.child("demo.log");
    let mut runner = SystemRunner::new();

    GitOperations::fetch(&mut runner, &repo, false, log.path()).unwrap();

    let version = temp.child("sources/demo/lib/VERSION");
    version.assert(predicate::str::contains("lib 1"));

    std::fs::remove_file(version.path()).unwrap();
    let action = GitOperations::fetch(&mut runner, &repo, false, log.path()).unwrap();

    assert_eq!(action, FetchAction::Refreshed);
    version.assert(predicate::str::contains("lib 1"));
}

#[test]
fn test_refresh_discards_local_changes() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let upstream = upstream(&temp);
    let repo = repository(&temp, &upstream, "v1");
    let log = temp.child("demo.log");
    let mut runner = SystemRunner::new();
    GitOperations::fetch(&mut runner, &repo, false, log.path()).unwrap();

    let checkout = temp.child("sources/demo");
    checkout.child("README").write_str("local edit\n").unwrap();
    checkout.child("stray.o").write_str("").unwrap();

    let action = GitOperations::fetch(&mut runner, &repo, false, log.path()).unwrap();

    assert_eq!(action, FetchAction::Refreshed);
    checkout
        .child("README")
        .assert(predicate::str::contains("version one"));
    checkout.child("stray.o").assert(predicate::path::missing());
}

#[test]
fn test_refresh_follows_branch() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let upstream = upstream(&temp);
    let repo = repository(&temp, &upstream, "main");
    let log = temp.child("demo.log");
    let mut runner = SystemRunner::new();
    GitOperations::fetch(&mut runner, &repo, false, log.path()).unwrap();

    std::fs::write(upstream.join("README"), "version two\n").unwrap();
    git(&upstream, &["commit", "-q", "-am", "two"]);

    GitOperations::fetch(&mut runner, &repo, false, log.path()).unwrap();

    temp.child("sources/demo/README")
        .assert(predicate::str::contains("version two"));
}

#[test]
fn test_clear_existing_leaves_nothing_behind() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let upstream = upstream(&temp);
    let repo = repository(&temp, &upstream, "v1");
    let log = temp.child("demo.log");
    let mut runner = SystemRunner::new();
    GitOperations::fetch(&mut runner, &repo, false, log.path()).unwrap();
    temp.child("sources/demo/build/leftover").write_str("x").unwrap();

    let action = GitOperations::fetch(&mut runner, &repo, true, log.path()).unwrap();

    assert_eq!(action, FetchAction::Recloned);
    temp.child("sources/demo/build").assert(predicate::path::missing());
    temp.child("sources/demo/README").assert(predicate::path::exists());
}

#[test]
fn test_unknown_ref_fails() {
    if !git_available() {
        return;
    }
    let temp = TempDir::new().unwrap();
    let upstream = upstream(&temp);
    let repo = repository(&temp, &upstream, "v9");
    let log = temp.child("demo.log");

    let err = GitOperations::fetch(&mut SystemRunner::new(), &repo, false, log.path()).unwrap_err();

    assert!(err.to_string().contains("clone"));
}

#[test]
#[ignore = "needs network access"]
fn test_fetch_from_network() {
    let temp = TempDir::new().unwrap();
    let repo = GitOperations::new(temp.path().to_path_buf()).repository(
        "opensbi",
        rvforge::config::urls::OPENSBI,
        Some(rvforge::config::defaults::OPENSBI_REF),
    );
    let log = temp.child("opensbi.log");

    GitOperations::fetch(&mut SystemRunner::new(), &repo, false, log.path()).unwrap();

    temp.child("opensbi/Makefile").assert(predicate::path::exists());
}
