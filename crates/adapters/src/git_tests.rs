// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

async fn init_repo(dir: &Path) {
    for args in [
        vec!["init", "-q"],
        vec!["config", "user.email", "t@example.com"],
        vec!["config", "user.name", "t"],
    ] {
        let status = Command::new("git")
            .args(&args)
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }
}

#[tokio::test]
async fn status_reports_untracked_files() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    std::fs::write(dir.path().join("new.txt"), "x").unwrap();

    let lines = GitQuery::new().status_porcelain(dir.path()).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("new.txt"));
}

#[tokio::test]
async fn status_clean_tree_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    let lines = GitQuery::new().status_porcelain(dir.path()).await.unwrap();
    assert!(lines.is_empty());
}

#[tokio::test]
async fn commits_since_epoch_lists_subjects() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    std::fs::write(dir.path().join("a.txt"), "x").unwrap();
    for args in [vec!["add", "."], vec!["commit", "-q", "-m", "first commit"]] {
        Command::new("git")
            .args(&args)
            .current_dir(dir.path())
            .output()
            .await
            .unwrap();
    }

    let subjects = GitQuery::new()
        .commits_since(dir.path(), "1970-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(subjects, vec!["first commit"]);
}

#[tokio::test]
async fn non_repo_directory_reports_not_a_repo() {
    let dir = tempfile::tempdir().unwrap();
    let err = GitQuery::new().status_porcelain(dir.path()).await.unwrap_err();
    assert!(matches!(err, GitError::NotARepo(_) | GitError::Failed(_)));
}
