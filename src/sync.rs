//! Periodic push of the dataset directory to a git remote
//!
//! The data directory is a checkout of the dataset repository. On every tick
//! the job commits whatever the sink has appended since the last push; a
//! clean tree is a no-op.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const COMMIT_MESSAGE: &str = "Auto commit by rlhf-collect";
const COMMIT_IDENTITY: [&str; 4] = [
    "-c",
    "user.name=rlhf-collect",
    "-c",
    "user.email=rlhf-collect@localhost",
];

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("git executable not found: {0}")]
    GitNotFound(#[from] which::Error),
    #[error("Failed to run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("git {command} exited with {status}: {stderr}")]
    GitFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub repo_url: String,
    pub data_dir: PathBuf,
    pub interval: Duration,
    /// Overwrite remote history instead of failing on divergence
    pub force_push: bool,
}

pub struct DatasetSync {
    config: SyncConfig,
    git: PathBuf,
}

impl DatasetSync {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let git = which::which("git")?;
        Ok(Self { config, git })
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Clone the dataset repository into the data directory unless it is
    /// already a checkout. Must run before the sink opens its file there.
    pub async fn ensure_checkout(&self) -> Result<(), SyncError> {
        if self.config.data_dir.join(".git").exists() {
            tracing::info!(path = %self.config.data_dir.display(), "Dataset checkout present");
            return Ok(());
        }

        let target = self.config.data_dir.to_string_lossy().into_owned();
        let cwd = self
            .config
            .data_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.run_git(cwd, &["clone", &self.config.repo_url, &target])
            .await?;

        tracing::info!(repo = %self.config.repo_url, path = %target, "Dataset repository cloned");
        Ok(())
    }

    /// Commit and push pending changes. Returns whether anything was pushed.
    pub async fn push_once(&self) -> Result<bool, SyncError> {
        let dir = self.config.data_dir.as_path();

        let status = self.run_git(dir, &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            tracing::debug!("Dataset unchanged, nothing to push");
            return Ok(false);
        }

        self.run_git(dir, &["add", "-A"]).await?;
        let mut commit: Vec<&str> = COMMIT_IDENTITY.to_vec();
        commit.extend(["commit", "-m", COMMIT_MESSAGE]);
        self.run_git(dir, &commit).await?;

        if self.config.force_push {
            self.run_git(dir, &["push", "--force", "origin", "HEAD"]).await?;
        } else {
            self.run_git(dir, &["push", "origin", "HEAD"]).await?;
        }

        tracing::info!(
            changed = status.lines().count(),
            force = self.config.force_push,
            "Dataset pushed"
        );
        Ok(true)
    }

    /// Push on every interval until `cancel` fires, then push once more so
    /// records appended during shutdown are not left behind. Failures are
    /// logged and retried on the next tick.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => self.push_logged().await,
                }
            }

            self.push_logged().await;
            tracing::info!("Dataset sync stopped");
        })
    }

    async fn push_logged(&self) {
        if let Err(e) = self.push_once().await {
            tracing::warn!(error = %e, "Dataset push failed");
        }
    }

    async fn run_git(&self, cwd: &Path, args: &[&str]) -> Result<String, SyncError> {
        let command = args
            .iter()
            .find(|a| !a.starts_with('-') && !a.contains('='))
            .copied()
            .unwrap_or("")
            .to_string();

        let output = Command::new(&self.git)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SyncError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SyncError::GitFailed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {args:?} failed: {output:?}");
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// A bare remote and a sync job pointed at a not-yet-cloned data dir
    fn setup(tmp: &TempDir) -> (PathBuf, DatasetSync) {
        let remote = tmp.path().join("remote.git");
        git(tmp.path(), &["init", "--bare", "remote.git"]);

        let sync = DatasetSync::new(SyncConfig {
            repo_url: remote.to_string_lossy().into_owned(),
            data_dir: tmp.path().join("data"),
            interval: Duration::from_millis(50),
            force_push: false,
        })
        .unwrap();
        (remote, sync)
    }

    #[tokio::test]
    async fn test_clone_then_push_changes() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let (remote, sync) = setup(&tmp);

        sync.ensure_checkout().await.unwrap();
        assert!(sync.data_dir().join(".git").exists());
        // A second call leaves the checkout alone
        sync.ensure_checkout().await.unwrap();

        std::fs::write(sync.data_dir().join("data.jsonl"), "{\"session_id\":\"s1\"}\n").unwrap();
        assert!(sync.push_once().await.unwrap());

        let log = git(&remote, &["log", "--all", "--format=%s"]);
        assert_eq!(log.trim(), COMMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_clean_tree_is_noop() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let (remote, sync) = setup(&tmp);
        sync.ensure_checkout().await.unwrap();

        std::fs::write(sync.data_dir().join("data.jsonl"), "{}\n").unwrap();
        assert!(sync.push_once().await.unwrap());
        assert!(!sync.push_once().await.unwrap());

        let log = git(&remote, &["log", "--all", "--format=%s"]);
        assert_eq!(log.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_spawned_job_pushes_and_stops_on_cancel() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let (remote, sync) = setup(&tmp);
        sync.ensure_checkout().await.unwrap();
        std::fs::write(sync.data_dir().join("data.jsonl"), "{}\n").unwrap();

        let cancel = CancellationToken::new();
        let handle = sync.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
        handle.await.unwrap();

        let log = git(&remote, &["log", "--all", "--format=%s"]);
        assert_eq!(log.trim(), COMMIT_MESSAGE);
    }

    #[tokio::test]
    async fn test_clone_failure_is_reported() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let sync = DatasetSync::new(SyncConfig {
            repo_url: tmp.path().join("missing.git").to_string_lossy().into_owned(),
            data_dir: tmp.path().join("data"),
            interval: Duration::from_secs(60),
            force_push: false,
        })
        .unwrap();

        let err = sync.ensure_checkout().await.unwrap_err();
        assert!(matches!(err, SyncError::GitFailed { ref command, .. } if command == "clone"));
    }
}
