//! Git activity scanning for the reporting window
//!
//! Each configured repository URL gets a local copy under the configured
//! workdir (cloned on first use, refreshed on later ticks). Commit metadata is
//! read with one `git log` subprocess per repository and filtered in process
//! by author email and window membership, both boundaries inclusive. The
//! same commit reachable from several branches is counted each time it is
//! listed; history is read with `--all` and never deduplicated.
//!
//! Every git failure here is a soft failure. A repository that cannot be
//! cloned, updated, or read is logged, counted on the returned scan, and
//! skipped, and the tick proceeds with whatever the remaining repositories
//! yielded.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tokio::process::Command;

use vigil_core::config::RepoConfig;

/// One commit parsed from `git log` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub hash: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Result of scanning a member's repositories for one window.
///
/// `failed_repos` counts repositories that could not be cloned, refreshed,
/// or read; the caller folds it into the tick's error counter.
#[derive(Debug, Default)]
pub struct CommitScan {
    pub messages: Vec<String>,
    pub failed_repos: usize,
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Collect commit messages authored by `author_email` across all project
/// repositories, within `[start, end]`. Repositories that fail are logged,
/// counted, and skipped.
pub async fn commits_for_user(
    config: &RepoConfig,
    repos: &[String],
    author_email: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CommitScan {
    let workdir = Path::new(&config.workdir);
    let mut scan = CommitScan::default();

    for remote in repos {
        let local = match ensure_local_copy(remote, workdir, config.git_timeout_secs).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(repo = %remote, error = %e, "Skipping repository: clone/update failed");
                scan.failed_repos += 1;
                continue;
            }
        };

        match commits_in_repo(&local, config.git_timeout_secs).await {
            Ok(commits) => {
                scan.messages
                    .extend(matching_messages(&commits, author_email, start, end));
            }
            Err(e) => {
                tracing::warn!(repo = %remote, error = %e, "Skipping repository: log scan failed");
                scan.failed_repos += 1;
            }
        }
    }

    scan
}

// ============================================================================
// LOCAL COPIES
// ============================================================================

/// Directory name for a remote URL, safe for use under the workdir.
///
/// The readable prefix collapses punctuation runs, so distinct remotes can
/// share it; the hash of the full URL keeps their local copies apart.
fn repo_slug(remote: &str) -> String {
    let trimmed = remote
        .split("://")
        .last()
        .unwrap_or(remote)
        .trim_end_matches('/')
        .trim_end_matches(".git");

    let mut slug: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }

    let mut hasher = DefaultHasher::new();
    remote.hash(&mut hasher);
    format!("{}-{:08x}", slug.trim_matches('-'), hasher.finish() as u32)
}

/// Clone the remote on first use, otherwise fetch+pull to refresh the copy.
/// A failed pull leaves the scan running against stale local history.
async fn ensure_local_copy(remote: &str, workdir: &Path, timeout_secs: u64) -> Result<PathBuf> {
    let local = workdir.join(repo_slug(remote));

    if local.join(".git").exists() {
        run_git(
            &["fetch", "--all", "--quiet"],
            Some(&local),
            timeout_secs,
        )
        .await
        .with_context(|| format!("fetching {}", remote))?;

        // Scans read `--all`, so fetched remote-tracking refs already cover
        // new commits; a diverged or detached local branch must not fail the
        // refresh.
        if let Err(e) = run_git(&["pull", "--ff-only", "--quiet"], Some(&local), timeout_secs).await
        {
            tracing::warn!(repo = %remote, error = %e, "git pull failed, scanning stale local history");
        }
        return Ok(local);
    }

    tokio::fs::create_dir_all(workdir)
        .await
        .with_context(|| format!("creating repo workdir {}", workdir.display()))?;

    let local_str = local
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF-8 repo path {}", local.display()))?;
    run_git(&["clone", "--quiet", remote, local_str], None, timeout_secs)
        .await
        .with_context(|| format!("cloning {}", remote))?;

    Ok(local)
}

// ============================================================================
// LOG SCANNING
// ============================================================================

/// Read all reachable commits from a local copy.
/// Format per line: `hash|author_email|author_timestamp|subject`.
async fn commits_in_repo(repo_dir: &Path, timeout_secs: u64) -> Result<Vec<GitCommit>> {
    let output = run_git(
        &["log", "--all", "--format=%H|%ae|%at|%s"],
        Some(repo_dir),
        timeout_secs,
    )
    .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().filter_map(parse_log_line).collect())
}

/// Parse one `git log` line. Malformed lines are dropped.
fn parse_log_line(line: &str) -> Option<GitCommit> {
    let parts: Vec<&str> = line.splitn(4, '|').collect();
    if parts.len() < 4 {
        return None;
    }

    let hash = parts[0].trim();
    if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let seconds: i64 = parts[2].trim().parse().ok()?;
    let timestamp = DateTime::from_timestamp(seconds, 0)?;

    Some(GitCommit {
        hash: hash.to_string(),
        author_email: parts[1].trim().to_string(),
        timestamp,
        message: parts[3].trim().to_string(),
    })
}

/// Messages of commits authored by `author_email` with a timestamp inside
/// `[start, end]`, both ends inclusive. Order follows the log; duplicates
/// are kept.
fn matching_messages(
    commits: &[GitCommit],
    author_email: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<String> {
    commits
        .iter()
        .filter(|c| c.author_email.eq_ignore_ascii_case(author_email))
        .filter(|c| c.timestamp >= start && c.timestamp <= end)
        .map(|c| c.message.clone())
        .collect()
}

// ============================================================================
// SUBPROCESS PLUMBING
// ============================================================================

/// Run one git subprocess with a timeout. Non-zero exit becomes an error
/// carrying stderr; a timed-out process is killed via `kill_on_drop`.
async fn run_git(
    args: &[&str],
    cwd: Option<&Path>,
    timeout_secs: u64,
) -> Result<std::process::Output> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| anyhow!("git {} timed out after {}s", args.join(" "), timeout_secs))?
        .with_context(|| format!("spawning git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "git {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        ));
    }

    Ok(output)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn commit(hash: &str, email: &str, seconds: i64, message: &str) -> GitCommit {
        GitCommit {
            hash: hash.to_string(),
            author_email: email.to_string(),
            timestamp: ts(seconds),
            message: message.to_string(),
        }
    }

    async fn git_available() -> bool {
        run_git(&["version"], None, 10).await.is_ok()
    }

    /// Run git in a test repo with a fixed identity and author date.
    async fn test_git(dir: &Path, date_epoch: i64, email: &str, args: &[&str]) {
        let date = format!("{} +0000", date_epoch);
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg("user.name=Test")
            .arg("-c")
            .arg(format!("user.email={}", email))
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let output = cmd.output().await.expect("spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    // ========================================================================
    // TEST: remote URLs map to filesystem-safe slugs
    // ========================================================================
    #[test]
    fn test_repo_slug() {
        let slug = repo_slug("https://github.com/acme/widgets.git");
        assert!(slug.starts_with("github-com-acme-widgets-"), "got {}", slug);
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));

        let suffix = slug.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

        assert!(repo_slug("git@github.com:acme/widgets.git")
            .starts_with("git-github-com-acme-widgets-"));
        assert!(repo_slug("/srv/repos/widgets/").starts_with("srv-repos-widgets-"));

        // Same remote, same local copy on every tick
        assert_eq!(
            repo_slug("https://github.com/acme/widgets.git"),
            repo_slug("https://github.com/acme/widgets.git")
        );
    }

    // ========================================================================
    // TEST: remotes whose readable prefixes collide keep separate copies
    // ========================================================================
    #[test]
    fn test_repo_slug_separates_colliding_remotes() {
        let a = repo_slug("https://host/foo/bar-baz");
        let b = repo_slug("https://host/foo-bar/baz");
        assert!(a.starts_with("host-foo-bar-baz-"), "got {}", a);
        assert!(b.starts_with("host-foo-bar-baz-"), "got {}", b);
        assert_ne!(a, b);
    }

    // ========================================================================
    // TEST: log line parsing keeps pipes in subjects, drops malformed lines
    // ========================================================================
    #[test]
    fn test_parse_log_line() {
        let line = format!("{}|dev@acme.io|1706400000|Fix parser | add tests", HASH_A);
        let parsed = parse_log_line(&line).unwrap();
        assert_eq!(parsed.author_email, "dev@acme.io");
        assert_eq!(parsed.timestamp, ts(1706400000));
        assert_eq!(parsed.message, "Fix parser | add tests");

        assert!(parse_log_line("deadbeef|dev@acme.io|1706400000|short hash").is_none());
        assert!(parse_log_line(&format!("{}|dev@acme.io|1706400000", HASH_A)).is_none());
        assert!(parse_log_line(&format!("{}|dev@acme.io|not-a-number|msg", HASH_A)).is_none());
    }

    // ========================================================================
    // TEST: window membership is inclusive on both boundaries
    // ========================================================================
    #[test]
    fn test_matching_messages_inclusive_bounds() {
        let commits = vec![
            commit(HASH_A, "dev@acme.io", 100, "at start"),
            commit(HASH_B, "dev@acme.io", 200, "at end"),
            commit(HASH_A, "dev@acme.io", 99, "before"),
            commit(HASH_B, "dev@acme.io", 201, "after"),
        ];

        let messages = matching_messages(&commits, "dev@acme.io", ts(100), ts(200));
        assert_eq!(messages, vec!["at start".to_string(), "at end".to_string()]);
    }

    // ========================================================================
    // TEST: author filter is case-insensitive and keeps duplicates
    // ========================================================================
    #[test]
    fn test_matching_messages_author_filter() {
        let commits = vec![
            commit(HASH_A, "Dev@Acme.IO", 150, "mine"),
            commit(HASH_B, "other@acme.io", 150, "not mine"),
            commit(HASH_A, "dev@acme.io", 160, "mine"),
        ];

        let messages = matching_messages(&commits, "dev@acme.io", ts(100), ts(200));
        assert_eq!(messages, vec!["mine".to_string(), "mine".to_string()]);
    }

    // ========================================================================
    // TEST: real repo scan end to end (skipped when git is unavailable)
    // ========================================================================
    #[tokio::test]
    async fn test_scan_real_repository() {
        if !git_available().await {
            eprintln!("Skipping git test: git not available");
            return;
        }

        let tmp = TempDir::new().unwrap();
        let repo = tmp.path();
        test_git(repo, 1706400000, "dev@acme.io", &["init", "--quiet"]).await;
        test_git(
            repo,
            1706400000,
            "dev@acme.io",
            &["commit", "--allow-empty", "-m", "first change"],
        )
        .await;
        test_git(
            repo,
            1706400500,
            "other@acme.io",
            &["commit", "--allow-empty", "-m", "someone else"],
        )
        .await;
        test_git(
            repo,
            1706401000,
            "dev@acme.io",
            &["commit", "--allow-empty", "-m", "second change"],
        )
        .await;

        let commits = commits_in_repo(repo, 60).await.unwrap();
        assert_eq!(commits.len(), 3);

        let in_window =
            matching_messages(&commits, "dev@acme.io", ts(1706400000), ts(1706400900));
        assert_eq!(in_window, vec!["first change".to_string()]);

        let all = matching_messages(&commits, "dev@acme.io", ts(0), ts(2000000000));
        assert_eq!(all.len(), 2);
    }

    // ========================================================================
    // TEST: clone on first use, fetch on the next tick
    // ========================================================================
    #[tokio::test]
    async fn test_ensure_local_copy_clone_then_fetch() {
        if !git_available().await {
            eprintln!("Skipping git test: git not available");
            return;
        }

        let source_tmp = TempDir::new().unwrap();
        let source = source_tmp.path();
        test_git(source, 1706400000, "dev@acme.io", &["init", "--quiet"]).await;
        test_git(
            source,
            1706400000,
            "dev@acme.io",
            &["commit", "--allow-empty", "-m", "seed"],
        )
        .await;

        let workdir_tmp = TempDir::new().unwrap();
        let remote = source.to_str().unwrap().to_string();

        let local = ensure_local_copy(&remote, workdir_tmp.path(), 60)
            .await
            .unwrap();
        assert!(local.join(".git").exists());

        // New upstream commit must be visible after the refresh pass
        test_git(
            source,
            1706400600,
            "dev@acme.io",
            &["commit", "--allow-empty", "-m", "later work"],
        )
        .await;

        let refreshed = ensure_local_copy(&remote, workdir_tmp.path(), 60)
            .await
            .unwrap();
        assert_eq!(refreshed, local);

        let commits = commits_in_repo(&local, 60).await.unwrap();
        assert!(
            commits.iter().any(|c| c.message == "later work"),
            "fetched copy should see the new upstream commit"
        );
    }

    // ========================================================================
    // TEST: a bad remote is an error, not a panic
    // ========================================================================
    #[tokio::test]
    async fn test_clone_failure_is_soft() {
        if !git_available().await {
            eprintln!("Skipping git test: git not available");
            return;
        }

        let workdir_tmp = TempDir::new().unwrap();
        let result =
            ensure_local_copy("/nonexistent/repo/path", workdir_tmp.path(), 30).await;
        assert!(result.is_err());
    }

    // ========================================================================
    // TEST: a dead repository surfaces on the scan's failure count
    // ========================================================================
    #[tokio::test]
    async fn test_failed_repo_is_counted() {
        let workdir_tmp = TempDir::new().unwrap();
        let config = RepoConfig {
            workdir: workdir_tmp.path().to_str().unwrap().to_string(),
            git_timeout_secs: 30,
        };
        let repos = vec!["/nonexistent/vigil/dead-repo".to_string()];

        let scan =
            commits_for_user(&config, &repos, "dev@acme.io", ts(0), ts(2000000000)).await;
        assert!(scan.messages.is_empty());
        assert_eq!(scan.failed_repos, 1);
    }
}
