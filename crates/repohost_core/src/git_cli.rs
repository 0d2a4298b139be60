//! Plumbing that shells out to the system `git` binary.

use crate::error::{CatalogError, Result};
use crate::storage::{Credentials, Metric, RefUpdateResult, RemoteConfig, TrackingRefUpdate};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;
use url::Url;

/// Refspec used when a mirror remote has none configured.
pub const DEFAULT_MIRROR_REFSPEC: &str = "+refs/*:refs/*";

/// Fetches from a remote into a repository.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        git_dir: &Path,
        remote: &RemoteConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<TrackingRefUpdate>>;
}

/// [`Fetcher`] running `git fetch --porcelain`.
#[derive(Debug, Default, Clone)]
pub struct GitCliFetcher;

impl Fetcher for GitCliFetcher {
    fn fetch(
        &self,
        git_dir: &Path,
        remote: &RemoteConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<TrackingRefUpdate>> {
        let specs = if remote.fetch.is_empty() {
            vec![DEFAULT_MIRROR_REFSPEC.to_string()]
        } else {
            remote.fetch.clone()
        };

        let mut cmd = fetch_command(git_dir, remote, credentials, &specs);
        debug!(git_dir = %git_dir.display(), remote = %remote.name, "fetching");
        let output = cmd.output().map_err(|e| fetch_error(git_dir, remote, e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fetch_error(git_dir, remote, stderr.trim().to_string()));
        }
        Ok(parse_porcelain(&String::from_utf8_lossy(&output.stdout), &specs))
    }
}

/// Builds the `git fetch` invocation. Stale tracking refs are kept; only a
/// repository whose own config enables `fetch.prune` drops them.
fn fetch_command(
    git_dir: &Path,
    remote: &RemoteConfig,
    credentials: Option<&Credentials>,
    specs: &[String],
) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("--git-dir").arg(git_dir);
    if let Some(creds) = credentials {
        let token = STANDARD.encode(format!("{}:{}", creds.username, creds.password));
        cmd.arg("-c")
            .arg(format!("http.extraHeader=Authorization: Basic {}", token));
    }
    cmd.args(["fetch", "--porcelain"])
        .arg(strip_credentials(&remote.url))
        .args(specs);
    cmd
}

fn fetch_error(git_dir: &Path, remote: &RemoteConfig, reason: String) -> CatalogError {
    CatalogError::Fetch {
        repository: git_dir.display().to_string(),
        remote: remote.name.clone(),
        reason,
    }
}

/// Removes inline user and password from a URL.
pub fn strip_credentials(remote_url: &str) -> String {
    match Url::parse(remote_url) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            // Both setters only fail for URLs that cannot carry credentials.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        _ => remote_url.to_string(),
    }
}

/// Normalized object id, `None` for the null id or anything not hex.
fn object_id(id: &str) -> Option<String> {
    let bytes = hex::decode(id).ok()?;
    if bytes.is_empty() || bytes.iter().all(|b| *b == 0) {
        None
    } else {
        Some(hex::encode(bytes))
    }
}

/// Parses `git fetch --porcelain` output.
///
/// Each line reads `<flag> <old> <new> <local ref>`; lines with unknown flags
/// are dropped.
pub fn parse_porcelain(output: &str, refspecs: &[String]) -> Vec<TrackingRefUpdate> {
    output
        .lines()
        .filter_map(|line| {
            let mut chars = line.chars();
            let flag = chars.next()?;
            let result = match flag {
                ' ' => RefUpdateResult::FastForward,
                // a moved tag is rewritten in place, never fast-forwarded
                '+' | 't' => RefUpdateResult::Forced,
                '*' => RefUpdateResult::New,
                '-' => RefUpdateResult::Deleted,
                '!' => RefUpdateResult::Rejected,
                '=' => RefUpdateResult::NoChange,
                _ => return None,
            };
            let mut parts = chars.as_str().split_whitespace();
            let old_id = parts.next()?;
            let new_id = parts.next()?;
            let local_name = parts.next()?.to_string();
            Some(TrackingRefUpdate {
                remote_name: remote_ref_for(&local_name, refspecs)
                    .unwrap_or_else(|| local_name.clone()),
                local_name,
                old_id: object_id(old_id),
                new_id: object_id(new_id),
                result,
            })
        })
        .collect()
}

/// Maps a local ref back through the refspecs to the remote ref it tracks.
pub fn remote_ref_for(local: &str, refspecs: &[String]) -> Option<String> {
    refspecs.iter().find_map(|spec| {
        let (src, dst) = spec.trim_start_matches('+').split_once(':')?;
        match dst.split_once('*') {
            Some((prefix, suffix)) => {
                let middle = local.strip_prefix(prefix)?.strip_suffix(suffix)?;
                Some(src.replacen('*', middle, 1))
            }
            None if dst == local => Some(src.to_string()),
            None => None,
        }
    })
}

/// True for refspecs of the form `[+]refs/<src>:refs/<dst>` with matching
/// wildcards.
pub fn is_valid_refspec(spec: &str) -> bool {
    let Some((src, dst)) = spec.trim_start_matches('+').split_once(':') else {
        return false;
    };
    let stars = |s: &str| s.matches('*').count();
    src.starts_with("refs/")
        && dst.starts_with("refs/")
        && !spec.chars().any(char::is_whitespace)
        && stars(src) == stars(dst)
        && stars(src) <= 1
}

fn run_git(git_dir: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new("git").arg("--git-dir").arg(git_dir).args(args).output()
}

/// Compacts a repository with `git gc`.
pub fn collect_garbage(git_dir: &Path) -> Result<()> {
    let output = run_git(git_dir, &["gc", "--quiet"])?;
    if !output.status.success() {
        return Err(CatalogError::Persistence {
            repository: git_dir.display().to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Commit counts per day across all refs, most recent day first.
pub fn daily_activity(git_dir: &Path, max_commits: i32) -> Result<Vec<Metric>> {
    let limit = format!("-n{}", max_commits);
    let mut args = vec!["log", "--all", "--date=short", "--format=%ad"];
    if max_commits > 0 {
        args.push(&limit);
    }
    let output = run_git(git_dir, &args)?;
    if !output.status.success() {
        return Err(CatalogError::Io(std::io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )));
    }
    Ok(count_by_day(&String::from_utf8_lossy(&output.stdout)))
}

fn count_by_day(log: &str) -> Vec<Metric> {
    let mut days: BTreeMap<&str, f64> = BTreeMap::new();
    for day in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
        *days.entry(day).or_default() += 1.0;
    }
    days.into_iter()
        .rev()
        .map(|(day, count)| Metric {
            name: day.to_string(),
            count,
            tag: 0.0,
        })
        .collect()
}
