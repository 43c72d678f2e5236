//! Retention Manager: bound the number and age of session directories.
//!
//! A session is removed when either rule fires:
//!
//! | Rule  | Fires when                                                    |
//! |-------|---------------------------------------------------------------|
//! | age   | modified more than `max_age_hours` ago (strictly greater)     |
//! | count | not among the newest `max_sessions` by modification time      |
//!
//! With one session or none, nothing is removed. Failures are recorded in
//! the report and never abort the pass. No lock is taken: concurrent writers
//! on the same output root are not supported.

use crate::config::RetentionPolicy;
use crate::session::is_session_dir_name;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub sessions_found: usize,
    pub sessions_removed: usize,
    pub sessions_kept: usize,
    pub space_freed_mb: f64,
    /// One entry per removed session naming the rule(s), plus one per
    /// failed removal.
    pub cleanup_reason: Vec<String>,
}

struct Candidate {
    name: String,
    path: PathBuf,
    modified: SystemTime,
}

/// Apply `policy` to the sessions under `root`, measured against now.
pub fn enforce_retention(root: &Path, policy: &RetentionPolicy) -> RetentionReport {
    enforce_retention_at(root, policy, SystemTime::now())
}

/// Apply `policy` with ages measured against `now`.
pub fn enforce_retention_at(root: &Path, policy: &RetentionPolicy, now: SystemTime) -> RetentionReport {
    enforce_with(root, policy, now, |dir| fs::remove_dir_all(dir))
}

fn enforce_with<F>(root: &Path, policy: &RetentionPolicy, now: SystemTime, mut remove: F) -> RetentionReport
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut sessions = list_sessions(root);
    let mut report = RetentionReport {
        sessions_found: sessions.len(),
        sessions_kept: sessions.len(),
        ..Default::default()
    };
    if sessions.len() <= 1 {
        debug!("Retention: {} session(s), nothing to do", sessions.len());
        return report;
    }

    // Newest first; name breaks ties so ranking is stable.
    sessions.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));

    let mut freed_bytes = 0u64;
    for (rank, session) in sessions.iter().enumerate() {
        let age_hours = now
            .duration_since(session.modified)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
            / 3600.0;

        let mut rules = Vec::new();
        if age_hours > policy.max_age_hours {
            rules.push(format!(
                "age {:.1}h exceeds {}h",
                age_hours, policy.max_age_hours
            ));
        }
        if rank >= policy.max_sessions {
            rules.push(format!(
                "rank {} beyond newest {}",
                rank + 1,
                policy.max_sessions
            ));
        }
        if rules.is_empty() {
            continue;
        }

        let size = directory_size_bytes(&session.path);
        match remove(&session.path) {
            Ok(()) => {
                freed_bytes += size;
                report.sessions_removed += 1;
                report
                    .cleanup_reason
                    .push(format!("{}: {}", session.name, rules.join("; ")));
                debug!("Removed {} ({} bytes)", session.name, size);
            }
            Err(e) => {
                warn!("Retention: cannot remove {}: {}", session.path.display(), e);
                report
                    .cleanup_reason
                    .push(format!("{}: removal failed: {}", session.name, e));
            }
        }
    }

    report.sessions_kept = report.sessions_found - report.sessions_removed;
    report.space_freed_mb = freed_bytes as f64 / BYTES_PER_MB;
    info!(
        "Retention: {} found, {} removed, {:.3} MB freed",
        report.sessions_found, report.sessions_removed, report.space_freed_mb
    );
    report
}

fn list_sessions(root: &Path) -> Vec<Candidate> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Retention: cannot read {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_session_dir_name(&name) {
                return None;
            }
            // Symlinks are never followed, let alone deleted through.
            let meta = fs::symlink_metadata(entry.path()).ok()?;
            if !meta.is_dir() {
                return None;
            }
            let modified = meta.modified().ok()?;
            Some(Candidate {
                name,
                path: entry.path(),
                modified,
            })
        })
        .collect()
}

/// Total size of regular files under `path`, without following symlinks.
/// Unreadable entries count as zero.
pub fn directory_size_bytes(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const HOUR: u64 = 3600;

    /// Whole seconds, so mtime precision cannot shift exact ages.
    fn now() -> SystemTime {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    /// Create `session_<name>` with `bytes` of payload, aged `hours`.
    fn make_session(root: &Path, name: &str, hours: u64, bytes: usize, now: SystemTime) -> PathBuf {
        let dir = root.join(format!("session_{name}"));
        fs::create_dir_all(dir.join("tables")).unwrap();
        fs::write(dir.join("combined.xml"), vec![b'x'; bytes]).unwrap();
        fs::write(dir.join("tables").join("t.xml"), b"<table/>").unwrap();
        // Directory mtime last: writing into it would reset the time.
        let mtime = now - Duration::from_secs(hours * HOUR);
        File::open(&dir).unwrap().set_modified(mtime).unwrap();
        dir
    }

    fn policy(max_sessions: usize, max_age_hours: f64) -> RetentionPolicy {
        RetentionPolicy {
            max_sessions,
            max_age_hours,
        }
    }

    fn five_sessions(root: &Path, now: SystemTime) -> Vec<PathBuf> {
        [0, 12, 18, 30, 48]
            .iter()
            .enumerate()
            .map(|(i, &h)| make_session(root, &format!("h{h:02}"), h, 100 * (i + 1), now))
            .collect()
    }

    #[test]
    fn age_rule_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let now = now();
        let dirs = five_sessions(tmp.path(), now);

        let report = enforce_retention_at(tmp.path(), &policy(5, 24.0), now);
        assert_eq!(report.sessions_found, 5);
        assert_eq!(report.sessions_removed, 2);
        assert_eq!(report.sessions_kept, 3);
        assert!(dirs[0].exists() && dirs[1].exists() && dirs[2].exists());
        assert!(!dirs[3].exists() && !dirs[4].exists());
        assert!(report.cleanup_reason.iter().all(|r| r.contains("age")));
    }

    #[test]
    fn count_and_age_rules_union() {
        let tmp = tempfile::tempdir().unwrap();
        let now = now();
        let dirs = five_sessions(tmp.path(), now);
        let expected_bytes: u64 = dirs[2..].iter().map(|d| directory_size_bytes(d)).sum();

        let report = enforce_retention_at(tmp.path(), &policy(3, 12.0), now);
        assert_eq!(report.sessions_removed, 3);
        assert_eq!(report.cleanup_reason.len(), 3, "no session removed twice");
        assert!(dirs[0].exists());
        // exactly 12h old is not strictly older than 12h
        assert!(dirs[1].exists());
        assert!(!dirs[2].exists(), "18h exceeds 12h");
        assert!(!dirs[3].exists() && !dirs[4].exists());
        assert_eq!(report.space_freed_mb, expected_bytes as f64 / BYTES_PER_MB);

        let h30 = report
            .cleanup_reason
            .iter()
            .find(|r| r.starts_with("session_h30"))
            .unwrap();
        assert!(h30.contains("age") && h30.contains("rank 4"));
    }

    #[test]
    fn count_rule_spares_newest() {
        let tmp = tempfile::tempdir().unwrap();
        let now = now();
        let dirs: Vec<_> = (0..4)
            .map(|i| make_session(tmp.path(), &format!("n{i}"), i, 10, now))
            .collect();

        let report = enforce_retention_at(tmp.path(), &policy(2, 1000.0), now);
        assert_eq!(report.sessions_removed, 2);
        assert!(dirs[0].exists() && dirs[1].exists());
        assert!(!dirs[2].exists() && !dirs[3].exists());
    }

    #[test]
    fn single_session_is_never_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let now = now();
        let only = make_session(tmp.path(), "only", 500, 10, now);

        let report = enforce_retention_at(tmp.path(), &policy(1, 1.0), now);
        assert!(only.exists());
        assert_eq!(report.sessions_found, 1);
        assert_eq!(report.sessions_removed, 0);
        assert_eq!(report.sessions_kept, 1);
    }

    #[test]
    fn ignores_non_session_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let now = now();
        make_session(tmp.path(), "a", 0, 10, now);
        make_session(tmp.path(), "b", 100, 10, now);
        fs::write(tmp.path().join("manifest.json"), "{}").unwrap();
        fs::create_dir(tmp.path().join("keep_me")).unwrap();

        let report = enforce_retention_at(tmp.path(), &policy(5, 24.0), now);
        assert_eq!(report.sessions_found, 2);
        assert_eq!(report.sessions_removed, 1);
        assert!(tmp.path().join("manifest.json").exists());
        assert!(tmp.path().join("keep_me").exists());
    }

    #[test]
    fn missing_root_yields_empty_report() {
        let tmp = tempfile::tempdir().unwrap();
        let report = enforce_retention(&tmp.path().join("absent"), &RetentionPolicy::default());
        assert_eq!(report, RetentionReport::default());
    }

    #[test]
    fn failed_removal_is_recorded_and_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let now = now();
        let dirs = five_sessions(tmp.path(), now);
        let h48_bytes = directory_size_bytes(&dirs[4]);

        let stuck = dirs[3].clone();
        let report = enforce_with(tmp.path(), &policy(5, 24.0), now, |dir| {
            if dir == stuck.as_path() {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy"))
            } else {
                fs::remove_dir_all(dir)
            }
        });

        assert_eq!(report.sessions_found, 5);
        assert_eq!(report.sessions_removed, 1);
        assert_eq!(report.sessions_kept, 4);
        assert!(dirs[3].exists(), "failed candidate is left in place");
        assert!(!dirs[4].exists(), "later candidates are still removed");
        assert_eq!(report.space_freed_mb, h48_bytes as f64 / BYTES_PER_MB);
        assert!(report
            .cleanup_reason
            .iter()
            .any(|r| r.starts_with("session_h30: removal failed") && r.contains("busy")));
        assert!(report.cleanup_reason.iter().any(|r| r.starts_with("session_h48: age")));
    }

    #[test]
    fn vanished_session_is_recorded_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let now = now();
        let dirs = five_sessions(tmp.path(), now);

        // Another process deletes the directory between listing and removal.
        let report = enforce_with(tmp.path(), &policy(5, 24.0), now, |dir| {
            fs::remove_dir_all(dir)?;
            fs::remove_dir_all(dir)
        });

        assert_eq!(report.sessions_removed, 0);
        assert_eq!(report.sessions_kept, 5);
        assert_eq!(report.space_freed_mb, 0.0);
        assert_eq!(report.cleanup_reason.len(), 2);
        assert!(report.cleanup_reason.iter().all(|r| r.contains("removal failed")));
        assert!(dirs[0].exists());
    }

    #[test]
    fn size_counts_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        fs::write(tmp.path().join("a/one"), [0u8; 10]).unwrap();
        fs::write(tmp.path().join("a/b/two"), [0u8; 32]).unwrap();
        assert_eq!(directory_size_bytes(&tmp.path().join("a")), 42);
        assert_eq!(directory_size_bytes(&tmp.path().join("a/one")), 10);
        assert_eq!(directory_size_bytes(&tmp.path().join("missing")), 0);
    }

    #[cfg(unix)]
    #[test]
    fn size_does_not_follow_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("outside")).unwrap();
        fs::write(tmp.path().join("outside/big"), [0u8; 1000]).unwrap();
        fs::create_dir_all(tmp.path().join("session")).unwrap();
        fs::write(tmp.path().join("session/own"), [0u8; 7]).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("outside"), tmp.path().join("session/link")).unwrap();
        assert_eq!(directory_size_bytes(&tmp.path().join("session")), 7);
    }
}
