//! Session Manager: one isolated output directory per run.
//!
//! ```text
//! <output_root>/
//!   manifest.json                 ← last run's summary (shared)
//!   session_<id>/
//!     combined.xml
//!     tables/page_000001_table_001.xml
//!     assets/images/page_000001_img_001.png
//! ```
//!
//! The session id is a truncated SHA-256 over the absolute input path, the
//! wall-clock time in nanoseconds and the page range. It is collision
//! resistant, not cryptographically unique. Isolation is guaranteed by
//! [`Session::create`] clearing any directory that already carries the id.

use crate::error::Pdf2XmlError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name prefix shared with the Retention Manager.
pub const SESSION_PREFIX: &str = "session_";

/// Hex characters kept from the digest.
const ID_LEN: usize = 16;

/// An allocated, empty output namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    /// The logical output root (holds `manifest.json`).
    pub root: PathBuf,
    /// `<root>/session_<id>`.
    pub dir: PathBuf,
    pub tables_dir: PathBuf,
    pub images_dir: PathBuf,
    pub created: DateTime<Utc>,
}

impl Session {
    /// Allocate a session for a run starting now.
    pub fn create(
        root: &Path,
        input: &Path,
        start_page: usize,
        end_page: usize,
    ) -> Result<Self, Pdf2XmlError> {
        Self::create_at(root, input, start_page, end_page, Utc::now())
    }

    /// Allocate a session with an explicit creation time.
    pub fn create_at(
        root: &Path,
        input: &Path,
        start_page: usize,
        end_page: usize,
        now: DateTime<Utc>,
    ) -> Result<Self, Pdf2XmlError> {
        make_dir(root)?;

        let id = session_id(input, now, start_page, end_page);
        let dir = root.join(format!("{SESSION_PREFIX}{id}"));
        if dir.exists() {
            warn!("Session directory {} already exists, clearing it", dir.display());
            fs::remove_dir_all(&dir).map_err(|e| Pdf2XmlError::OutputDirFailed {
                path: dir.clone(),
                source: e,
            })?;
        }

        let tables_dir = dir.join("tables");
        let images_dir = dir.join("assets").join("images");
        make_dir(&tables_dir)?;
        make_dir(&images_dir)?;

        info!("Session {} → {}", id, dir.display());
        Ok(Self {
            id,
            root: root.to_path_buf(),
            dir,
            tables_dir,
            images_dir,
            created: now,
        })
    }

    /// Final location of the combined document.
    pub fn xml_path(&self) -> PathBuf {
        self.dir.join("combined.xml")
    }

    /// The shared manifest at the output root.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }
}

/// Derive the session id for a run.
pub fn session_id(input: &Path, now: DateTime<Utc>, start_page: usize, end_page: usize) -> String {
    let absolute = std::path::absolute(input).unwrap_or_else(|_| input.to_path_buf());
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));

    let mut hasher = Sha256::new();
    hasher.update(absolute.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(nanos.to_le_bytes());
    hasher.update(b"\0");
    hasher.update(format!("{start_page}-{end_page}").as_bytes());

    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// True for directory names the Session Manager creates.
pub fn is_session_dir_name(name: &str) -> bool {
    name.strip_prefix(SESSION_PREFIX)
        .is_some_and(|rest| !rest.is_empty())
}

fn make_dir(path: &Path) -> Result<(), Pdf2XmlError> {
    fs::create_dir_all(path).map_err(|e| Pdf2XmlError::OutputDirFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, nanos).unwrap()
    }

    #[test]
    fn id_depends_on_every_input() {
        let base = session_id(Path::new("/a.pdf"), at(1_700_000_000, 0), 1, 0);
        assert_eq!(base.len(), ID_LEN);
        assert!(base.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(base, session_id(Path::new("/a.pdf"), at(1_700_000_000, 0), 1, 0));
        assert_ne!(base, session_id(Path::new("/b.pdf"), at(1_700_000_000, 0), 1, 0));
        assert_ne!(base, session_id(Path::new("/a.pdf"), at(1_700_000_000, 1), 1, 0));
        assert_ne!(base, session_id(Path::new("/a.pdf"), at(1_700_000_000, 0), 2, 0));
    }

    #[test]
    fn creates_layout_under_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("out");
        let s = Session::create(&root, Path::new("doc.pdf"), 1, 3).unwrap();

        assert!(s.tables_dir.is_dir());
        assert!(s.images_dir.is_dir());
        assert!(s.images_dir.ends_with("assets/images"));
        assert_eq!(s.dir.parent(), Some(root.as_path()));
        assert!(is_session_dir_name(
            s.dir.file_name().unwrap().to_str().unwrap()
        ));
        assert_eq!(s.manifest_path(), root.join("manifest.json"));
    }

    #[test]
    fn consecutive_sessions_are_distinct() {
        let tmp = tempfile::tempdir().unwrap();
        let a = Session::create(tmp.path(), Path::new("doc.pdf"), 1, 0).unwrap();
        let b = Session::create(tmp.path(), Path::new("doc.pdf"), 1, 0).unwrap();
        assert_ne!(a.dir, b.dir);
        assert!(a.dir.is_dir() && b.dir.is_dir());
    }

    #[test]
    fn colliding_session_is_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let now = at(1_700_000_000, 42);
        let first = Session::create_at(tmp.path(), Path::new("doc.pdf"), 1, 0, now).unwrap();
        fs::write(first.tables_dir.join("stale.xml"), "<table/>").unwrap();
        fs::write(first.dir.join("leftover.txt"), "x").unwrap();

        let second = Session::create_at(tmp.path(), Path::new("doc.pdf"), 1, 0, now).unwrap();
        assert_eq!(first.dir, second.dir);
        assert!(second.tables_dir.is_dir());
        assert_eq!(fs::read_dir(&second.tables_dir).unwrap().count(), 0);
        assert!(!second.dir.join("leftover.txt").exists());
    }

    #[test]
    fn unwritable_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();
        let err = Session::create(&file, Path::new("doc.pdf"), 1, 0).unwrap_err();
        assert!(matches!(err, Pdf2XmlError::OutputDirFailed { .. }));
    }

    #[test]
    fn session_name_filter() {
        assert!(is_session_dir_name("session_abc"));
        assert!(!is_session_dir_name("session_"));
        assert!(!is_session_dir_name("_upload_x.pdf"));
    }
}
