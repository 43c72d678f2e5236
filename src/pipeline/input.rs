//! Input resolution: validate a local PDF before anything touches the disk.
//!
//! Checks run in order: existence, read permission, `%PDF` magic. All three
//! happen before a session directory is allocated, so a bad input never
//! leaves an empty session behind.
//!
//! Uploaded bytes (the front-end path) are first persisted as
//! `<output_root>/_upload_<name>` because pdfium needs a file path, and then
//! resolved like any local file.

use crate::error::Pdf2XmlError;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate `path` and return its absolute form.
pub fn resolve_input(path: &Path) -> Result<PathBuf, Pdf2XmlError> {
    if !path.exists() {
        return Err(Pdf2XmlError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(Pdf2XmlError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2XmlError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut head = Vec::with_capacity(PDF_MAGIC.len());
    file.by_ref()
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .map_err(|e| Pdf2XmlError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    check_magic(path, &head)?;

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    debug!("Resolved local PDF: {}", absolute.display());
    Ok(absolute)
}

/// Write uploaded bytes under `root` and resolve the result.
pub fn persist_upload(bytes: &[u8], file_name: &str, root: &Path) -> Result<PathBuf, Pdf2XmlError> {
    let target = root.join(upload_file_name(file_name));
    check_magic(&target, bytes)?;

    std::fs::create_dir_all(root).map_err(|e| Pdf2XmlError::OutputDirFailed {
        path: root.to_path_buf(),
        source: e,
    })?;
    std::fs::write(&target, bytes).map_err(|e| Pdf2XmlError::OutputWriteFailed {
        path: target.clone(),
        source: e,
    })?;
    info!("Upload saved to {} ({} bytes)", target.display(), bytes.len());

    resolve_input(&target)
}

/// `_upload_<name>`, keeping only the final path component of `name`.
pub fn upload_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "document.pdf".to_string());
    format!("_upload_{base}")
}

fn check_magic(path: &Path, head: &[u8]) -> Result<(), Pdf2XmlError> {
    if head.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(Pdf2XmlError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}
