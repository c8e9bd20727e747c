//! Output naming and duplicate detection.

use std::path::{Path, PathBuf};

use tracing::info;

/// Extension of produced session files.
pub const SESSION_EXTENSION: &str = "session";

/// Path of the session file for `identifier`: `{output_dir}/{identifier}.session`.
pub fn session_path(output_dir: &Path, identifier: &str) -> PathBuf {
    output_dir.join(format!("{identifier}.{SESSION_EXTENSION}"))
}

/// Whether a previous conversion already produced `path`.
pub fn session_exists(path: &Path) -> bool {
    // An entry that cannot be inspected counts as present so it is never overwritten.
    path.try_exists().unwrap_or(true)
}

/// Remove a session file left behind by a job that did not verify it.
/// Returns `true` when a file was removed.
pub fn discard_session(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Create the output directory if needed. Returns `true` when it was created.
pub fn ensure_output_dir(dir: &Path) -> std::io::Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(dir)?;
    info!("Created output directory: {}", dir.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_session_path_is_deterministic() {
        let out = Path::new("/srv/output");
        let first = session_path(out, "+15550001");
        let second = session_path(out, "+15550001");

        assert_eq!(first, PathBuf::from("/srv/output/+15550001.session"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_session_exists() {
        let dir = tempdir().unwrap();
        let path = session_path(dir.path(), "acc");
        assert!(!session_exists(&path));

        std::fs::write(&path, b"x").unwrap();
        assert!(session_exists(&path));
    }

    #[test]
    fn test_discard_session() {
        let dir = tempdir().unwrap();
        let path = session_path(dir.path(), "acc");
        assert!(!discard_session(&path).unwrap());

        std::fs::write(&path, b"partial").unwrap();
        assert!(discard_session(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_ensure_output_dir() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("output");

        assert!(ensure_output_dir(&out).unwrap());
        assert!(out.is_dir());
        assert!(!ensure_output_dir(&out).unwrap());
    }
}
