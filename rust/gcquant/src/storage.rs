//! Result stores are written fresh next to their target and renamed over it.

use std::fs::File;
use std::path::{
    Path,
    PathBuf,
};

use tracing::{
    debug,
    error,
};

use crate::errors::{
    GcmsError,
    Result,
};

fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "table".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Runs `write` against a temporary sibling of `path`, then replaces `path`.
///
/// Any failure leaves the previous content of `path` untouched.
pub fn replace_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            GcmsError::storage(
                format!("cannot create output directory: {}", e),
                Some(parent.to_path_buf()),
            )
        })?;
    }

    let tmp = sibling_temp_path(path);
    let file = File::create(&tmp).map_err(|e| {
        error!("Failed to create {}: {}", tmp.display(), e);
        GcmsError::storage(format!("cannot create table: {}", e), Some(tmp.clone()))
    })?;

    if let Err(e) = write(file) {
        let _ = std::fs::remove_file(&tmp);
        return Err(match e {
            GcmsError::Io { source, .. } => {
                GcmsError::storage(source.to_string(), Some(path.to_path_buf()))
            }
            other => other.with_path(path),
        });
    }

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        GcmsError::storage(
            format!("cannot replace table: {}", e),
            Some(path.to_path_buf()),
        )
    })?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_replace_overwrites_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        std::fs::write(&target, "old").unwrap();
        replace_atomically(&target, |mut f| {
            f.write_all(b"new")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        assert!(!sibling_temp_path(&target).exists());
    }

    #[test]
    fn test_failed_write_keeps_old_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.csv");
        std::fs::write(&target, "old").unwrap();
        let res = replace_atomically(&target, |_| Err(GcmsError::storage("boom", None)));
        assert!(res.unwrap_err().is_globally_fatal());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        assert!(!sibling_temp_path(&target).exists());
    }
}
