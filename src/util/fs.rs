//! Filesystem utilities.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::util::errors::BerthError;

/// Copy a file, keeping its permissions and modification time.
///
/// Any failure, including failing to carry over the timestamp, is reported
/// as [`BerthError::Copy`] naming both paths.
pub fn copy_preserving(from: &Path, to: &Path) -> Result<()> {
    let copy_err = || BerthError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    };

    // A read-only copy from an earlier run cannot be opened for writing.
    if to.is_file() {
        fs::remove_file(to).with_context(copy_err)?;
    }

    // fs::copy carries permission bits over.
    fs::copy(from, to).with_context(copy_err)?;

    let modified = fs::metadata(from)
        .and_then(|m| m.modified())
        .with_context(copy_err)?;
    File::open(to)
        .and_then(|f| f.set_modified(modified))
        .with_context(copy_err)?;

    Ok(())
}

/// Recursively copy the contents of `src` into `dst`, preserving metadata.
///
/// Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<usize> {
    ensure_dir(dst)?;

    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to read directory: {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("unexpected path: {}", entry.path().display()))?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else {
            copy_preserving(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        fs::create_dir_all(path).context(BerthError::CreateDir {
            path: path.to_path_buf(),
        })?;
    }
    Ok(())
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_copy_preserving_keeps_mtime() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("game.nso");
        let dst = tmp.path().join("main");
        fs::write(&src, b"nso").unwrap();

        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(old)
            .unwrap();

        copy_preserving(&src, &dst).unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"nso");
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), old);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserving_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("rtld");
        let dst = tmp.path().join("copy");
        fs::write(&src, b"x").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o750)).unwrap();

        copy_preserving(&src, &dst).unwrap();

        let mode = fs::metadata(&dst).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserving_read_only_source() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("nnSdkEn.nso");
        let dst = tmp.path().join("sdk");
        fs::write(&src, b"sdk").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o444)).unwrap();

        copy_preserving(&src, &dst).unwrap();
        copy_preserving(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"sdk");
    }

    #[test]
    fn test_copy_preserving_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = copy_preserving(&tmp.path().join("nope"), &tmp.path().join("dst")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BerthError>(),
            Some(BerthError::Copy { .. })
        ));
    }

    #[test]
    fn test_copy_dir_all() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("assets");
        let dst = tmp.path().join("game.data");

        fs::create_dir_all(src.join("icons")).unwrap();
        fs::write(src.join("icons/icon.bmp"), "icon").unwrap();
        fs::write(src.join("readme.txt"), "content").unwrap();

        let copied = copy_dir_all(&src, &dst).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(
            fs::read_to_string(dst.join("icons/icon.bmp")).unwrap(),
            "icon"
        );
        assert!(dst.join("readme.txt").exists());
    }

    #[test]
    fn test_relative_path() {
        let rel = relative_path(Path::new("/build/out"), Path::new("/build/out/game.code/main"));
        assert_eq!(rel, PathBuf::from("game.code/main"));
    }
}
