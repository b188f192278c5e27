use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;

use crate::takeoutsort_core::error::Result;
#[cfg(windows)]
use crate::takeoutsort_core::error::TakeoutError;

#[cfg(windows)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Move a file, falling back to copy + delete when the rename crosses a
/// filesystem boundary.
pub fn move_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            copy_file(source, target)?;
            fs::remove_file(source)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Streamed copy with parent creation and best-effort mtime preservation.
pub fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut reader = fs::File::open(source)?;
    let mut writer = fs::File::create(target)?;
    io::copy(&mut reader, &mut writer)?;
    drop(writer);

    if let Ok(metadata) = fs::metadata(source) {
        let mtime = FileTime::from_last_modification_time(&metadata);
        if let Err(e) = filetime::set_file_mtime(target, mtime) {
            log::debug!("Could not preserve mtime on {}: {e}", target.display());
        }
    }
    Ok(())
}

pub fn delete_file(path: &Path) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

/// Create a link at `link` pointing to `source`. The stored target is
/// relative to the link's parent so the output tree stays portable.
///
/// On Windows the native symlink is attempted once per process; after a
/// privilege failure all subsequent calls go straight to the fallbacks
/// (junction for directories, hardlink for same-drive files). Cross-drive
/// file targets are a structured error, never a silent copy.
pub fn create_link(source: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    let link = sanitize_link_leaf(link);
    let parent = link.parent().unwrap_or_else(|| Path::new(""));
    let relative = relative_to(parent, source);
    platform_link(&relative, source, &link)
}

/// An error is cross-device iff the OS reports its EXDEV equivalent.
pub fn is_cross_device(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::CrossesDevices {
        return true;
    }
    match error.raw_os_error() {
        #[cfg(windows)]
        Some(code) => code == 17, // ERROR_NOT_SAME_DEVICE
        #[cfg(not(windows))]
        Some(code) => code == 18, // EXDEV
        None => false,
    }
}

/// Express `target` relative to `from_dir`.
pub fn relative_to(from_dir: &Path, target: &Path) -> PathBuf {
    let from: Vec<Component> = from_dir.components().collect();
    let to: Vec<Component> = target.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// Trailing spaces and dots are trimmed from the link leaf only; the
/// source file's on-disk name is never touched.
fn sanitize_link_leaf(link: &Path) -> PathBuf {
    if !cfg!(windows) {
        return link.to_path_buf();
    }
    let Some(name) = link.file_name().and_then(|n| n.to_str()) else {
        return link.to_path_buf();
    };
    let trimmed = name.trim_end_matches([' ', '.']);
    if trimmed == name || trimmed.is_empty() {
        link.to_path_buf()
    } else {
        link.with_file_name(trimmed)
    }
}

#[cfg(unix)]
fn platform_link(relative: &Path, _source: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(relative, link)?;
    Ok(())
}

#[cfg(windows)]
static SYMLINK_UNAVAILABLE: AtomicBool = AtomicBool::new(false);

#[cfg(windows)]
fn platform_link(relative: &Path, source: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let source_is_dir = source.is_dir();

    if !SYMLINK_UNAVAILABLE.load(Ordering::Relaxed) {
        let attempt = if source_is_dir {
            symlink_dir(relative, link)
        } else {
            symlink_file(relative, link)
        };
        match attempt {
            Ok(()) => return Ok(()),
            Err(e) => {
                // Typically ERROR_PRIVILEGE_NOT_HELD; remember and stop
                // retrying the fast path for this process.
                log::warn!(
                    "Native symlink failed ({e}); falling back to junctions/hardlinks"
                );
                SYMLINK_UNAVAILABLE.store(true, Ordering::Relaxed);
            }
        }
    }

    if source_is_dir {
        return create_junction(source, link);
    }

    if same_drive(source, link) {
        fs::hard_link(source, link)?;
        return Ok(());
    }

    Err(TakeoutError::LinkUnsupported {
        path: link.to_path_buf(),
        reason: "file target is on a different drive".to_string(),
    })
}

#[cfg(windows)]
fn create_junction(source: &Path, link: &Path) -> Result<()> {
    let status = std::process::Command::new("cmd")
        .args(["/C", "mklink", "/J"])
        .arg(link)
        .arg(source)
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(TakeoutError::LinkUnsupported {
            path: link.to_path_buf(),
            reason: format!("mklink /J exited with {status}"),
        })
    }
}

#[cfg(windows)]
fn same_drive(a: &Path, b: &Path) -> bool {
    fn prefix(path: &Path) -> Option<String> {
        match path.components().next() {
            Some(Component::Prefix(p)) => Some(p.as_os_str().to_string_lossy().to_lowercase()),
            _ => None,
        }
    }
    prefix(a).is_some() && prefix(a) == prefix(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file_same_fs() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.jpg");
        let target = dir.path().join("sub").join("b.jpg");
        fs::write(&source, b"payload").unwrap();

        move_file(&source, &target).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"payload");
    }

    #[test]
    fn test_copy_preserves_content_and_mtime() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.jpg");
        let target = dir.path().join("nested").join("deep").join("b.jpg");
        fs::write(&source, b"payload").unwrap();

        copy_file(&source, &target).unwrap();
        assert!(source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"payload");

        let src_mtime = FileTime::from_last_modification_time(&fs::metadata(&source).unwrap());
        let dst_mtime = FileTime::from_last_modification_time(&fs::metadata(&target).unwrap());
        assert_eq!(src_mtime.unix_seconds(), dst_mtime.unix_seconds());
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to(Path::new("/out/Albums/Trip"), Path::new("/out/ALL_PHOTOS/2023/a.jpg")),
            PathBuf::from("../../ALL_PHOTOS/2023/a.jpg")
        );
        assert_eq!(
            relative_to(Path::new("/out"), Path::new("/out/a.jpg")),
            PathBuf::from("a.jpg")
        );
        assert_eq!(relative_to(Path::new("/a/b"), Path::new("/a/b")), PathBuf::from("."));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_resolves_relatively() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("ALL_PHOTOS").join("2023").join("a.jpg");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"payload").unwrap();

        let link = dir.path().join("Albums").join("Trip").join("a.jpg");
        create_link(&source, &link).unwrap();

        let stored = fs::read_link(&link).unwrap();
        assert!(stored.is_relative());
        assert_eq!(fs::read(&link).unwrap(), b"payload");
    }

    #[test]
    fn test_delete_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.jpg");
        fs::write(&path, b"x").unwrap();
        delete_file(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_is_cross_device() {
        #[cfg(not(windows))]
        let err = io::Error::from_raw_os_error(18);
        #[cfg(windows)]
        let err = io::Error::from_raw_os_error(17);
        assert!(is_cross_device(&err));
        assert!(!is_cross_device(&io::Error::from_raw_os_error(2)));
    }
}
