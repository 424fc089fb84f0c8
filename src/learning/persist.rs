//! Write-to-temp-then-rename helpers shared by the Q-table and history files.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sibling temp path: `<path>.tmp`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Sibling backup path: `<path>.bak`.
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Move an existing `path` aside to its backup sibling.
///
/// Returns the backup path, or `None` when `path` does not exist.
pub(crate) fn backup(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let bak = backup_path(path);
    fs::rename(path, &bak)?;
    Ok(Some(bak))
}

/// Undo [`backup`]: put the backup back over `path`, or remove `path` when
/// there was nothing to back up.
pub(crate) fn restore(backup: Option<&Path>, path: &Path) -> std::io::Result<()> {
    match backup {
        Some(bak) => fs::rename(bak, path),
        None => match fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    }
}

/// Write `bytes` to the temp sibling of `path` and return the temp path.
///
/// The destination is not touched; call [`commit`] to move it into place.
pub(crate) fn write_temp(path: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path(path);
    let file = File::create(&temp)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(temp)
}

/// Rename a temp file written by [`write_temp`] over its destination.
pub(crate) fn commit(temp: &Path, path: &Path) -> std::io::Result<()> {
    fs::rename(temp, path)
}

/// Atomically replace `path` with `bytes`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp = write_temp(path, bytes)?;
    if let Err(e) = commit(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}
