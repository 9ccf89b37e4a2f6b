use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;

/// Replaces `path` with `contents` via a sibling temp file and rename.
///
/// Creates the parent directory when missing. An existing file keeps its
/// permissions.
pub(super) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let permissions = fs::metadata(path).ok().map(|meta| meta.permissions());

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// `<path>.backup.<unix-millis>` for the given instant.
pub(super) fn backup_path(path: &Path, at: SystemTime) -> PathBuf {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".backup.{millis}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn creates_missing_parent() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("nested").join("mcp.json");

        write_atomically(&path, b"{}\n").expect("write file");

        assert_eq!(fs::read_to_string(&path).expect("read back"), "{}\n");
    }

    #[cfg(unix)]
    #[test]
    fn keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("mcp.json");
        fs::write(&path, "{}").expect("seed file");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        write_atomically(&path, b"{\"a\": 1}\n").expect("rewrite file");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn backup_name_carries_millis() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let backup = backup_path(Path::new("/home/dev/.cursor/mcp.json"), at);
        assert_eq!(
            backup,
            PathBuf::from("/home/dev/.cursor/mcp.json.backup.1700000000123")
        );
    }
}
