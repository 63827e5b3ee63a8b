//! Crash-safe file replacement: write a temp file next to the target, sync
//! it, then rename it over the target.

use std::io::Write;
use std::path::Path;

/// Replaces `path` with `contents`. Readers see the old file or the new
/// one, never a truncated mix. Existing permissions are kept.
pub fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes/a.md");
        write_file(&path, b"one").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one");
        write_file(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");

        // no temp files left behind
        let entries: Vec<_> = std::fs::read_dir(tmp.path().join("notes")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
