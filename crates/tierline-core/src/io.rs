use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `data` in one rename. Readers see the old config or
/// the new one, never a truncated file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_existing_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".tierline/config.yaml");
        atomic_write(&path, b"version: 1\n").unwrap();
        atomic_write(&path, b"version: 2\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "version: 2\n");
    }

    #[test]
    fn leaves_no_staging_files_behind() {
        let dir = TempDir::new().unwrap();
        atomic_write(&dir.path().join("config.yaml"), b"x").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("config.yaml")]);
    }
}
