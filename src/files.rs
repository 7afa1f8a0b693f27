//! Local file helpers shared by the credential and cloud-init readers.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Expands a leading `~/` using `HOME`; other paths are returned unchanged.
#[must_use]
pub fn expand_tilde(path: &Utf8Path) -> Utf8PathBuf {
    if let Some(rest) = path.as_str().strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return Utf8PathBuf::from(format!("{}/{rest}", home.to_string_lossy()));
    }
    path.to_owned()
}

/// Splits a path into the directory to open and the file name relative to it.
///
/// Relative paths are resolved against the working directory first so that
/// `..` components are followed the same way the shell follows them.
fn split_dir(path: &Utf8Path) -> Result<(Utf8PathBuf, Utf8PathBuf), String> {
    let absolute = if path.is_absolute() {
        path.to_owned()
    } else {
        let raw_cwd = std::env::current_dir()
            .map_err(|err| format!("failed to resolve the working directory: {err}"))?;
        let cwd = Utf8PathBuf::from_path_buf(raw_cwd)
            .map_err(|dir| format!("working directory is not UTF-8: {}", dir.display()))?;
        cwd.join(path)
    };
    let parent = absolute
        .parent()
        .ok_or_else(|| format!("path has no parent directory: {path}"))?;
    let file_name = absolute
        .file_name()
        .ok_or_else(|| format!("path has no file name: {path}"))?;
    Ok((parent.to_owned(), Utf8PathBuf::from(file_name)))
}

/// Reads a file through an ambient capability on its parent directory.
///
/// # Errors
///
/// Returns the rendered I/O error when the directory cannot be opened or the
/// file cannot be read.
pub fn read_to_string_ambient(path: &Utf8Path) -> Result<String, String> {
    let (dir_path, file_path) = split_dir(path)?;
    let dir =
        Dir::open_ambient_dir(&dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(&file_path).map_err(|err| err.to_string())
}

/// Reports whether a regular file exists at `path`.
#[must_use]
pub fn file_exists_ambient(path: &Utf8Path) -> bool {
    let Ok((dir_path, file_path)) = split_dir(path) else {
        return false;
    };
    Dir::open_ambient_dir(&dir_path, ambient_authority())
        .and_then(|dir| dir.metadata(&file_path))
        .is_ok_and(|metadata| metadata.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_absolute_paths() {
        let mut file = tempfile::NamedTempFile::new()
            .unwrap_or_else(|err| panic!("temp file should be created: {err}"));
        file.write_all(b"payload")
            .unwrap_or_else(|err| panic!("temp file should be written: {err}"));
        let path = Utf8Path::from_path(file.path())
            .unwrap_or_else(|| panic!("temp path should be UTF-8"));

        assert!(file_exists_ambient(path));
        assert_eq!(read_to_string_ambient(path), Ok(String::from("payload")));
    }

    /// Spells `path` relative to the working directory, climbing to the
    /// filesystem root with `..` first.
    fn via_parent_components(path: &Utf8Path) -> Utf8PathBuf {
        let cwd = std::env::current_dir().unwrap_or_else(|err| panic!("cwd: {err}"));
        let depth = cwd.components().count().saturating_sub(1);
        let mut relative: Utf8PathBuf = std::iter::repeat_n("..", depth.max(1)).collect();
        relative.push(
            path.strip_prefix("/")
                .unwrap_or_else(|err| panic!("temp path should be absolute: {err}")),
        );
        relative
    }

    #[test]
    fn follows_parent_components_in_relative_paths() {
        let mut file = tempfile::NamedTempFile::new()
            .unwrap_or_else(|err| panic!("temp file should be created: {err}"));
        file.write_all(b"#cloud-config")
            .unwrap_or_else(|err| panic!("temp file should be written: {err}"));
        let absolute = Utf8Path::from_path(file.path())
            .unwrap_or_else(|| panic!("temp path should be UTF-8"));
        let relative = via_parent_components(absolute);
        assert!(relative.starts_with(".."));

        assert!(file_exists_ambient(&relative));
        assert_eq!(
            read_to_string_ambient(&relative),
            Ok(String::from("#cloud-config"))
        );
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("temp dir: {err}"));
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.yaml"))
            .unwrap_or_else(|_| panic!("temp path should be UTF-8"));

        assert!(!file_exists_ambient(&path));
        assert!(read_to_string_ambient(&path).is_err());
    }

    #[test]
    fn paths_without_tilde_are_untouched() {
        let path = Utf8Path::new("/etc/hosts");
        assert_eq!(expand_tilde(path), Utf8PathBuf::from("/etc/hosts"));
    }
}
