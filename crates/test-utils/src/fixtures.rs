//! Filesystem fixtures for artifact and retention tests.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

/// Create an empty scratch output directory, removed on drop.
pub fn output_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("grib-out-")
        .tempdir()
        .expect("failed to create temp dir")
}

/// Write `contents` to `dir/name` and back-date its modification time by `age`.
pub fn write_aged_file(dir: &Path, name: &str, contents: &[u8], age: Duration) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("failed to write fixture file");
    set_age(&path, age).expect("failed to set fixture mtime");
    path
}

/// Set the modification time of `path` to `now - age`.
pub fn set_age(path: &Path, age: Duration) -> io::Result<()> {
    let mtime = SystemTime::now()
        .checked_sub(age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    File::options().write(true).open(path)?.set_modified(mtime)
}

/// Names of all entries in `dir`, sorted.
pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("failed to read dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// A recognisable fake GRIB message for a forecast offset.
///
/// Starts with the `GRIB` indicator and ends with the `7777` end section so
/// concatenations are easy to eyeball in failure output.
pub fn slice_payload(offset: u32) -> Vec<u8> {
    format!("GRIB[f{offset:03}]7777").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DAY_SECS;

    #[test]
    fn test_write_aged_file_sets_mtime() {
        let dir = output_dir();
        let path = write_aged_file(
            dir.path(),
            "old.grb",
            b"x",
            Duration::from_secs(3 * DAY_SECS),
        );
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        let age = SystemTime::now().duration_since(modified).unwrap();
        assert!(age >= Duration::from_secs(3 * DAY_SECS - 60));
    }

    #[test]
    fn test_slice_payload_is_distinct() {
        assert_ne!(slice_payload(0), slice_payload(1));
        assert!(slice_payload(2).starts_with(b"GRIB"));
    }

    #[test]
    fn test_list_names_sorted() {
        let dir = output_dir();
        fs::write(dir.path().join("b"), b"").unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        assert_eq!(list_names(dir.path()), vec!["a", "b"]);
    }
}
