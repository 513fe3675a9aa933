//! Shard path mapper (C1).
//!
//! Pure functions mapping a calendar date to its shard file, and
//! enumerating the shards that already exist under a device root. Every
//! other component asks this module for paths; it is the sole source of
//! truth for the on-disk layout `ROOT/YYYY/MM/DD.txt`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};

/// Returns the shard path for `date` under `root`.
///
/// Directory and filename components are zero-padded decimals; the
/// directories are not created by this function.
pub fn shard_path(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}.txt", date.day()))
}

/// Enumerates every existing shard file beneath `root`, in no particular
/// order. Used by `sort()` to discover which shards to rewrite. A root
/// that does not exist yet yields no paths rather than erroring, matching
/// the rule that missing shards are treated as empty.
pub fn shard_paths(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    if !root.is_dir() {
        return Ok(paths);
    }
    collect_txt_files(root, &mut paths)?;
    Ok(paths)
}

fn collect_txt_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_txt_files(&path, out)?;
        } else if file_type.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_date_to_zero_padded_path() {
        let root = Path::new("/db/device");
        let date = NaiveDate::from_ymd_opt(2020, 4, 1).unwrap();
        assert_eq!(shard_path(root, date), Path::new("/db/device/2020/04/01.txt"));
    }

    #[test]
    fn missing_root_has_no_shards() {
        let root = Path::new("/does/not/exist/at/all");
        assert_eq!(shard_paths(root).unwrap(), Vec::<PathBuf>::new());
    }

    #[test]
    fn enumerates_nested_shards() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let day1 = shard_path(root, NaiveDate::from_ymd_opt(2020, 4, 1).unwrap());
        let day2 = shard_path(root, NaiveDate::from_ymd_opt(2020, 4, 30).unwrap());
        fs::create_dir_all(day1.parent().unwrap()).unwrap();
        fs::create_dir_all(day2.parent().unwrap()).unwrap();
        fs::write(&day1, "").unwrap();
        fs::write(&day2, "").unwrap();

        let mut found = shard_paths(root).unwrap();
        found.sort();
        let mut expected = vec![day1, day2];
        expected.sort();
        assert_eq!(found, expected);
    }
}
