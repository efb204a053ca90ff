//! Pre-eject junk cleanup.
//!
//! Deletes known transient metadata — exact-name matches and AppleDouble
//! `._` companion files — recursively across the volume, summing the
//! bytes freed. Everything is best-effort: an item that cannot be read
//! or removed is skipped and the sweep continues, so a permission hole
//! never blocks the eject pipeline.

use std::fs;
use std::path::Path;
use tracing::debug;

/// Items deleted by exact name wherever they appear in the tree.
pub const JUNK_NAMES: [&str; 6] = [
    ".DS_Store",
    ".apdisk",
    ".TemporaryItems",
    ".Trashes",
    ".Spotlight-V100",
    ".fseventsd",
];

/// Files whose name starts with this prefix are AppleDouble companions
/// written next to real files on foreign filesystems.
pub const JUNK_PREFIX: &str = "._";

/// Delete junk under `root`, returning the number of bytes freed.
/// Only bytes of items that were actually removed are counted.
pub fn clean(root: &Path) -> u64 {
    let mut freed = 0;
    sweep(root, &mut freed);
    freed
}

fn sweep(dir: &Path, freed: &mut u64) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("cleanup skipping {}: {err}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(_) => continue,
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let path = entry.path();

        let is_junk = JUNK_NAMES.contains(&name.as_ref())
            || (!file_type.is_dir() && name.starts_with(JUNK_PREFIX));

        if is_junk {
            *freed += remove_item(&path, file_type.is_dir());
        } else if file_type.is_dir() {
            sweep(&path, freed);
        }
    }
}

/// Remove one junk item, returning the bytes it occupied, or zero when
/// removal fails.
fn remove_item(path: &Path, is_dir: bool) -> u64 {
    let bytes = if is_dir {
        tree_size(path)
    } else {
        fs::symlink_metadata(path).map(|meta| meta.len()).unwrap_or(0)
    };

    let removed = if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match removed {
        Ok(()) => {
            debug!("removed {} ({bytes} bytes)", path.display());
            bytes
        }
        Err(err) => {
            debug!("could not remove {}: {err}", path.display());
            0
        }
    }
}

/// Sum of the file sizes under `dir`, not following symlinks.
fn tree_size(dir: &Path) -> u64 {
    let mut total = 0;
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            total += tree_size(&entry.path());
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_bytes(path: &Path, n: usize) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(&vec![0u8; n]).unwrap();
    }

    #[test]
    fn removes_junk_recursively_and_reports_freed_bytes() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("photos").join("2024");
        fs::create_dir_all(&nested).unwrap();

        write_bytes(&tmp.path().join(".DS_Store"), 4096);
        write_bytes(&nested.join(".DS_Store"), 100);
        write_bytes(&nested.join("._IMG_0001.jpg"), 50);
        write_bytes(&nested.join("IMG_0001.jpg"), 5000);

        let trashes = tmp.path().join(".Trashes").join("501");
        fs::create_dir_all(&trashes).unwrap();
        write_bytes(&trashes.join("old.bin"), 300);

        let freed = clean(tmp.path());
        assert_eq!(freed, 4096 + 100 + 50 + 300);

        // Real content is untouched.
        assert!(nested.join("IMG_0001.jpg").exists());
        assert!(!tmp.path().join(".DS_Store").exists());
        assert!(!tmp.path().join(".Trashes").exists());
        assert!(!nested.join("._IMG_0001.jpg").exists());
    }

    #[test]
    fn prefix_rule_applies_to_files_only() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("._looks_like_junk");
        fs::create_dir_all(&dir).unwrap();
        write_bytes(&dir.join("keep.txt"), 10);

        let freed = clean(tmp.path());
        assert_eq!(freed, 0);
        assert!(dir.join("keep.txt").exists());
    }

    #[test]
    fn clean_of_missing_path_is_zero() {
        assert_eq!(clean(Path::new("/nonexistent/undock-test-path")), 0);
    }
}
