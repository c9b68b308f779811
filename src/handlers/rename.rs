use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use tempfile::Builder;

use crate::error::GodToolError;

/// Rename every regular file in `dir` to `{prefix}_{index}{.ext}`, in
/// file name order. Returns the number of files renamed.
///
/// Files are first moved to unique staging names so that a file which
/// already carries one of the target names can't be overwritten. If any
/// step fails, every file is moved back to its original name.
pub fn rename_files(dir: &Path, prefix: &str) -> Result<usize, GodToolError> {
    if !dir.is_dir() {
        return Err(GodToolError::Error(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    // (original path, where the file is now)
    let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
    if let Err(e) = stage_then_rename(dir, prefix, &files, &mut moved) {
        roll_back(&moved);
        return Err(e);
    }

    for (old_path, new_path) in &moved {
        info!("Renamed: {} -> {}", file_name(old_path), file_name(new_path));
    }

    Ok(moved.len())
}

fn stage_then_rename(
    dir: &Path,
    prefix: &str,
    files: &[PathBuf],
    moved: &mut Vec<(PathBuf, PathBuf)>,
) -> Result<(), GodToolError> {
    for old_path in files {
        let staging_path = reserve_staging_path(dir)?;
        if let Err(e) = fs::rename(old_path, &staging_path) {
            let _ = fs::remove_file(&staging_path);
            return Err(e.into());
        }
        moved.push((old_path.clone(), staging_path));
    }

    for (index, (old_path, current)) in moved.iter_mut().enumerate() {
        let new_path = dir.join(target_name(prefix, index, old_path));
        fs::rename(&*current, &new_path)?;
        *current = new_path;
    }

    Ok(())
}

/// Create an empty file with a fresh name for a file to be moved over
fn reserve_staging_path(dir: &Path) -> Result<PathBuf, GodToolError> {
    let placeholder = Builder::new()
        .prefix(".godtool-rename-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    let path = placeholder.into_temp_path().keep().map_err(|e| e.error)?;
    Ok(path)
}

fn roll_back(moved: &[(PathBuf, PathBuf)]) {
    for (old_path, current) in moved.iter().rev() {
        if let Err(e) = fs::rename(current, old_path) {
            error!(
                "Could not restore {} from {}: {}",
                old_path.display(),
                current.display(),
                e
            );
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn target_name(prefix: &str, index: usize, old_path: &Path) -> String {
    match old_path.extension() {
        Some(ext) => format!("{}_{}.{}", prefix, index, ext.to_string_lossy()),
        None => format!("{}_{}", prefix, index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_renames_files_in_name_order_keeping_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        fs::write(dir.path().join("a.png"), b"a").unwrap();
        fs::write(dir.path().join("notes"), b"n").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let count = rename_files(dir.path(), "trip").unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            names(dir.path()),
            vec!["subdir", "trip_0.png", "trip_1.jpg", "trip_2"]
        );
        assert_eq!(fs::read(dir.path().join("trip_0.png")).unwrap(), b"a");
    }

    #[test]
    fn test_existing_target_names_are_not_clobbered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"first").unwrap();
        fs::write(dir.path().join("x_0.txt"), b"second").unwrap();

        rename_files(dir.path(), "x").unwrap();

        assert_eq!(names(dir.path()), vec!["x_0.txt", "x_1.txt"]);
        assert_eq!(fs::read(dir.path().join("x_0.txt")).unwrap(), b"first");
        assert_eq!(fs::read(dir.path().join("x_1.txt")).unwrap(), b"second");
    }

    #[test]
    fn test_files_named_like_staging_files_are_kept() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".a"), b"AAA").unwrap();
        fs::write(dir.path().join(".godtool-rename-0.tmp"), b"LEFTOVER").unwrap();

        assert_eq!(rename_files(dir.path(), "x").unwrap(), 2);

        assert_eq!(names(dir.path()), vec!["x_0", "x_1.tmp"]);
        assert_eq!(fs::read(dir.path().join("x_0")).unwrap(), b"AAA");
        assert_eq!(fs::read(dir.path().join("x_1.tmp")).unwrap(), b"LEFTOVER");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_rename_restores_original_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"first").unwrap();
        fs::write(dir.path().join("b.txt"), b"second").unwrap();
        // A directory in the way of the second target name
        fs::create_dir(dir.path().join("x_1.txt")).unwrap();

        assert!(rename_files(dir.path(), "x").is_err());

        assert_eq!(names(dir.path()), vec!["a.txt", "b.txt", "x_1.txt"]);
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"first");
        assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"second");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(rename_files(&dir.path().join("nope"), "x").is_err());
    }
}
